// In-memory stand-ins for the OS capabilities plus small fixture helpers

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tempsweep::cleaner::coordinator::Timings;
use tempsweep::cleaner::progress::{DeleteProgress, ScanBatch};
use tempsweep::cleaner::tuner::{Medium, MediumProbe};
use tempsweep::cleaner::{
    CleanError, Classifier, DeleteEngine, Phase, ProgressSink, ScanEngine, ServiceCoordinator,
};
use tempsweep::native::{
    Channel, EmptyOutcome, EventLog, RecycleBin, RecycleInfo, ServiceControl, ServiceStatus,
};

pub struct FakeRecycleBin {
    pub info: Mutex<Option<RecycleInfo>>,
    pub outcome: EmptyOutcome,
    pub empties: AtomicUsize,
}

impl FakeRecycleBin {
    pub fn holding(item_count: u64, total_bytes: u64) -> Self {
        Self {
            info: Mutex::new(Some(RecycleInfo { item_count, total_bytes })),
            outcome: EmptyOutcome::Success,
            empties: AtomicUsize::new(0),
        }
    }

    pub fn empty_bin() -> Self {
        Self::holding(0, 0)
    }

    pub fn broken() -> Self {
        Self {
            info: Mutex::new(None),
            outcome: EmptyOutcome::Failure,
            empties: AtomicUsize::new(0),
        }
    }

    pub fn empties(&self) -> usize {
        self.empties.load(Ordering::SeqCst)
    }
}

impl RecycleBin for FakeRecycleBin {
    fn query(&self) -> Result<RecycleInfo, CleanError> {
        self.info
            .lock()
            .unwrap()
            .ok_or_else(|| CleanError::Probe("recycle bin unavailable".to_string()))
    }

    fn empty(&self) -> EmptyOutcome {
        self.empties.fetch_add(1, Ordering::SeqCst);
        if self.outcome == EmptyOutcome::Success {
            *self.info.lock().unwrap() = Some(RecycleInfo::default());
        }
        self.outcome
    }
}

#[derive(Default)]
pub struct FakeEventLog {
    pub channels: Vec<Channel>,
    pub failing: Vec<String>,
    pub cleared: Mutex<Vec<String>>,
}

impl FakeEventLog {
    pub fn with_channels(channels: &[(&str, u64)]) -> Self {
        Self {
            channels: channels
                .iter()
                .map(|(name, bytes)| Channel {
                    name: name.to_string(),
                    reclaimable_bytes: *bytes,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }
}

impl EventLog for FakeEventLog {
    fn channels(&self) -> Vec<Channel> {
        self.channels.clone()
    }

    fn clear(&self, name: &str) -> Result<(), CleanError> {
        if self.failing.iter().any(|f| f == name) {
            return Err(CleanError::Service {
                name: name.to_string(),
                reason: "channel is busy".to_string(),
            });
        }
        self.cleared.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeServices {
    pub state: Mutex<HashMap<String, ServiceStatus>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeServices {
    pub fn running() -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.insert("wuauserv".to_string(), ServiceStatus::Running);
            state.insert("BITS".to_string(), ServiceStatus::Running);
        }
        fake
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

impl ServiceControl for FakeServices {
    fn status(&self, name: &str) -> Result<ServiceStatus, CleanError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(ServiceStatus::Stopped))
    }

    fn stop(&self, name: &str, _timeout: Duration) -> Result<(), CleanError> {
        self.calls.lock().unwrap().push(format!("stop {name}"));
        self.state
            .lock()
            .unwrap()
            .insert(name.to_string(), ServiceStatus::Stopped);
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), CleanError> {
        self.calls.lock().unwrap().push(format!("start {name}"));
        self.state
            .lock()
            .unwrap()
            .insert(name.to_string(), ServiceStatus::Running);
        Ok(())
    }
}

pub struct FixedProbe(pub Option<Medium>);

impl MediumProbe for FixedProbe {
    fn probe(&self) -> Result<Medium, CleanError> {
        self.0
            .ok_or_else(|| CleanError::Probe("no disks reported".to_string()))
    }
}

/// Remembers every sink call.
#[derive(Default)]
pub struct Recorder {
    pub batches: Mutex<Vec<ScanBatch>>,
    pub locations: Mutex<Vec<(usize, usize, ThreadId)>>,
    pub deletes: Mutex<Vec<DeleteProgress>>,
    pub phases: Mutex<Vec<Phase>>,
}

impl Recorder {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().unwrap().clone()
    }

    pub fn worker_threads(&self) -> usize {
        let ids: HashSet<ThreadId> = self.locations.lock().unwrap().iter().map(|l| l.2).collect();
        ids.len()
    }
}

impl ProgressSink for Recorder {
    fn scan_batch(&self, batch: &ScanBatch) {
        self.batches.lock().unwrap().push(batch.clone());
    }

    fn location_done(&self, done: usize, total: usize) {
        self.locations
            .lock()
            .unwrap()
            .push((done, total, thread::current().id()));
    }

    fn delete_progress(&self, progress: &DeleteProgress) {
        self.deletes.lock().unwrap().push(*progress);
    }

    fn phase(&self, phase: Phase) {
        self.phases.lock().unwrap().push(phase);
    }
}

pub fn no_wait() -> Timings {
    Timings {
        transfer_stop: Duration::ZERO,
        primary_stop: Duration::ZERO,
        settle: Duration::ZERO,
    }
}

pub fn scanner(recycle: Arc<FakeRecycleBin>, events: Arc<FakeEventLog>) -> ScanEngine {
    ScanEngine::new(Arc::new(Classifier::new()), recycle, events)
        .with_progress_interval(Duration::ZERO)
}

pub fn deleter(
    recycle: Arc<FakeRecycleBin>,
    events: Arc<FakeEventLog>,
    services: Arc<FakeServices>,
) -> DeleteEngine {
    let coordinator = Arc::new(ServiceCoordinator::new(services).with_timings(no_wait()));
    DeleteEngine::new(Arc::new(Classifier::new()), recycle, events, coordinator)
        .with_progress_interval(Duration::ZERO)
        .with_event_log_workers(2)
}

/// Write `size` bytes to `path` and backdate it by `age_secs`.
pub fn aged_file(path: &Path, size: usize, age_secs: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![b'x'; size]).unwrap();
    let when = SystemTime::now() - Duration::from_secs(age_secs);
    filetime::set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}
