// Tests for session orchestration
// Run-state exclusivity, worker-count selection and the scan/clean hand-off

use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tempsweep::cleaner::tuner::{Medium, FALLBACK_DEGREE};
use tempsweep::cleaner::{
    Category, CleanError, ConcurrencyTuner, Location, NullSink, Phase, ProgressSink, RunState,
    ScanResult, Session,
};

use crate::fakes::{
    aged_file, deleter, scanner, FakeEventLog, FakeRecycleBin, FakeServices, FixedProbe, Recorder,
};

fn session_with(medium: Option<Medium>) -> Session {
    let recycle = Arc::new(FakeRecycleBin::empty_bin());
    let events = Arc::new(FakeEventLog::default());
    Session::from_parts(
        scanner(recycle.clone(), events.clone()),
        deleter(recycle, events, Arc::new(FakeServices::default())),
        ConcurrencyTuner::with_probe(Arc::new(FixedProbe(medium))),
    )
}

#[test]
fn test_degree_follows_medium() {
    assert_eq!(session_with(Some(Medium::Rotational)).degree(), 1);

    let cores = num_cpus::get();
    assert_eq!(session_with(Some(Medium::SolidState)).degree(), cores.min(4));
    assert_eq!(session_with(Some(Medium::Unknown)).degree(), cores.min(4));
}

#[test]
fn test_probe_failure_uses_fallback() {
    assert_eq!(session_with(None).degree(), FALLBACK_DEGREE);
    assert_eq!(FALLBACK_DEGREE, 2);
}

#[test]
fn test_degree_override_wins() {
    let session = session_with(Some(Medium::Rotational)).with_degree(Some(3));
    assert_eq!(session.degree(), 3);
    let session = session_with(None).with_degree(Some(0));
    assert_eq!(session.degree(), 1);
}

/// Tries to start a clean from inside a running scan.
struct Reentrant<'a> {
    session: &'a Session,
    seen: Mutex<Vec<(RunState, Option<RunState>)>>,
}

impl ProgressSink for Reentrant<'_> {
    fn location_done(&self, _done: usize, _total: usize) {
        let state = self.session.state();
        let busy = match self.session.clean(&mut ScanResult::default(), &NullSink) {
            Err(CleanError::Busy(current)) => Some(current),
            _ => None,
        };
        self.seen.lock().unwrap().push((state, busy));
    }
}

#[test]
fn test_second_operation_is_rejected_while_busy() {
    let dir = TempDir::new().unwrap();
    let session = session_with(Some(Medium::SolidState));
    let sink = Reentrant {
        session: &session,
        seen: Mutex::new(Vec::new()),
    };

    session
        .scan(&[Location::new(dir.path(), Category::UserTemp, "Temp")], &sink)
        .unwrap();

    let seen = sink.seen.lock().unwrap();
    assert_eq!(*seen, vec![(RunState::Scanning, Some(RunState::Scanning))]);
    drop(seen);
    assert_eq!(session.state(), RunState::Idle);
}

#[test]
fn test_scan_then_clean() {
    let dir = TempDir::new().unwrap();
    aged_file(&dir.path().join("one.tmp"), 120, 3600);
    aged_file(&dir.path().join("two.bak"), 80, 3600);
    aged_file(&dir.path().join("fresh.tmp"), 10, 5);

    let session = session_with(Some(Medium::SolidState));
    let locations = [Location::new(dir.path(), Category::UserTemp, "Temp")];

    let sink = Recorder::default();
    let mut result = session.scan(&locations, &sink).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.total_bytes, 200);
    assert_eq!(sink.phases().last(), Some(&Phase::Done));

    let outcome = session.clean(&mut result, &sink).unwrap();
    assert_eq!(outcome.deleted_count, 2);
    assert_eq!(outcome.freed_bytes, 200);
    assert!(result.is_empty());
    assert!(dir.path().join("fresh.tmp").exists());
    assert_eq!(session.state(), RunState::Idle);
}

#[test]
fn test_stop_cancels_running_scan() {
    let dir = TempDir::new().unwrap();
    let roots: Vec<_> = (0..4).map(|i| dir.path().join(format!("loc{i}"))).collect();
    for root in &roots {
        aged_file(&root.join("x.tmp"), 10, 3600);
    }
    let locations: Vec<Location> = roots
        .iter()
        .map(|r| Location::new(r, Category::UserTemp, "Temp"))
        .collect();

    let session = session_with(Some(Medium::Rotational));
    struct StopAtFirst<'a>(&'a Session);
    impl ProgressSink for StopAtFirst<'_> {
        fn location_done(&self, done: usize, _total: usize) {
            if done == 1 {
                self.0.controller().stop();
            }
        }
    }

    let result = session.scan(&locations, &StopAtFirst(&session)).unwrap();
    assert!(result.cancelled);
    assert_eq!(result.len(), 1);
    assert!(!session.controller().is_active());

    // A fresh run starts with a fresh token.
    let again = session.scan(&locations, &NullSink).unwrap();
    assert!(!again.cancelled);
    assert_eq!(again.len(), 4);
}
