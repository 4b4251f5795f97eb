//! Progress reporting.
//!
//! The engine never renders anything itself. It pushes events into a
//! [`ProgressSink`] at a bounded rate; the front end decides what to show.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

use super::stats::{BucketCounts, Candidate};

/// Default gap between two sink notifications.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

/// Coarse stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Scanning,
    QueryingSubsystems,
    StoppingServices,
    ClearingEventLogs,
    Deleting,
    RestoringServices,
    EmptyingRecycleBin,
    RemovingEmptyDirs,
    Done,
}

/// Newly accepted candidates plus the aggregate totals after merging them.
#[derive(Debug, Clone, Serialize)]
pub struct ScanBatch {
    pub candidates: Vec<Candidate>,
    pub total_bytes: u64,
    pub counts: BucketCounts,
}

/// Delete counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteProgress {
    pub deleted: usize,
    pub skipped: usize,
    pub total_target: usize,
    pub freed_bytes: u64,
}

/// Receiver of engine progress. Calls may come from worker threads.
pub trait ProgressSink: Send + Sync {
    fn scan_batch(&self, _batch: &ScanBatch) {}

    fn location_done(&self, _done: usize, _total: usize) {}

    fn delete_progress(&self, _progress: &DeleteProgress) {}

    fn phase(&self, _phase: Phase) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {}

/// Owned form of a sink call, for [`ChannelSink`].
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Batch(ScanBatch),
    LocationDone { done: usize, total: usize },
    Delete(DeleteProgress),
    Phase(Phase),
}

/// Forwards progress to another thread over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        // Receiver gone means nobody is watching any more.
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn scan_batch(&self, batch: &ScanBatch) {
        self.send(ProgressEvent::Batch(batch.clone()));
    }

    fn location_done(&self, done: usize, total: usize) {
        self.send(ProgressEvent::LocationDone { done, total });
    }

    fn delete_progress(&self, progress: &DeleteProgress) {
        self.send(ProgressEvent::Delete(*progress));
    }

    fn phase(&self, phase: Phase) {
        self.send(ProgressEvent::Phase(phase));
    }
}

/// Rate gate shared by concurrent callers.
///
/// `ready()` returns true at most once per interval; the very first call
/// always passes.
#[derive(Debug)]
pub struct Cadence {
    origin: Instant,
    interval: Duration,
    // Milliseconds since `origin` of the last pass, plus one. Zero means never.
    last: AtomicU64,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval,
            last: AtomicU64::new(0),
        }
    }

    pub fn ready(&self) -> bool {
        let now = self.origin.elapsed().as_millis() as u64 + 1;
        let interval = self.interval.as_millis() as u64;
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            if last != 0 && now.saturating_sub(last) < interval {
                return false;
            }
            match self
                .last
                .compare_exchange_weak(last, now, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}
