// Run orchestration
// One engine, one operation at a time. A scan or clean is only accepted
// while the engine is Idle; the state returns to Idle when it finishes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::cancel::CancellationController;
use super::config::Options;
use super::coordinator::ServiceCoordinator;
use super::deleter::DeleteEngine;
use super::error::CleanError;
use super::patterns::Classifier;
use super::progress::{Phase, ProgressSink};
use super::scanner::ScanEngine;
use super::stats::{CleanupOutcome, Location, ScanResult};
use super::tuner::ConcurrencyTuner;
use crate::native;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Scanning,
    Cleaning,
}

impl RunState {
    fn as_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Scanning => 1,
            RunState::Cleaning => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Scanning,
            2 => RunState::Cleaning,
            _ => RunState::Idle,
        }
    }
}

/// Atomic holder for the engine's [`RunState`].
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from Idle to `target`, or report what is running instead.
    pub fn begin(&self, target: RunState) -> Result<RunGuard<'_>, CleanError> {
        self.0
            .compare_exchange(
                RunState::Idle.as_u8(),
                target.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| RunGuard { cell: self })
            .map_err(|current| CleanError::Busy(RunState::from_u8(current)))
    }
}

/// Returns the state to Idle when dropped.
pub struct RunGuard<'a> {
    cell: &'a StateCell,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.cell.0.store(RunState::Idle.as_u8(), Ordering::Release);
    }
}

/// Scan and clean front door.
pub struct Session {
    state: StateCell,
    controller: Arc<CancellationController>,
    tuner: ConcurrencyTuner,
    degree_override: Option<usize>,
    scanner: ScanEngine,
    deleter: DeleteEngine,
}

impl Session {
    /// Session wired to the platform's capabilities.
    pub fn new(options: &Options) -> Self {
        let classifier = Arc::new(Classifier::new());
        let recycle = native::recycle_bin();
        let events = native::event_log();
        let engine = &options.engine;

        let scanner = ScanEngine::new(classifier.clone(), recycle.clone(), events.clone())
            .with_recycle_bin(options.recycle_bin)
            .with_event_logs(options.event_logs)
            .with_update_cache_deadline(engine.update_cache_deadline())
            .with_flush(engine.scan_flush_interval(), engine.scan_flush_items)
            .with_progress_interval(engine.progress_interval());
        let coordinator = Arc::new(ServiceCoordinator::new(native::service_control()));
        let deleter = DeleteEngine::new(classifier, recycle, events, coordinator)
            .with_progress_interval(engine.progress_interval());

        Self::from_parts(scanner, deleter, ConcurrencyTuner::new()).with_degree(engine.degree)
    }

    pub fn from_parts(scanner: ScanEngine, deleter: DeleteEngine, tuner: ConcurrencyTuner) -> Self {
        Self {
            state: StateCell::default(),
            controller: Arc::new(CancellationController::new()),
            tuner,
            degree_override: None,
            scanner,
            deleter,
        }
    }

    /// Fixed worker count instead of the probed one.
    pub fn with_degree(mut self, degree: Option<usize>) -> Self {
        self.degree_override = degree.map(|d| d.max(1));
        self
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Shared controller for stop requests and sleep notifications.
    pub fn controller(&self) -> Arc<CancellationController> {
        Arc::clone(&self.controller)
    }

    pub fn degree(&self) -> usize {
        self.degree_override.unwrap_or_else(|| self.tuner.degree())
    }

    pub fn scan(
        &self,
        locations: &[Location],
        sink: &dyn ProgressSink,
    ) -> Result<ScanResult, CleanError> {
        let _run = self.state.begin(RunState::Scanning)?;
        let token = self.controller.begin();
        let result = self.scanner.scan(locations, self.degree(), &token, sink);
        self.controller.finish(&token);
        sink.phase(Phase::Done);
        result
    }

    /// Delete what `result` holds. Handled candidates leave `result`.
    pub fn clean(
        &self,
        result: &mut ScanResult,
        sink: &dyn ProgressSink,
    ) -> Result<CleanupOutcome, CleanError> {
        let _run = self.state.begin(RunState::Cleaning)?;
        let token = self.controller.begin();
        let outcome = self.deleter.delete(result, self.degree(), &token, sink);
        self.controller.finish(&token);
        sink.phase(Phase::Done);
        if let Ok(o) = &outcome {
            if o.cancelled && self.controller.was_interrupted_by_sleep() {
                info!("clean was interrupted by system sleep");
            }
        }
        outcome
    }
}
