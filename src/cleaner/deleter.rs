// Delete engine
// Consumes a scan result: clears event logs, deletes files on a bounded
// pool, empties the recycle bin and sweeps empty directories. Per-item
// failures are counted as skipped and never abort the run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::category::Category;
use super::coordinator::ServiceCoordinator;
use super::error::CleanError;
use super::patterns::Classifier;
use super::progress::{Cadence, Phase, ProgressSink, DEFAULT_INTERVAL};
use super::stats::{Candidate, CleanupOutcome, DeleteStats, ScanResult};
use crate::native::{EmptyOutcome, EventLog, RecycleBin};

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Deleted,
    /// Vanished since the scan. Not counted either way.
    Gone,
    Skipped,
}

pub struct DeleteEngine {
    classifier: Arc<Classifier>,
    recycle: Arc<dyn RecycleBin>,
    events: Arc<dyn EventLog>,
    coordinator: Arc<ServiceCoordinator>,
    progress_interval: Duration,
    event_log_workers: usize,
}

impl DeleteEngine {
    pub fn new(
        classifier: Arc<Classifier>,
        recycle: Arc<dyn RecycleBin>,
        events: Arc<dyn EventLog>,
        coordinator: Arc<ServiceCoordinator>,
    ) -> Self {
        Self {
            classifier,
            recycle,
            events,
            coordinator,
            progress_interval: DEFAULT_INTERVAL,
            event_log_workers: num_cpus::get(),
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Event-log clearing is API-bound, so it gets its own pool size.
    pub fn with_event_log_workers(mut self, workers: usize) -> Self {
        self.event_log_workers = workers.max(1);
        self
    }

    /// Delete everything in `result` with `degree` workers.
    ///
    /// Handled candidates (deleted, already gone, emptied aggregates) are
    /// removed from `result`; skipped ones stay so a later run can retry.
    pub fn delete(
        &self,
        result: &mut ScanResult,
        degree: usize,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<CleanupOutcome, CleanError> {
        let start_time = Instant::now();
        let degree = degree.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(degree)
            .thread_name(|i| format!("tempsweep-delete-{i}"))
            .build()?;

        let stats = DeleteStats::new(result.len());
        let cadence = Cadence::new(self.progress_interval);
        let mut handled = vec![false; result.len()];

        info!(candidates = result.len(), degree, "clean started");

        let guard = if result.contains_category(Category::UpdateCache) && !cancel.is_cancelled() {
            sink.phase(Phase::StoppingServices);
            Some(self.coordinator.quiesce())
        } else {
            None
        };

        if let Some(idx) = position_of(result, Category::EventLog) {
            if !cancel.is_cancelled() {
                sink.phase(Phase::ClearingEventLogs);
                let cleared = self.clear_event_logs(cancel)?;
                if cleared > 0 {
                    stats.record_deleted(cleared);
                } else {
                    stats.record_skipped();
                }
                handled[idx] = true;
            }
        }

        sink.phase(Phase::Deleting);
        let files: Vec<(usize, &Candidate)> = result
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_aggregate())
            .collect();

        let done: Vec<usize> = pool.install(|| {
            files
                .par_iter()
                .filter_map(|&(idx, candidate)| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let removal = remove_file(&candidate.path);
                    match removal {
                        Removal::Deleted => stats.record_deleted(candidate.size_bytes),
                        Removal::Skipped => stats.record_skipped(),
                        Removal::Gone => {}
                    }
                    if cadence.ready() {
                        sink.delete_progress(&stats.snapshot());
                    }
                    (removal != Removal::Skipped).then_some(idx)
                })
                .collect()
        });
        for idx in done {
            handled[idx] = true;
        }
        sink.delete_progress(&stats.snapshot());

        if let Some(guard) = guard {
            sink.phase(Phase::RestoringServices);
            guard.release();
        }

        if let Some(idx) = position_of(result, Category::RecycleBin) {
            if !cancel.is_cancelled() {
                sink.phase(Phase::EmptyingRecycleBin);
                let scanned = result.candidates[idx].size_bytes;
                if self.empty_recycle_bin(scanned, &stats) {
                    handled[idx] = true;
                }
                sink.delete_progress(&stats.snapshot());
            }
        }

        if !cancel.is_cancelled() {
            sink.phase(Phase::RemovingEmptyDirs);
            let removed: usize = result
                .roots
                .iter()
                .map(|root| remove_empty_dirs(root, &self.classifier))
                .sum();
            if removed > 0 {
                info!(removed, "removed empty directories");
            }
        }

        let mut handled_iter = handled.into_iter();
        result.retain(|_| !handled_iter.next().unwrap_or(false));

        let cancelled = cancel.is_cancelled();
        result.cancelled = cancelled;
        let outcome = stats.into_outcome(cancelled);
        info!(
            deleted = outcome.deleted_count,
            skipped = outcome.skipped_count,
            freed = outcome.freed_bytes,
            cancelled,
            elapsed = ?start_time.elapsed(),
            "clean finished"
        );
        Ok(outcome)
    }

    /// Clear every channel on the event-log pool. Returns bytes released.
    fn clear_event_logs(&self, cancel: &CancelToken) -> Result<u64, CleanError> {
        let channels = self.events.channels();
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.event_log_workers)
            .thread_name(|i| format!("tempsweep-evtlog-{i}"))
            .build()?;

        let cleared = pool.install(|| {
            channels
                .par_iter()
                .map(|channel| {
                    if cancel.is_cancelled() {
                        return 0;
                    }
                    match self.events.clear(&channel.name) {
                        Ok(()) => channel.reclaimable_bytes,
                        Err(e) => {
                            debug!(channel = %channel.name, error = %e, "channel not cleared");
                            0
                        }
                    }
                })
                .sum::<u64>()
        });
        info!(channels = channels.len(), bytes = cleared, "event logs cleared");
        Ok(cleared)
    }

    /// Re-query, then empty. Returns whether the aggregate was handled.
    fn empty_recycle_bin(&self, scanned_bytes: u64, stats: &DeleteStats) -> bool {
        let bytes = match self.recycle.query() {
            Ok(info) => info.total_bytes,
            Err(e) => {
                warn!(error = %e, "recycle bin re-query failed, using scan-time size");
                scanned_bytes
            }
        };
        match self.recycle.empty() {
            EmptyOutcome::Success | EmptyOutcome::AlreadyEmpty => {
                stats.record_deleted(bytes);
                true
            }
            EmptyOutcome::Failure => {
                stats.record_skipped();
                false
            }
        }
    }
}

fn position_of(result: &ScanResult, category: Category) -> Option<usize> {
    result.candidates.iter().position(|c| c.category == category)
}

fn remove_file(path: &Path) -> Removal {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Removal::Gone,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot stat file, skipping");
            return Removal::Skipped;
        }
    };
    clear_protection(path, &metadata);

    match fs::remove_file(path) {
        Ok(()) => Removal::Deleted,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Removal::Gone,
        Err(e) => {
            let err = CleanError::from_io_error(e, "deleting file", Some(path.to_path_buf()));
            if err.is_access_denied() {
                warn!(path = %path.display(), "access denied, skipping");
            } else {
                warn!(error = %err, "delete failed, skipping");
            }
            Removal::Skipped
        }
    }
}

/// Drop read-only / system attributes so the delete can go through.
#[cfg(windows)]
fn clear_protection(path: &Path, metadata: &fs::Metadata) {
    use std::os::windows::ffi::OsStrExt;
    use std::os::windows::fs::MetadataExt;
    use windows_sys::Win32::Storage::FileSystem::{
        SetFileAttributesW, FILE_ATTRIBUTE_NORMAL, FILE_ATTRIBUTE_READONLY, FILE_ATTRIBUTE_SYSTEM,
    };

    if metadata.file_attributes() & (FILE_ATTRIBUTE_READONLY | FILE_ATTRIBUTE_SYSTEM) == 0 {
        return;
    }
    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    if unsafe { SetFileAttributesW(wide.as_ptr(), FILE_ATTRIBUTE_NORMAL) } == 0 {
        debug!(path = %path.display(), "could not clear attributes");
    }
}

#[cfg(unix)]
fn clear_protection(path: &Path, metadata: &fs::Metadata) {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = metadata.permissions();
    if metadata.file_type().is_symlink() || perms.mode() & 0o200 != 0 {
        return;
    }
    perms.set_mode(perms.mode() | 0o200);
    if let Err(e) = fs::set_permissions(path, perms) {
        debug!(path = %path.display(), error = %e, "could not make file writable");
    }
}

#[cfg(not(any(unix, windows)))]
fn clear_protection(_path: &Path, _metadata: &fs::Metadata) {}

/// Remove directories under `root` that are empty, deepest first.
/// `root` itself and protected folders are kept. Returns how many went.
pub fn remove_empty_dirs(root: &Path, classifier: &Classifier) -> usize {
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .parallelism(Parallelism::Serial)
        .skip_hidden(false)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.path())
        .filter(|p| !classifier.is_in_protected_folder(p))
        .collect();
    dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

    dirs.iter().filter(|d| fs::remove_dir(d).is_ok()).count()
}
