// Scan engine
// Walks every location on a bounded worker pool, classifies each file and
// accumulates accepted candidates into one shared aggregate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, trace, warn};

use super::cancel::CancelToken;
use super::category::Category;
use super::error::CleanError;
use super::patterns::{Classifier, FileFacts, Verdict};
use super::progress::{Cadence, Phase, ProgressSink, DEFAULT_INTERVAL};
use super::stats::{distinct_roots, Aggregate, Candidate, Location, ScanResult};
use crate::native::{EventLog, RecycleBin};

/// Update-cache enumeration can hang behind a live download.
pub const UPDATE_CACHE_DEADLINE: Duration = Duration::from_secs(30);
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(300);
pub const FLUSH_ITEMS: usize = 500;

/// Engine for finding junk under a set of locations
pub struct ScanEngine {
    classifier: Arc<Classifier>,
    recycle: Arc<dyn RecycleBin>,
    events: Arc<dyn EventLog>,
    include_recycle_bin: bool,
    include_event_logs: bool,
    update_cache_deadline: Duration,
    flush_interval: Duration,
    flush_items: usize,
    progress_interval: Duration,
}

impl ScanEngine {
    pub fn new(
        classifier: Arc<Classifier>,
        recycle: Arc<dyn RecycleBin>,
        events: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            classifier,
            recycle,
            events,
            include_recycle_bin: true,
            include_event_logs: false,
            update_cache_deadline: UPDATE_CACHE_DEADLINE,
            flush_interval: FLUSH_INTERVAL,
            flush_items: FLUSH_ITEMS,
            progress_interval: DEFAULT_INTERVAL,
        }
    }

    /// Query the recycle bin after the walk
    pub fn with_recycle_bin(mut self, enabled: bool) -> Self {
        self.include_recycle_bin = enabled;
        self
    }

    /// Query event-log channels after the walk
    pub fn with_event_logs(mut self, enabled: bool) -> Self {
        self.include_event_logs = enabled;
        self
    }

    pub fn with_update_cache_deadline(mut self, deadline: Duration) -> Self {
        self.update_cache_deadline = deadline;
        self
    }

    /// Per-worker batch flush thresholds
    pub fn with_flush(mut self, interval: Duration, items: usize) -> Self {
        self.flush_interval = interval;
        self.flush_items = items.max(1);
        self
    }

    /// Minimum gap between two sink notifications
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Scan `locations` with `degree` workers.
    ///
    /// Only a worker pool that cannot be built is an error. Unreadable
    /// paths are skipped; cancellation returns what was found so far with
    /// `cancelled` set.
    pub fn scan(
        &self,
        locations: &[Location],
        degree: usize,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<ScanResult, CleanError> {
        let start_time = Instant::now();
        let degree = degree.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(degree)
            .thread_name(|i| format!("tempsweep-scan-{i}"))
            .build()?;

        let roots = distinct_roots(
            locations
                .iter()
                .filter(|l| l.recursive)
                .map(|l| l.root.as_path()),
        );
        let aggregate = Aggregate::new(roots, Cadence::new(self.progress_interval));
        let total = locations.len();
        let done = AtomicUsize::new(0);

        info!(locations = total, degree, "scan started");
        sink.phase(Phase::Scanning);

        pool.install(|| {
            locations.par_iter().for_each(|location| {
                if cancel.is_cancelled() {
                    return;
                }
                self.scan_location(location, cancel, &aggregate, sink);
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                sink.location_done(finished, total);
            });
        });

        if !cancel.is_cancelled() {
            sink.phase(Phase::QueryingSubsystems);
            self.query_subsystems(&aggregate, sink);
        }

        aggregate.flush(sink);
        let mut result = aggregate.into_result();
        result.cancelled = cancel.is_cancelled();

        info!(
            candidates = result.len(),
            bytes = result.total_bytes,
            cancelled = result.cancelled,
            elapsed = ?start_time.elapsed(),
            "scan finished"
        );
        Ok(result)
    }

    fn scan_location(
        &self,
        location: &Location,
        cancel: &CancelToken,
        aggregate: &Aggregate,
        sink: &dyn ProgressSink,
    ) {
        let token = if location.category == Category::UpdateCache {
            cancel.with_deadline(self.update_cache_deadline)
        } else {
            cancel.clone()
        };

        let now = SystemTime::now();
        let mut walker = WalkDir::new(&location.root)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false);
        if !location.recursive {
            walker = walker.max_depth(1);
        }

        let mut batch: Vec<Candidate> = Vec::new();
        let mut last_flush = Instant::now();
        let mut seen = 0usize;

        for entry in walker {
            if token.is_cancelled() {
                if token.deadline_expired() && !token.is_stop_requested() {
                    warn!(
                        root = %location.root.display(),
                        found = batch.len(),
                        "location timed out, keeping what was found"
                    );
                }
                break;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(root = %location.root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping file without metadata");
                    continue;
                }
            };
            seen += 1;

            if is_system_file(&metadata) && location.category != Category::RecycleDir {
                continue;
            }

            // No readable mtime: treat as brand new.
            let modified = metadata.modified().unwrap_or(now);
            let facts = FileFacts {
                path: &path,
                size: metadata.len(),
                modified,
            };
            match self.classifier.classify(&facts, location.category, now) {
                Verdict::Junk => batch.push(Candidate::file(
                    path.clone(),
                    location.category,
                    facts.size,
                    &location.label,
                )),
                verdict => trace!(path = %path.display(), ?verdict, "not a candidate"),
            }

            if batch.len() >= self.flush_items || last_flush.elapsed() >= self.flush_interval {
                aggregate.merge(std::mem::take(&mut batch), sink);
                last_flush = Instant::now();
            }
        }

        aggregate.merge(batch, sink);
        debug!(root = %location.root.display(), files = seen, "location done");
    }

    fn query_subsystems(&self, aggregate: &Aggregate, sink: &dyn ProgressSink) {
        if self.include_recycle_bin {
            match self.recycle.query() {
                Ok(info) if info.item_count > 0 => {
                    let tag = format!("{} items", info.item_count);
                    aggregate.merge(
                        vec![Candidate::aggregate(Category::RecycleBin, info.total_bytes, tag)],
                        sink,
                    );
                }
                Ok(_) => debug!("recycle bin is empty"),
                Err(e) => warn!(error = %e, "recycle bin query failed"),
            }
        }

        if self.include_event_logs {
            let channels = self.events.channels();
            let bytes: u64 = channels.iter().map(|c| c.reclaimable_bytes).sum();
            if bytes > 0 {
                let tag = format!("{} channels", channels.len());
                aggregate.merge(vec![Candidate::aggregate(Category::EventLog, bytes, tag)], sink);
            }
        }
    }
}

#[cfg(windows)]
fn is_system_file(metadata: &std::fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    metadata.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0
}

#[cfg(not(windows))]
fn is_system_file(_metadata: &std::fs::Metadata) -> bool {
    false
}

