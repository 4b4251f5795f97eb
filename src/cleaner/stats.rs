// Result types and shared accumulators for scan and delete runs

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::category::{Bucket, Category};
use super::progress::{Cadence, DeleteProgress, ProgressSink, ScanBatch};

/// A root to scan, with its category and a label for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub root: PathBuf,
    pub category: Category,
    pub label: String,
    pub recursive: bool,
}

impl Location {
    /// Location with the category's default recursion.
    pub fn new(root: impl Into<PathBuf>, category: Category, label: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            category,
            label: label.into(),
            recursive: category.default_recursive(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

/// A file (or synthetic aggregate) accepted for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub path: PathBuf,
    pub category: Category,
    pub size_bytes: u64,
    pub tag: String,
}

impl Candidate {
    pub fn file(path: PathBuf, category: Category, size_bytes: u64, tag: &str) -> Self {
        Self {
            path,
            category,
            size_bytes,
            tag: tag.to_string(),
        }
    }

    /// Stand-in for a whole subsystem (recycle bin, event logs).
    pub fn aggregate(category: Category, size_bytes: u64, tag: String) -> Self {
        Self {
            path: PathBuf::new(),
            category,
            size_bytes,
            tag,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.category.is_aggregate()
    }
}

/// Candidate count per counting bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub plain: usize,
    pub browser: usize,
    pub recycle: usize,
}

impl BucketCounts {
    pub fn add(&mut self, bucket: Bucket) {
        *self.slot(bucket) += 1;
    }

    pub fn get(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Plain => self.plain,
            Bucket::Browser => self.browser,
            Bucket::Recycle => self.recycle,
        }
    }

    pub fn total(&self) -> usize {
        self.plain + self.browser + self.recycle
    }

    fn slot(&mut self, bucket: Bucket) -> &mut usize {
        match bucket {
            Bucket::Plain => &mut self.plain,
            Bucket::Browser => &mut self.browser,
            Bucket::Recycle => &mut self.recycle,
        }
    }
}

/// Everything a scan found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub candidates: Vec<Candidate>,
    pub total_bytes: u64,
    pub counts: BucketCounts,
    /// Distinct location roots, in scan order. Used for empty-dir cleanup.
    pub roots: Vec<PathBuf>,
    pub cancelled: bool,
}

impl ScanResult {
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    pub fn push(&mut self, candidate: Candidate) {
        self.total_bytes += candidate.size_bytes;
        self.counts.add(candidate.category.bucket());
        self.candidates.push(candidate);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains_category(&self, category: Category) -> bool {
        self.candidates.iter().any(|c| c.category == category)
    }

    /// Bytes accounted to one category.
    pub fn bytes_for(&self, category: Category) -> u64 {
        self.candidates
            .iter()
            .filter(|c| c.category == category)
            .map(|c| c.size_bytes)
            .sum()
    }

    /// Keep only candidates matching `keep`, then rebuild totals.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Candidate) -> bool,
    {
        self.candidates.retain(keep);
        self.recompute();
    }

    pub fn recompute(&mut self) {
        self.total_bytes = self.candidates.iter().map(|c| c.size_bytes).sum();
        let mut counts = BucketCounts::default();
        for c in &self.candidates {
            counts.add(c.category.bucket());
        }
        self.counts = counts;
    }

    /// Totals agree with the candidate list.
    pub fn is_consistent(&self) -> bool {
        let sum: u64 = self.candidates.iter().map(|c| c.size_bytes).sum();
        sum == self.total_bytes && self.counts.total() == self.candidates.len()
    }
}

/// Scan aggregate shared by all workers.
///
/// Merges happen under one lock so totals and candidates move together.
/// Candidates not yet shown to the sink wait in `pending` until the cadence
/// gate opens again.
pub struct Aggregate {
    inner: Mutex<AggregateInner>,
    cadence: Cadence,
}

struct AggregateInner {
    result: ScanResult,
    pending: Vec<Candidate>,
}

impl Aggregate {
    pub fn new(roots: Vec<PathBuf>, cadence: Cadence) -> Self {
        Self {
            inner: Mutex::new(AggregateInner {
                result: ScanResult::with_roots(roots),
                pending: Vec::new(),
            }),
            cadence,
        }
    }

    /// Fold one worker batch in and notify the sink if the gate is open.
    pub fn merge(&self, batch: Vec<Candidate>, sink: &dyn ProgressSink) {
        if batch.is_empty() {
            return;
        }
        let mut inner = self.lock();
        for candidate in batch {
            inner.pending.push(candidate.clone());
            inner.result.push(candidate);
        }
        if self.cadence.ready() {
            Self::deliver(&mut inner, sink);
        }
    }

    /// Deliver anything still pending, ignoring the cadence.
    pub fn flush(&self, sink: &dyn ProgressSink) {
        let mut inner = self.lock();
        if !inner.pending.is_empty() {
            Self::deliver(&mut inner, sink);
        }
    }

    /// Consume the aggregate. Pending candidates are already in the result.
    pub fn into_result(self) -> ScanResult {
        let inner = self.inner.into_inner().unwrap_or_else(|e| e.into_inner());
        inner.result
    }

    fn deliver(inner: &mut AggregateInner, sink: &dyn ProgressSink) {
        let batch = ScanBatch {
            candidates: std::mem::take(&mut inner.pending),
            total_bytes: inner.result.total_bytes,
            counts: inner.result.counts,
        };
        sink.scan_batch(&batch);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lock-free counters for a delete run.
#[derive(Debug)]
pub struct DeleteStats {
    pub deleted: AtomicUsize,
    pub skipped: AtomicUsize,
    pub freed_bytes: AtomicU64,
    total_target: usize,
}

impl DeleteStats {
    pub fn new(total_target: usize) -> Self {
        Self {
            deleted: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            freed_bytes: AtomicU64::new(0),
            total_target,
        }
    }

    pub fn record_deleted(&self, bytes: u64) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
        self.freed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_freed(&self, bytes: u64) {
        self.freed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeleteProgress {
        DeleteProgress {
            deleted: self.deleted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            total_target: self.total_target,
            freed_bytes: self.freed_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn into_outcome(self, cancelled: bool) -> CleanupOutcome {
        CleanupOutcome {
            deleted_count: self.deleted.into_inner(),
            skipped_count: self.skipped.into_inner(),
            freed_bytes: self.freed_bytes.into_inner(),
            cancelled,
            finished_at: Local::now(),
        }
    }
}

/// Summary of one clean invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupOutcome {
    pub deleted_count: usize,
    pub skipped_count: usize,
    pub freed_bytes: u64,
    pub cancelled: bool,
    pub finished_at: DateTime<Local>,
}

/// Distinct paths from `roots`, first occurrence wins.
pub fn distinct_roots<'a, I>(roots: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut seen = Vec::<PathBuf>::new();
    for root in roots {
        if !seen.iter().any(|r| r == root) {
            seen.push(root.to_path_buf());
        }
    }
    seen
}
