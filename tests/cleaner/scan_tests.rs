// Tests for the scan engine
// Real directory trees for the walk, fakes for the recycle bin and event logs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tempsweep::cleaner::{CancelToken, Category, Location, NullSink, Phase, ProgressSink, ScanResult};

use crate::fakes::{aged_file, scanner, FakeEventLog, FakeRecycleBin, Recorder};

fn quiet_scan(locations: &[Location], degree: usize) -> ScanResult {
    let engine = scanner(Arc::new(FakeRecycleBin::empty_bin()), Arc::new(FakeEventLog::default()));
    engine
        .scan(locations, degree, &CancelToken::new(), &NullSink)
        .unwrap()
}

#[test]
fn test_scan_accepts_only_old_junk() {
    let dir = TempDir::new().unwrap();
    aged_file(&dir.path().join("a.tmp"), 100, 600);
    aged_file(&dir.path().join("b.tmp"), 50, 10);
    aged_file(&dir.path().join("desktop.ini"), 20, 600);

    let result = quiet_scan(&[Location::new(dir.path(), Category::UserTemp, "Temp")], 2);

    assert_eq!(result.len(), 1);
    let found = &result.candidates[0];
    assert_eq!(found.path, dir.path().join("a.tmp"));
    assert_eq!(found.size_bytes, 100);
    assert_eq!(found.tag, "Temp");
    assert_eq!(result.total_bytes, 100);
    assert_eq!(result.counts.plain, 1);
    assert!(!result.cancelled);
}

#[test]
fn test_scan_skips_protected_folders() {
    let dir = TempDir::new().unwrap();
    aged_file(&dir.path().join("Documents/old.bak"), 10, 3600);
    aged_file(&dir.path().join("Steam/shader.tmp"), 10, 3600);
    aged_file(&dir.path().join("nested/deeper/crash.dmp"), 30, 3600);

    let result = quiet_scan(&[Location::new(dir.path(), Category::UserTemp, "Temp")], 1);

    assert_eq!(result.len(), 1);
    assert_eq!(result.candidates[0].path, dir.path().join("nested/deeper/crash.dmp"));
}

#[test]
fn test_drive_root_is_top_level_only() {
    let dir = TempDir::new().unwrap();
    aged_file(&dir.path().join("report.bak"), 10, 3600);
    aged_file(&dir.path().join("notes.txt"), 10, 3600);
    aged_file(&dir.path().join("sub/old.bak"), 10, 3600);

    let location = Location::new(dir.path(), Category::DriveRoot, "D:");
    assert!(!location.recursive);
    let result = quiet_scan(&[location], 1);

    assert_eq!(result.len(), 1);
    assert_eq!(result.candidates[0].path, dir.path().join("report.bak"));
    // Non-recursive roots are not swept for empty directories later.
    assert!(result.roots.is_empty());
}

#[test]
fn test_missing_location_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let gone = dir.path().join("does-not-exist");
    let sink = Recorder::default();
    let engine = scanner(Arc::new(FakeRecycleBin::empty_bin()), Arc::new(FakeEventLog::default()));

    let result = engine
        .scan(&[Location::new(&gone, Category::SystemTemp, "Temp")], 2, &CancelToken::new(), &sink)
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(sink.locations.lock().unwrap().len(), 1);
}

#[test]
fn test_batches_always_match_running_totals() {
    let dir = TempDir::new().unwrap();
    let mut locations = Vec::new();
    for l in 0..6 {
        let root = dir.path().join(format!("loc{l}"));
        for f in 0..25 {
            aged_file(&root.join(format!("f{f}.tmp")), 10 + f, 3600);
        }
        locations.push(Location::new(root, Category::SystemTemp, "Temp"));
    }

    let sink = Recorder::default();
    let engine = scanner(Arc::new(FakeRecycleBin::holding(3, 4096)), Arc::new(FakeEventLog::default()))
        .with_flush(Duration::from_secs(60), 7);
    let result = engine.scan(&locations, 4, &CancelToken::new(), &sink).unwrap();

    let batches = sink.batches.lock().unwrap();
    assert!(batches.len() > 1);
    let mut seen_bytes = 0u64;
    let mut seen_items = 0usize;
    for batch in batches.iter() {
        seen_bytes += batch.candidates.iter().map(|c| c.size_bytes).sum::<u64>();
        seen_items += batch.candidates.len();
        assert_eq!(batch.total_bytes, seen_bytes);
        assert_eq!(batch.counts.total(), seen_items);
    }

    assert_eq!(result.len(), 6 * 25 + 1);
    assert_eq!(seen_items, result.len());
    assert_eq!(seen_bytes, result.total_bytes);
    assert!(result.is_consistent());
}

#[test]
fn test_workers_never_exceed_degree() {
    let dir = TempDir::new().unwrap();
    let locations: Vec<Location> = (0..10)
        .map(|l| {
            let root = dir.path().join(format!("loc{l}"));
            for f in 0..5 {
                aged_file(&root.join(format!("f{f}.bak")), 8, 3600);
            }
            Location::new(root, Category::Other, "Extra")
        })
        .collect();

    for degree in [1, 2, 3] {
        let sink = Recorder::default();
        let engine = scanner(Arc::new(FakeRecycleBin::empty_bin()), Arc::new(FakeEventLog::default()));
        let result = engine.scan(&locations, degree, &CancelToken::new(), &sink).unwrap();

        assert_eq!(result.len(), 50);
        assert!(sink.worker_threads() <= degree, "degree {degree}");
        let done: Vec<usize> = sink.locations.lock().unwrap().iter().map(|l| l.0).collect();
        assert_eq!(done.len(), 10);
        assert!(done.iter().all(|&d| d >= 1 && d <= 10));
    }
}

/// Cancels the run once `after` locations have finished.
struct CancelAfter {
    token: CancelToken,
    after: usize,
}

impl ProgressSink for CancelAfter {
    fn location_done(&self, done: usize, _total: usize) {
        if done == self.after {
            self.token.cancel();
        }
    }
}

#[test]
fn test_cancel_keeps_partial_results() {
    let dir = TempDir::new().unwrap();
    let roots: Vec<PathBuf> = (0..5).map(|l| dir.path().join(format!("loc{l}"))).collect();
    for root in &roots {
        aged_file(&root.join("x.tmp"), 100, 3600);
    }
    let locations: Vec<Location> = roots
        .iter()
        .map(|r| Location::new(r, Category::UserTemp, "Temp"))
        .collect();

    let recycle = Arc::new(FakeRecycleBin::holding(5, 2048));
    let engine = scanner(recycle, Arc::new(FakeEventLog::default()));
    let token = CancelToken::new();
    let sink = CancelAfter {
        token: token.clone(),
        after: 2,
    };

    let result = engine.scan(&locations, 1, &token, &sink).unwrap();

    assert!(result.cancelled);
    assert_eq!(result.len(), 2);
    for candidate in &result.candidates {
        assert!(candidate.path.starts_with(&roots[0]) || candidate.path.starts_with(&roots[1]));
    }
    // Subsystems are not queried once cancelled.
    assert!(!result.contains_category(Category::RecycleBin));
    assert!(result.is_consistent());
}

#[test]
fn test_cancelled_before_start_finds_nothing() {
    let dir = TempDir::new().unwrap();
    aged_file(&dir.path().join("x.tmp"), 100, 3600);
    let token = CancelToken::new();
    token.cancel();

    let engine = scanner(Arc::new(FakeRecycleBin::holding(1, 10)), Arc::new(FakeEventLog::default()));
    let result = engine
        .scan(&[Location::new(dir.path(), Category::UserTemp, "Temp")], 2, &token, &NullSink)
        .unwrap();

    assert!(result.cancelled);
    assert!(result.is_empty());
}

#[test]
fn test_recycle_bin_becomes_one_aggregate() {
    let engine = scanner(Arc::new(FakeRecycleBin::holding(5, 2048)), Arc::new(FakeEventLog::default()));
    let sink = Recorder::default();
    let result = engine.scan(&[], 2, &CancelToken::new(), &sink).unwrap();

    assert_eq!(result.len(), 1);
    let bin = &result.candidates[0];
    assert_eq!(bin.category, Category::RecycleBin);
    assert_eq!(bin.size_bytes, 2048);
    assert_eq!(bin.tag, "5 items");
    assert!(bin.is_aggregate());
    assert_eq!(result.counts.recycle, 1);
    assert_eq!(sink.phases(), vec![Phase::Scanning, Phase::QueryingSubsystems]);
}

#[test]
fn test_subsystems_respect_toggles() {
    let engine = scanner(Arc::new(FakeRecycleBin::holding(5, 2048)), Arc::new(FakeEventLog::default()))
        .with_recycle_bin(false);
    assert!(engine.scan(&[], 1, &CancelToken::new(), &NullSink).unwrap().is_empty());

    // A bin that cannot be queried is skipped, not an error.
    let engine = scanner(Arc::new(FakeRecycleBin::broken()), Arc::new(FakeEventLog::default()));
    assert!(engine.scan(&[], 1, &CancelToken::new(), &NullSink).unwrap().is_empty());
}

#[test]
fn test_event_logs_become_one_aggregate() {
    let events = Arc::new(FakeEventLog::with_channels(&[("Application", 100), ("System", 200)]));
    let engine = scanner(Arc::new(FakeRecycleBin::empty_bin()), events).with_event_logs(true);
    let result = engine.scan(&[], 1, &CancelToken::new(), &NullSink).unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.candidates[0].category, Category::EventLog);
    assert_eq!(result.candidates[0].size_bytes, 300);
    assert_eq!(result.counts.plain, 1);
}

#[test]
fn test_duplicate_roots_recorded_once() {
    let dir = TempDir::new().unwrap();
    let locations = vec![
        Location::new(dir.path(), Category::UserTemp, "Temp"),
        Location::new(dir.path(), Category::Thumbnails, "Thumbs"),
    ];
    let result = quiet_scan(&locations, 2);
    assert_eq!(result.roots, vec![dir.path().to_path_buf()]);
}

#[test]
fn test_update_cache_deadline_only_stops_that_location() {
    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("SoftwareDistribution/Download");
    let temp = dir.path().join("Temp");
    aged_file(&cache.join("abc/payload.cab"), 500, 3600);
    aged_file(&temp.join("old.tmp"), 70, 3600);

    let engine = scanner(Arc::new(FakeRecycleBin::empty_bin()), Arc::new(FakeEventLog::default()))
        .with_update_cache_deadline(Duration::ZERO);
    let locations = [
        Location::new(&cache, Category::UpdateCache, "Update cache"),
        Location::new(&temp, Category::SystemTemp, "Temp"),
    ];
    let result = engine.scan(&locations, 1, &CancelToken::new(), &NullSink).unwrap();

    assert!(!result.cancelled);
    assert_eq!(result.len(), 1);
    assert_eq!(result.candidates[0].path, temp.join("old.tmp"));
    assert!(!result.contains_category(Category::UpdateCache));
}
