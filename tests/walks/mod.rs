// Helper walks must stay on the calling thread
// Separate target: it claims rayon's global pool, which can be built once per process.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tempsweep::cleaner::deleter::remove_empty_dirs;
use tempsweep::cleaner::{Classifier, CleanError, ServiceCoordinator};
use tempsweep::native::{ServiceControl, ServiceStatus};

struct AlwaysRunning;

impl ServiceControl for AlwaysRunning {
    fn status(&self, _name: &str) -> Result<ServiceStatus, CleanError> {
        Ok(ServiceStatus::Running)
    }

    fn stop(&self, _name: &str, _timeout: Duration) -> Result<(), CleanError> {
        Ok(())
    }

    fn start(&self, _name: &str) -> Result<(), CleanError> {
        Ok(())
    }
}

/// Run `f` on its own thread and give up after a few seconds.
fn within_deadline<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> Option<T> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(Duration::from_secs(10)).ok()
}

#[test]
fn test_walks_do_not_need_the_global_pool() {
    // One global worker, parked for the whole test. Any walk that hands
    // directory reads to the global pool stalls or comes back short.
    rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build_global()
        .unwrap();
    let (release, parked) = mpsc::channel::<()>();
    rayon::spawn(move || {
        let _ = parked.recv();
    });

    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    for i in 0..50 {
        std::fs::create_dir_all(root.join(format!("d{i}/e/f"))).unwrap();
    }
    let removed = within_deadline({
        let root = root.clone();
        move || remove_empty_dirs(&root, &Classifier::new())
    });
    assert_eq!(removed, Some(150));

    let download = TempDir::new().unwrap();
    std::fs::create_dir_all(download.path().join("a/b")).unwrap();
    std::fs::write(download.path().join("a/b/payload.cab"), b"x").unwrap();
    let download_dir = download.path().to_path_buf();
    let active = within_deadline(move || {
        ServiceCoordinator::new(Arc::new(AlwaysRunning)).is_transfer_active(&download_dir)
    });
    assert_eq!(active, Some(true));

    #[cfg(not(windows))]
    {
        use tempsweep::native::recycle::TrashDir;
        use tempsweep::native::RecycleBin;

        let trash = TempDir::new().unwrap();
        std::fs::create_dir_all(trash.path().join("files/folder/nested")).unwrap();
        std::fs::create_dir_all(trash.path().join("info")).unwrap();
        std::fs::write(trash.path().join("files/folder/nested/a.bin"), vec![0u8; 300]).unwrap();
        let bin = TrashDir::at(trash.path());
        let info = within_deadline(move || bin.query().map(|i| (i.item_count, i.total_bytes)).ok());
        assert_eq!(info, Some(Some((1, 300))));
    }

    drop(release);
}
