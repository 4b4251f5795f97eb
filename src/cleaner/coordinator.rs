//! Update-service coordination.
//!
//! The OS update service keeps handles open on its download cache. Before
//! deleting from that cache the service (and the transfer service feeding
//! it) is stopped; afterwards both are started again. The stop/start pair is
//! a [`ServiceGuard`]: restore runs when the guard drops, on every path.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use jwalk::{Parallelism, WalkDir};
use tracing::{info, warn};

use super::patterns::extension_lower;
use crate::native::{ServiceControl, ServiceStatus};

pub const PRIMARY_SERVICE: &str = "wuauserv";
pub const TRANSFER_SERVICE: &str = "BITS";

/// A download artifact touched within this window means a transfer is live.
pub const ACTIVE_WINDOW: Duration = Duration::from_secs(10 * 60);
const ARTIFACT_SAMPLE: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub transfer_stop: Duration,
    pub primary_stop: Duration,
    /// Pause after stopping so the OS lets go of file handles.
    pub settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            transfer_stop: Duration::from_secs(15),
            primary_stop: Duration::from_secs(25),
            settle: Duration::from_millis(800),
        }
    }
}

pub struct ServiceCoordinator {
    control: Arc<dyn ServiceControl>,
    timings: Timings,
}

impl ServiceCoordinator {
    pub fn new(control: Arc<dyn ServiceControl>) -> Self {
        Self {
            control,
            timings: Timings::default(),
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Stop the transfer service, then the primary service.
    ///
    /// Failures are logged and otherwise ignored; deletion goes ahead and
    /// the returned guard still restores on drop.
    pub fn quiesce(&self) -> ServiceGuard<'_> {
        let mut stopped_any = false;

        match self.control.status(TRANSFER_SERVICE) {
            Ok(ServiceStatus::Running) => {
                match self.control.stop(TRANSFER_SERVICE, self.timings.transfer_stop) {
                    Ok(()) => stopped_any = true,
                    Err(e) => warn!(error = %e, "stopping transfer service failed"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "querying transfer service failed"),
        }

        let primary = self.control.status(PRIMARY_SERVICE);
        let was_running = primary.as_ref().is_ok_and(|s| s.is_active());
        match primary {
            Ok(ServiceStatus::Stopped) | Ok(ServiceStatus::StopPending) => {}
            Ok(_) => match self.control.stop(PRIMARY_SERVICE, self.timings.primary_stop) {
                Ok(()) => stopped_any = true,
                Err(e) => warn!(error = %e, "stopping update service failed"),
            },
            Err(e) => warn!(error = %e, "querying update service failed"),
        }

        if stopped_any {
            std::thread::sleep(self.timings.settle);
            info!(was_running, "update services stopped");
        }

        ServiceGuard {
            coordinator: self,
            was_running,
            stopped_any,
            released: false,
        }
    }

    /// Start back whichever of the two services is stopped. Best effort.
    pub fn restore(&self) {
        for name in [PRIMARY_SERVICE, TRANSFER_SERVICE] {
            match self.control.status(name) {
                Ok(ServiceStatus::Stopped) => {
                    if let Err(e) = self.control.start(name) {
                        warn!(service = name, error = %e, "restarting service failed");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(service = name, error = %e, "querying service failed"),
            }
        }
        info!("update services restored");
    }

    /// Heuristic: the primary service runs and one of the first few
    /// `.esd`/`.cab` files under `download_dir` changed recently.
    pub fn is_transfer_active(&self, download_dir: &Path) -> bool {
        match self.control.status(PRIMARY_SERVICE) {
            Ok(ServiceStatus::Running) => {}
            _ => return false,
        }
        if !download_dir.is_dir() {
            return false;
        }

        let now = SystemTime::now();
        WalkDir::new(download_dir)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let ext = extension_lower(&e.path());
                ext == ".esd" || ext == ".cab"
            })
            .take(ARTIFACT_SAMPLE)
            .any(|e| {
                e.metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| now.duration_since(t).ok())
                    .is_some_and(|age| age <= ACTIVE_WINDOW)
            })
    }
}

/// Held while the update services are stopped.
pub struct ServiceGuard<'a> {
    coordinator: &'a ServiceCoordinator,
    was_running: bool,
    stopped_any: bool,
    released: bool,
}

impl ServiceGuard<'_> {
    pub fn was_running(&self) -> bool {
        self.was_running
    }

    /// Restore now instead of at end of scope.
    pub fn release(mut self) {
        self.restore_once();
    }

    fn restore_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.was_running || self.stopped_any {
            self.coordinator.restore();
        }
    }
}

impl Drop for ServiceGuard<'_> {
    fn drop(&mut self) {
        self.restore_once();
    }
}
