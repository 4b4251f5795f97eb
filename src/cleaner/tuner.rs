// Concurrency tuning
// Picks one worker count for scan and delete pools from the medium that
// backs the system volume. Probed once, cached for the process lifetime.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use sysinfo::{DiskKind, Disks};
use tracing::{info, warn};

use super::error::CleanError;

/// Upper bound on workers for flash or unknown media.
pub const MAX_DEGREE: usize = 4;
/// Used when the medium probe itself fails.
pub const FALLBACK_DEGREE: usize = 2;

/// Storage medium of the system volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Medium {
    Rotational,
    SolidState,
    Unknown,
}

/// Source of the system volume's medium type.
pub trait MediumProbe: Send + Sync {
    fn probe(&self) -> Result<Medium, CleanError>;
}

/// Probe backed by `sysinfo`'s disk list.
#[derive(Debug, Clone)]
pub struct SysinfoProbe {
    system_mount: PathBuf,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system_mount: system_mount_point(),
        }
    }

    pub fn for_mount(system_mount: PathBuf) -> Self {
        Self { system_mount }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MediumProbe for SysinfoProbe {
    fn probe(&self) -> Result<Medium, CleanError> {
        let disks = Disks::new_with_refreshed_list();
        if disks.list().is_empty() {
            return Err(CleanError::Probe("no disks reported".to_string()));
        }

        // Longest mount point that prefixes the system mount wins.
        let disk = disks
            .list()
            .iter()
            .filter(|d| self.system_mount.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| {
                CleanError::Probe(format!(
                    "no disk mounted at {}",
                    self.system_mount.display()
                ))
            })?;

        Ok(match disk.kind() {
            DiskKind::HDD => Medium::Rotational,
            DiskKind::SSD => Medium::SolidState,
            DiskKind::Unknown(_) => Medium::Unknown,
        })
    }
}

#[cfg(windows)]
fn system_mount_point() -> PathBuf {
    let drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
    PathBuf::from(format!("{}\\", drive.trim_end_matches('\\')))
}

#[cfg(not(windows))]
fn system_mount_point() -> PathBuf {
    PathBuf::from("/")
}

/// Map a probe outcome to a worker count.
pub fn degree_for(probed: &Result<Medium, CleanError>, logical_cores: usize) -> usize {
    match probed {
        Ok(Medium::Rotational) => 1,
        Ok(Medium::SolidState) | Ok(Medium::Unknown) => MAX_DEGREE.min(logical_cores).max(1),
        Err(_) => FALLBACK_DEGREE,
    }
}

/// Lazily probes once and hands out the cached degree afterwards.
pub struct ConcurrencyTuner {
    probe: Arc<dyn MediumProbe>,
    degree: OnceLock<usize>,
}

impl ConcurrencyTuner {
    pub fn new() -> Self {
        Self::with_probe(Arc::new(SysinfoProbe::new()))
    }

    pub fn with_probe(probe: Arc<dyn MediumProbe>) -> Self {
        Self {
            probe,
            degree: OnceLock::new(),
        }
    }

    /// Worker count for scan and delete pools. Never zero.
    pub fn degree(&self) -> usize {
        *self.degree.get_or_init(|| {
            let probed = self.probe.probe();
            let degree = degree_for(&probed, num_cpus::get());
            match &probed {
                Ok(medium) => info!(?medium, degree, "storage medium probed"),
                Err(e) => warn!(error = %e, degree, "medium probe failed, using fallback"),
            }
            degree
        })
    }
}

impl Default for ConcurrencyTuner {
    fn default() -> Self {
        Self::new()
    }
}
