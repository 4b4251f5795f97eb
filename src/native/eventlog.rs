// Event log capability
// Channels are discovered from the .evtx files backing them; a file's size
// minus the space an empty log still occupies is what clearing releases.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Channel, EventLog};
use crate::cleaner::error::CleanError;

/// Bytes an empty .evtx file keeps after clearing.
pub const EMPTY_LOG_RESERVE: u64 = 69_632;

/// Event logs stored as `.evtx` files in one directory.
#[derive(Debug, Clone)]
pub struct PlatformEventLog {
    dir: Option<PathBuf>,
}

impl PlatformEventLog {
    #[cfg(windows)]
    pub fn new() -> Self {
        let windir = std::env::var_os("WINDIR").map(PathBuf::from);
        Self {
            dir: windir.map(|w| w.join("System32").join("winevt").join("Logs")),
        }
    }

    /// No event-log store outside Windows.
    #[cfg(not(windows))]
    pub fn new() -> Self {
        Self { dir: None }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

impl Default for PlatformEventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel name from an .evtx file name. `%4` encodes `/`.
pub fn channel_name(file: &Path) -> Option<String> {
    let stem = file.file_stem()?.to_string_lossy();
    Some(stem.replace("%4", "/"))
}

impl EventLog for PlatformEventLog {
    fn channels(&self) -> Vec<Channel> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };
        let entries = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "event log directory unreadable");
                return Vec::new();
            }
        };

        let mut channels: Vec<Channel> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("evtx"))
            })
            .filter_map(|e| {
                let size = e.metadata().ok()?.len();
                if size <= EMPTY_LOG_RESERVE {
                    return None;
                }
                Some(Channel {
                    name: channel_name(&e.path())?,
                    reclaimable_bytes: size - EMPTY_LOG_RESERVE,
                })
            })
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }

    #[cfg(windows)]
    fn clear(&self, name: &str) -> Result<(), CleanError> {
        let output = std::process::Command::new("wevtutil")
            .args(["cl", name])
            .output()
            .map_err(|e| CleanError::from_io_error(e, "running wevtutil", None))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(CleanError::Io {
                path: None,
                operation: format!("clearing event log {name}"),
                source: std::io::Error::other(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ),
            })
        }
    }

    #[cfg(not(windows))]
    fn clear(&self, name: &str) -> Result<(), CleanError> {
        Err(CleanError::Io {
            path: None,
            operation: format!("clearing event log {name}"),
            source: std::io::Error::from(std::io::ErrorKind::Unsupported),
        })
    }
}
