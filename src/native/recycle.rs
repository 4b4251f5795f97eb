// Recycle bin capability
// Windows: shell recycle bin across all drives.
// Elsewhere: the per-user trash directory.

#[cfg(not(windows))]
use std::fs;
#[cfg(not(windows))]
use std::path::{Path, PathBuf};

#[cfg(not(windows))]
use jwalk::{Parallelism, WalkDir};
use tracing::{debug, warn};

use super::{EmptyOutcome, RecycleBin, RecycleInfo};
use crate::cleaner::error::CleanError;

/// HRESULTs are not Win32 error codes; keep the raw value in the message.
#[cfg(any(windows, test))]
fn hresult_error(api: &str, hr: i32) -> std::io::Error {
    std::io::Error::other(format!("{api} failed: HRESULT {:#010x}", hr as u32))
}

#[cfg(windows)]
pub type PlatformRecycleBin = ShellRecycleBin;
#[cfg(not(windows))]
pub type PlatformRecycleBin = TrashDir;

#[cfg(windows)]
const SHERB_NOCONFIRMATION: u32 = 0x1;
#[cfg(windows)]
const SHERB_NOPROGRESSUI: u32 = 0x2;
#[cfg(windows)]
const SHERB_NOSOUND: u32 = 0x4;
// HRESULT_FROM_WIN32(ERROR_INVALID_PARAMETER): what the shell returns for an empty bin.
#[cfg(windows)]
const E_INVALIDARG_WIN32: u32 = 0x8007_0057;

#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRecycleBin;

#[cfg(windows)]
impl ShellRecycleBin {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(windows)]
impl RecycleBin for ShellRecycleBin {
    fn query(&self) -> Result<RecycleInfo, CleanError> {
        use windows_sys::Win32::UI::Shell::{SHQueryRecycleBinW, SHQUERYRBINFO};

        let mut info = SHQUERYRBINFO {
            cbSize: std::mem::size_of::<SHQUERYRBINFO>() as u32,
            i64Size: 0,
            i64NumItems: 0,
        };
        // Null root path queries every drive.
        let hr = unsafe { SHQueryRecycleBinW(std::ptr::null(), &mut info) };
        if hr != 0 {
            return Err(CleanError::Io {
                path: None,
                operation: "querying recycle bin".to_string(),
                source: hresult_error("SHQueryRecycleBinW", hr),
            });
        }
        let size = info.i64Size;
        let items = info.i64NumItems;
        Ok(RecycleInfo {
            item_count: items.max(0) as u64,
            total_bytes: size.max(0) as u64,
        })
    }

    fn empty(&self) -> EmptyOutcome {
        use windows_sys::Win32::UI::Shell::SHEmptyRecycleBinW;

        let flags = SHERB_NOCONFIRMATION | SHERB_NOPROGRESSUI | SHERB_NOSOUND;
        let hr = unsafe { SHEmptyRecycleBinW(std::ptr::null_mut(), std::ptr::null(), flags) };
        match hr {
            0 => EmptyOutcome::Success,
            h if h as u32 == E_INVALIDARG_WIN32 => {
                debug!("recycle bin already empty");
                EmptyOutcome::AlreadyEmpty
            }
            h => {
                warn!(hresult = format!("{:#010x}", h as u32), "emptying recycle bin failed");
                EmptyOutcome::Failure
            }
        }
    }
}

/// Trash directory in the freedesktop layout (`files/` + `info/`), or a flat
/// trash folder when `info` is `None`.
#[cfg(not(windows))]
#[derive(Debug, Clone)]
pub struct TrashDir {
    files: Option<PathBuf>,
    info: Option<PathBuf>,
}

#[cfg(not(windows))]
impl TrashDir {
    /// Current user's trash.
    pub fn new() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self {
                files: dirs::home_dir().map(|h| h.join(".Trash")),
                info: None,
            }
        }
        #[cfg(not(target_os = "macos"))]
        {
            match dirs::data_local_dir() {
                Some(data) => Self::at(&data.join("Trash")),
                None => Self {
                    files: None,
                    info: None,
                },
            }
        }
    }

    /// Freedesktop trash rooted at `root`.
    pub fn at(root: &Path) -> Self {
        Self {
            files: Some(root.join("files")),
            info: Some(root.join("info")),
        }
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        match fs::read_dir(dir) {
            Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn size_of(path: &Path) -> u64 {
        match fs::symlink_metadata(path) {
            Ok(meta) if !meta.is_dir() => return meta.len(),
            Err(_) => return 0,
            _ => {}
        }
        WalkDir::new(path)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    fn remove(path: &Path) -> std::io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }
}

#[cfg(not(windows))]
impl Default for TrashDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(windows))]
impl RecycleBin for TrashDir {
    fn query(&self) -> Result<RecycleInfo, CleanError> {
        let Some(files) = &self.files else {
            return Ok(RecycleInfo::default());
        };
        let entries = Self::entries(files);
        Ok(RecycleInfo {
            item_count: entries.len() as u64,
            total_bytes: entries.iter().map(|p| Self::size_of(p)).sum(),
        })
    }

    fn empty(&self) -> EmptyOutcome {
        let Some(files) = &self.files else {
            return EmptyOutcome::AlreadyEmpty;
        };
        let entries = Self::entries(files);
        if entries.is_empty() {
            debug!(path = %files.display(), "trash already empty");
            return EmptyOutcome::AlreadyEmpty;
        }

        let mut failed = 0usize;
        for path in &entries {
            if let Err(e) = Self::remove(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "could not remove trash entry");
                    failed += 1;
                }
            }
        }
        // Orphaned .trashinfo records are harmless; failures here are ignored.
        if let Some(info) = &self.info {
            for path in Self::entries(info) {
                let _ = fs::remove_file(&path);
            }
        }

        if failed == 0 {
            EmptyOutcome::Success
        } else {
            EmptyOutcome::Failure
        }
    }
}
