// Configuration
// Category toggles and engine knobs, read from a TOML file. A missing file
// means defaults; a malformed one is an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::category::Category;
use super::error::CleanError;
use super::progress::DEFAULT_INTERVAL;
use super::scanner::{FLUSH_INTERVAL, FLUSH_ITEMS, UPDATE_CACHE_DEADLINE};

pub const CONFIG_DIR: &str = "tempsweep";
pub const CONFIG_FILE: &str = "config.toml";

/// Which location groups to scan, plus engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub temp_files: bool,
    pub system_temp: bool,
    pub recycle_bin: bool,
    pub browser_cache: bool,
    pub thumbnails: bool,
    pub inet_cache: bool,
    pub office_cache: bool,
    pub prefetch: bool,
    pub event_logs: bool,
    pub external_drives: bool,
    pub extra_locations: Vec<ExtraLocation>,
    pub engine: EngineOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            temp_files: true,
            system_temp: true,
            recycle_bin: true,
            browser_cache: true,
            thumbnails: true,
            inet_cache: true,
            office_cache: false,
            prefetch: false,
            event_logs: false,
            external_drives: false,
            extra_locations: Vec::new(),
            engine: EngineOptions::default(),
        }
    }
}

/// User-supplied location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraLocation {
    pub path: PathBuf,
    #[serde(default = "default_extra_category")]
    pub category: Category,
    /// Defaults to the category's own recursion.
    #[serde(default)]
    pub recursive: Option<bool>,
}

fn default_extra_category() -> Category {
    Category::Other
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Fixed worker count; probed from the system volume when unset.
    pub degree: Option<usize>,
    pub update_cache_deadline_secs: u64,
    pub scan_flush_ms: u64,
    pub scan_flush_items: usize,
    pub progress_interval_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            degree: None,
            update_cache_deadline_secs: UPDATE_CACHE_DEADLINE.as_secs(),
            scan_flush_ms: FLUSH_INTERVAL.as_millis() as u64,
            scan_flush_items: FLUSH_ITEMS,
            progress_interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
        }
    }
}

impl EngineOptions {
    pub fn update_cache_deadline(&self) -> Duration {
        Duration::from_secs(self.update_cache_deadline_secs)
    }

    pub fn scan_flush_interval(&self) -> Duration {
        Duration::from_millis(self.scan_flush_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Options {
    /// `<config_dir>/tempsweep/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, CleanError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(CleanError::from_io_error(e, "reading config", Some(path))),
        };
        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, origin: &Path) -> Result<Self, CleanError> {
        let options: Options = toml::from_str(content).map_err(|e| CleanError::Config {
            path: origin.to_path_buf(),
            reason: e.message().to_string(),
        })?;
        if options.engine.degree == Some(0) {
            return Err(CleanError::Config {
                path: origin.to_path_buf(),
                reason: "engine.degree must be at least 1".to_string(),
            });
        }
        if options.engine.progress_interval_ms == 0 {
            return Err(CleanError::Config {
                path: origin.to_path_buf(),
                reason: "engine.progress_interval_ms must be at least 1".to_string(),
            });
        }
        Ok(options)
    }
}
