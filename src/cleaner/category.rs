//! Location categories.
//!
//! A category decides three things for every file found under a location:
//! which counting bucket it lands in, how old it must be before it may be
//! removed, and whether the temp-only rules of the classifier apply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Files in temp, update-cache and drive-root locations must be this old.
pub const TEMP_AGE_FLOOR: Duration = Duration::from_secs(5 * 60);
/// Browser, thumbnail, prefetch and legacy web caches must be this old.
pub const CACHE_AGE_FLOOR: Duration = Duration::from_secs(2 * 60);

/// Logical category of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Per-user temp directory.
    UserTemp,
    /// System-wide temp directory (and temp folders on other drives).
    SystemTemp,
    /// OS update download cache.
    UpdateCache,
    /// Browser cache tree.
    Browser,
    /// Explorer thumbnail / icon cache.
    Thumbnails,
    /// Prefetch traces.
    Prefetch,
    /// Legacy web cache.
    InetCache,
    /// Office document cache.
    OfficeCache,
    /// Per-drive recycle directory.
    RecycleDir,
    /// Loose junk in the root of a drive. Never recursed.
    DriveRoot,
    /// Synthetic aggregate for event-log channels.
    EventLog,
    /// Synthetic aggregate for the recycle bin.
    RecycleBin,
    /// Anything else (user supplied locations).
    Other,
}

/// Coarse counting bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    Plain,
    Browser,
    Recycle,
}

impl Category {
    pub fn bucket(self) -> Bucket {
        match self {
            Category::Browser => Bucket::Browser,
            Category::RecycleDir | Category::RecycleBin => Bucket::Recycle,
            _ => Bucket::Plain,
        }
    }

    /// Minimum age a file must reach before it is considered junk.
    pub fn age_floor(self) -> Option<Duration> {
        match self {
            Category::UserTemp
            | Category::SystemTemp
            | Category::UpdateCache
            | Category::DriveRoot => Some(TEMP_AGE_FLOOR),
            Category::Browser
            | Category::Thumbnails
            | Category::Prefetch
            | Category::InetCache => Some(CACHE_AGE_FLOOR),
            _ => None,
        }
    }

    pub fn is_temp(self) -> bool {
        matches!(self, Category::UserTemp | Category::SystemTemp)
    }

    pub fn is_drive_root(self) -> bool {
        self == Category::DriveRoot
    }

    pub fn is_browser(self) -> bool {
        self == Category::Browser
    }

    /// Aggregates are synthetic candidates, not files on disk.
    pub fn is_aggregate(self) -> bool {
        matches!(self, Category::EventLog | Category::RecycleBin)
    }

    pub fn default_recursive(self) -> bool {
        !self.is_drive_root()
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::UserTemp => "User temp",
            Category::SystemTemp => "System temp",
            Category::UpdateCache => "Update cache",
            Category::Browser => "Browser cache",
            Category::Thumbnails => "Thumbnail cache",
            Category::Prefetch => "Prefetch",
            Category::InetCache => "Web cache",
            Category::OfficeCache => "Office cache",
            Category::RecycleDir => "Recycle directory",
            Category::DriveRoot => "Drive root junk",
            Category::EventLog => "Event logs",
            Category::RecycleBin => "Recycle bin",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
