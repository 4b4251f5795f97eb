//! File classification.
//!
//! Decides whether a single file found under a location is junk. The rules
//! are applied in a fixed order and the first match wins; see
//! [`Classifier::classify`].

use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use super::category::Category;

/// User document/media folders plus messenger, cloud-sync and game-platform
/// folders. Localized Windows shell folder names are included.
const PROTECTED_FOLDERS: &[&str] = &[
    "ViberPC", "Viber", "Telegram Desktop", "Telegram",
    "WhatsApp", "Signal", "Skype", "Discord",
    "Slack", "Teams", "Element",
    "Thunderbird", "Outlook",
    "Dropbox", "OneDrive", "Google Drive", "Yandex.Disk",
    "Steam", "Epic Games", "GOG Galaxy", "Battle.net",
    "Documents", "Документы", "Мои документы",
    "Downloads", "Загрузки",
    "Pictures", "Изображения", "Мои рисунки",
    "Videos", "Видео", "Мои видеозаписи",
    "Music", "Музыка", "Моя музыка",
    "Desktop", "Рабочий стол",
    "UnsavedFiles",
];

/// Subfolders of the temp root that running toolchains and installers keep busy.
const PROTECTED_TEMP_SUBFOLDERS: &[&str] = &[
    ".net", "Cloudflare WARP", "WARP",
    "VBCSCompiler", "MSBuild", "VSLogs", "VisualStudio",
    "SquirrelTemp", "nvidia", "AMD",
    "7zS", "RarSFX", "wct",
];

const PROTECTED_NAMES: &[&str] = &[
    "desktop.ini", "thumbs.db", "autorun.inf",
    "WebCacheV01.dat", "WebCacheV24.dat",
    "WebCacheV01.jfm", "WebCacheV24.jfm",
    "V01tmp.log", "V24tmp.log",
    "journal.baj", "journal.log",
    "index",
    "lockfile", "LOCK", "LOG", "LOG.old",
    "places.sqlite", "cookies.sqlite", "webappsstore.sqlite",
];

/// Live database / journal files inside browser profiles.
const PROTECTED_EXTENSIONS: &[&str] = &[
    ".dat", ".jfm", ".db-wal", ".db-shm", ".sqlite", ".sqlite-wal", ".sqlite-shm",
];

/// Runtime and installer artifacts that temp directories legitimately hold.
const SAFE_IN_TEMP_EXTENSIONS: &[&str] = &[
    ".dll", ".exe", ".sys", ".pdb", ".xml", ".json", ".config",
    ".ini", ".log", ".lock", ".pid", ".manifest", ".cat",
    ".svclog", ".etl", ".diaglog",
    ".msi", ".msp", ".cab",
    ".ps1", ".bat", ".cmd",
];

const JUNK_EXTENSIONS: &[&str] = &[
    ".tmp", ".bak", ".old", ".dmp", ".chk", ".gid",
    ".fts", ".ftg", ".wbk", ".xlk", ".~doc", ".~xls", ".~ppt", ".temp",
];

const JUNK_NAMES: &[&str] = &["thumbs.db", "ehthumbs.db", "ehthumbs_vista.db", ".ds_store"];

/// Outcome of classifying one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Junk,
    Protected,
    TooYoung,
    Locked,
    /// Drive-root file that is not junk-shaped; excluded without a bucket.
    NotApplicable,
}

/// Facts about one file. Everything the classifier looks at is in here.
#[derive(Debug, Clone, Copy)]
pub struct FileFacts<'a> {
    pub path: &'a Path,
    pub size: u64,
    pub modified: SystemTime,
}

/// Exclusive-open probe used for `.tmp` files in temp locations.
pub trait LockProbe: Send + Sync {
    fn is_locked(&self, path: &Path) -> bool;
}

/// Probe backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLockProbe;

impl LockProbe for OsLockProbe {
    #[cfg(windows)]
    fn is_locked(&self, path: &Path) -> bool {
        use std::os::windows::fs::OpenOptionsExt;

        // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
        match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .share_mode(0)
            .open(path)
        {
            Ok(_) => false,
            Err(e) => match e.raw_os_error() {
                Some(32) | Some(33) => true,
                _ => {
                    if e.kind() != std::io::ErrorKind::PermissionDenied {
                        debug!(path = %path.display(), error = %e, "lock probe failed");
                    }
                    false
                }
            },
        }
    }

    #[cfg(not(windows))]
    fn is_locked(&self, path: &Path) -> bool {
        // No mandatory locking here; a failed open only tells us about permissions.
        if let Err(e) = std::fs::OpenOptions::new().read(true).write(true).open(path) {
            debug!(path = %path.display(), error = %e, "lock probe failed");
        }
        false
    }
}

fn lower_set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// Lower-cased file name of `path`.
pub fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Lower-cased extension including the leading dot, or empty.
pub fn extension_lower(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Safety classifier for candidate files.
pub struct Classifier {
    protected_folders: HashSet<String>,
    protected_names: HashSet<String>,
    protected_extensions: HashSet<String>,
    safe_in_temp: HashSet<String>,
    junk_extensions: HashSet<String>,
    junk_names: HashSet<String>,
    probe: Arc<dyn LockProbe>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::with_probe(Arc::new(OsLockProbe))
    }

    pub fn with_probe(probe: Arc<dyn LockProbe>) -> Self {
        let mut protected_folders = lower_set(PROTECTED_FOLDERS);
        protected_folders.extend(lower_set(PROTECTED_TEMP_SUBFOLDERS));

        Self {
            protected_folders,
            protected_names: lower_set(PROTECTED_NAMES),
            protected_extensions: lower_set(PROTECTED_EXTENSIONS),
            safe_in_temp: lower_set(SAFE_IN_TEMP_EXTENSIONS),
            junk_extensions: lower_set(JUNK_EXTENSIONS),
            junk_names: lower_set(JUNK_NAMES),
            probe,
        }
    }

    /// True when any segment of `path` names a protected folder.
    pub fn is_in_protected_folder(&self, path: &Path) -> bool {
        path.components().any(|c| match c {
            Component::Normal(part) => self
                .protected_folders
                .contains(&part.to_string_lossy().to_lowercase()),
            _ => false,
        })
    }

    /// Drive-root junk must look like junk by exact name, extension or a `~` prefix.
    pub fn is_root_junk(&self, name: &str, ext: &str) -> bool {
        name.starts_with('~') || self.junk_extensions.contains(ext) || self.junk_names.contains(name)
    }

    /// Classify one file found under a location of `category`.
    ///
    /// Rules, first match wins:
    /// 1. a protected folder anywhere in the path
    /// 2. protected name, or protected extension inside browser caches
    /// 3. younger than the category's age floor
    /// 4. empty file in a temp location (in-use placeholder)
    /// 5. runtime/installer extension in a temp location
    /// 6. `.tmp` in a temp location held open by another process
    /// 7. drive-root file that doesn't look like junk
    pub fn classify(&self, file: &FileFacts<'_>, category: Category, now: SystemTime) -> Verdict {
        let name = file_name_lower(file.path);
        let ext = extension_lower(file.path);

        if self.is_in_protected_folder(file.path) {
            return Verdict::Protected;
        }

        if self.protected_names.contains(&name)
            || (category.is_browser() && self.protected_extensions.contains(&ext))
        {
            return Verdict::Protected;
        }

        if let Some(floor) = category.age_floor() {
            // Timestamps from the future count as brand new.
            let age = now.duration_since(file.modified).unwrap_or_default();
            if age < floor {
                return Verdict::TooYoung;
            }
        }

        if category.is_temp() {
            if file.size == 0 {
                return Verdict::TooYoung;
            }
            if self.safe_in_temp.contains(&ext) {
                return Verdict::Protected;
            }
            if ext == ".tmp" && self.probe.is_locked(file.path) {
                return Verdict::Locked;
            }
        }

        if category.is_drive_root() && !self.is_root_junk(&name, &ext) {
            return Verdict::NotApplicable;
        }

        Verdict::Junk
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
