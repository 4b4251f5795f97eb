//! Location discovery.
//!
//! Turns [`Options`] into the ordered list of roots to scan. Only existing
//! directories make it into the list, and each directory appears once.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tracing::debug;

use super::category::Category;
use super::config::Options;
use super::stats::Location;

/// Per-profile cache folders of Chromium-based browsers.
const CHROMIUM_CACHE_DIRS: &[&str] = &[
    "Cache", "Cache2", "Code Cache", "GPUCache", "DawnCache", "ShaderCache", "blob_storage",
];

/// Temp folder spellings found in drive roots.
const DRIVE_TEMP_NAMES: &[&str] = &[
    "Temp", "temp", "tmp", "Tmp", "TEMP", "_Temp", "$Temp", "TempFiles",
];

const SKIPPED_USERS: &[&str] = &["Public", "Default", "All Users", "Default User"];

/// Chromium user-data roots relative to the local app-data / cache dir.
#[cfg(windows)]
const CHROMIUM_BROWSERS: &[(&str, &str)] = &[
    (r"Microsoft\Edge\User Data", "Edge"),
    (r"BraveSoftware\Brave-Browser\User Data", "Brave"),
    (r"Opera Software\Opera Stable", "Opera"),
    (r"Opera Software\Opera GX Stable", "Opera GX"),
    (r"Opera Software\Opera One", "Opera One"),
    (r"Yandex\YandexBrowser\User Data", "Yandex"),
    (r"Vivaldi\User Data", "Vivaldi"),
];

#[cfg(not(windows))]
const CHROMIUM_BROWSERS: &[(&str, &str)] = &[
    ("chromium", "Chromium"),
    ("microsoft-edge", "Edge"),
    ("BraveSoftware/Brave-Browser", "Brave"),
    ("opera", "Opera"),
    ("yandex-browser", "Yandex"),
    ("vivaldi", "Vivaldi"),
    ("Microsoft Edge", "Edge"),
];

#[cfg(windows)]
const CHROME_DATA: &str = r"Google\Chrome\User Data";
#[cfg(not(windows))]
const CHROME_DATA: &str = "google-chrome";

#[cfg(windows)]
const FIREFOX_PROFILES: &[&str] = &[r"Mozilla\Firefox\Profiles"];
#[cfg(not(windows))]
const FIREFOX_PROFILES: &[&str] = &["mozilla/firefox", "Firefox/Profiles"];

/// Ordered, de-duplicated list under construction.
#[derive(Default)]
struct LocationList {
    items: Vec<Location>,
    seen: HashSet<PathBuf>,
}

impl LocationList {
    fn add(&mut self, root: PathBuf, category: Category, label: impl Into<String>) {
        self.push(Location::new(root, category, label));
    }

    fn push(&mut self, location: Location) {
        if !location.root.is_dir() {
            return;
        }
        // Case-insensitive file systems make "Temp" and "temp" the same folder.
        let key = fs::canonicalize(&location.root).unwrap_or_else(|_| location.root.clone());
        if self.seen.insert(key) {
            self.items.push(location);
        } else {
            debug!(root = %location.root.display(), "duplicate location dropped");
        }
    }
}

/// Build the scan list for `options`.
pub fn discover(options: &Options) -> Vec<Location> {
    let mut list = LocationList::default();

    if options.temp_files {
        list.add(std::env::temp_dir(), Category::UserTemp, "User temp");
    }
    if options.system_temp {
        add_system_temp(&mut list);
    }

    let app_data = local_app_data();
    if options.browser_cache {
        if let Some(base) = &app_data {
            add_browsers(&mut list, base, "");
        }
    }
    add_user_caches(&mut list, options, app_data.as_deref());

    if options.external_drives {
        for (root, label) in external_drives() {
            add_drive(&mut list, &root, &label);
        }
    }

    for extra in &options.extra_locations {
        let mut location = Location::new(
            extra.path.clone(),
            extra.category,
            extra.path.display().to_string(),
        );
        if let Some(recursive) = extra.recursive {
            location = location.recursive(recursive);
        }
        list.push(location);
    }

    debug!(count = list.items.len(), "locations discovered");
    list.items
}

#[cfg(windows)]
fn local_app_data() -> Option<PathBuf> {
    dirs::data_local_dir()
}

#[cfg(not(windows))]
fn local_app_data() -> Option<PathBuf> {
    dirs::cache_dir()
}

#[cfg(windows)]
fn windows_dir() -> PathBuf {
    std::env::var_os("WINDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Windows"))
}

#[cfg(windows)]
fn add_system_temp(list: &mut LocationList) {
    let windir = windows_dir();
    list.add(windir.join("Temp"), Category::SystemTemp, "Windows temp");
    list.add(
        windir.join("SoftwareDistribution").join("Download"),
        Category::UpdateCache,
        "Update cache",
    );
}

#[cfg(not(windows))]
fn add_system_temp(list: &mut LocationList) {
    list.add(PathBuf::from("/var/tmp"), Category::SystemTemp, "System temp");
}

#[cfg(windows)]
fn add_user_caches(list: &mut LocationList, options: &Options, local: Option<&Path>) {
    if options.prefetch {
        list.add(windows_dir().join("Prefetch"), Category::Prefetch, "Prefetch");
    }
    let Some(local) = local else { return };
    let windows = local.join("Microsoft").join("Windows");
    if options.thumbnails {
        list.add(windows.join("Explorer"), Category::Thumbnails, "Thumbnail cache");
    }
    if options.inet_cache {
        list.add(windows.join("INetCache"), Category::InetCache, "Web cache");
    }
    if options.office_cache {
        list.add(
            local.join(r"Microsoft\Office\16.0\OfficeFileCache"),
            Category::OfficeCache,
            "Office cache",
        );
    }
}

#[cfg(not(windows))]
fn add_user_caches(list: &mut LocationList, options: &Options, cache: Option<&Path>) {
    let Some(cache) = cache else { return };
    if options.thumbnails {
        list.add(cache.join("thumbnails"), Category::Thumbnails, "Thumbnail cache");
    }
}

/// Profiles under a Chromium user-data root: `Default` plus `Profile*`,
/// or the root itself when there is no `Default`.
fn chromium_profiles(root: &Path, require_default: bool) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    let default = root.join("Default");
    if require_default || default.is_dir() {
        let mut profiles = vec![default];
        profiles.extend(subdirs(root).into_iter().filter(|d| {
            d.file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("Profile"))
        }));
        profiles
    } else {
        vec![root.to_path_buf()]
    }
}

fn subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.path())
            .collect(),
        Err(_) => Vec::new(),
    };
    dirs.sort();
    dirs
}

fn add_profile_caches(list: &mut LocationList, profile: &Path, browser: &str) {
    for sub in CHROMIUM_CACHE_DIRS {
        list.add(profile.join(sub), Category::Browser, format!("{browser} cache"));
    }
    list.add(
        profile.join("Network").join("Cache"),
        Category::Browser,
        format!("{browser} network cache"),
    );
}

/// All browser caches below one local app-data directory.
fn add_browsers(list: &mut LocationList, base: &Path, suffix: &str) {
    for profile in chromium_profiles(&base.join(CHROME_DATA), true) {
        add_profile_caches(list, &profile, &format!("Chrome{suffix}"));
    }
    for (rel, name) in CHROMIUM_BROWSERS {
        for profile in chromium_profiles(&base.join(rel), false) {
            add_profile_caches(list, &profile, &format!("{name}{suffix}"));
        }
    }
    for rel in FIREFOX_PROFILES {
        for profile in subdirs(&base.join(rel)) {
            list.add(profile.join("cache2"), Category::Browser, format!("Firefox cache{suffix}"));
            list.add(
                profile.join("startupCache"),
                Category::Browser,
                format!("Firefox startup cache{suffix}"),
            );
        }
    }
}

/// Mirror the per-drive junk set onto a non-system drive.
fn add_drive(list: &mut LocationList, root: &Path, label: &str) {
    list.add(root.join("$RECYCLE.BIN"), Category::RecycleDir, format!("Recycle ({label})"));
    for name in DRIVE_TEMP_NAMES {
        list.add(root.join(name), Category::SystemTemp, format!("Temp ({label})"));
    }
    let windows = root.join("Windows");
    list.add(windows.join("Temp"), Category::SystemTemp, format!("Windows temp ({label})"));
    list.add(
        windows.join("SoftwareDistribution").join("Download"),
        Category::UpdateCache,
        format!("Update cache ({label})"),
    );
    list.add(windows.join("Prefetch"), Category::Prefetch, format!("Prefetch ({label})"));

    for user in subdirs(&root.join("Users")) {
        let skip = user.file_name().is_some_and(|n| {
            let n = n.to_string_lossy();
            SKIPPED_USERS.iter().any(|s| s.eq_ignore_ascii_case(&n))
        });
        if skip {
            continue;
        }
        let local = user.join("AppData").join("Local");
        list.add(local.join("Temp"), Category::UserTemp, format!("User temp ({label})"));
        let ms_windows = local.join("Microsoft").join("Windows");
        list.add(ms_windows.join("INetCache"), Category::InetCache, format!("Web cache ({label})"));
        list.add(ms_windows.join("Explorer"), Category::Thumbnails, format!("Thumbnails ({label})"));
        list.add(
            local.join("Microsoft").join("Office").join("16.0").join("OfficeFileCache"),
            Category::OfficeCache,
            format!("Office cache ({label})"),
        );
        add_browsers(list, &local, &format!(" ({label})"));
    }

    list.add(root.to_path_buf(), Category::DriveRoot, format!("Drive root ({label})"));
}

/// Mounted drives other than the system volume, with display labels.
fn external_drives() -> Vec<(PathBuf, String)> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| is_external(d.mount_point(), d.is_removable()))
        .map(|d| {
            let mount = d.mount_point().to_path_buf();
            let label = drive_label(&mount, &d.name().to_string_lossy());
            (mount, label)
        })
        .collect()
}

#[cfg(windows)]
fn is_external(mount: &Path, _removable: bool) -> bool {
    let system = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
    !mount
        .to_string_lossy()
        .to_ascii_uppercase()
        .starts_with(&system.to_ascii_uppercase())
}

// Every fixed mount on Unix is part of the system tree; only removable media count.
#[cfg(not(windows))]
fn is_external(mount: &Path, removable: bool) -> bool {
    removable && mount != Path::new("/")
}

/// "Backup (D:)" when the volume has a name, else just "D:".
fn drive_label(mount: &Path, volume_name: &str) -> String {
    let letter = mount.to_string_lossy().trim_end_matches(['\\', '/']).to_string();
    let letter = if letter.is_empty() { "/".to_string() } else { letter };
    if volume_name.trim().is_empty() {
        letter
    } else {
        format!("{} ({letter})", volume_name.trim())
    }
}
