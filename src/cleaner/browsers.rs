// Running-browser check
// A browser that is open recreates its cache as soon as it is deleted, so
// the front end warns before cleaning browser caches.

use std::collections::HashSet;

use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

/// Process name (without `.exe`) and display name.
pub const BROWSER_PROCESSES: &[(&str, &str)] = &[
    ("chrome", "Google Chrome"),
    ("msedge", "Microsoft Edge"),
    ("firefox", "Firefox"),
    ("brave", "Brave"),
    ("opera", "Opera"),
    ("operagx", "Opera GX"),
    ("browser", "Yandex Browser"),
    ("vivaldi", "Vivaldi"),
];

fn process_stem(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Display names of the browsers present in `process_names`, in table order.
/// Names match exactly, ignoring case and a trailing `.exe`.
pub fn match_browsers<I, S>(process_names: I) -> Vec<&'static str>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let running: HashSet<String> = process_names
        .into_iter()
        .map(|n| process_stem(n.as_ref()))
        .collect();
    BROWSER_PROCESSES
        .iter()
        .filter(|(process, _)| running.contains(*process))
        .map(|(_, label)| *label)
        .collect()
}

/// Browsers currently running on this machine.
pub fn running_browsers() -> Vec<&'static str> {
    let mut sys = System::new();
    let seen = sys.refresh_processes(ProcessesToUpdate::All, true);
    debug!(processes = seen, "process list refreshed");
    match_browsers(
        sys.processes()
            .values()
            .map(|p| p.name().to_string_lossy().into_owned()),
    )
}
