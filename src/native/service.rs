// Service control capability
// Windows drives the service manager through sc.exe. Other targets have no
// update service to coordinate with and report everything as stopped.

use std::time::Duration;
#[cfg(windows)]
use std::time::Instant;

#[cfg(windows)]
use tracing::debug;

use super::{ServiceControl, ServiceStatus};
use crate::cleaner::error::CleanError;

#[cfg(windows)]
const POLL_INTERVAL: Duration = Duration::from_millis(250);
// sc.exe exit codes
#[cfg(windows)]
const ERROR_SERVICE_ALREADY_RUNNING: i32 = 1056;
#[cfg(windows)]
const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;

/// Parse the `STATE` line of `sc query` output.
pub fn parse_state(output: &str) -> ServiceStatus {
    let Some(line) = output.lines().find(|l| l.trim_start().starts_with("STATE")) else {
        return ServiceStatus::Unknown;
    };
    let code = line
        .split(':')
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse::<u32>().ok());
    match code {
        Some(1) => ServiceStatus::Stopped,
        Some(2) => ServiceStatus::StartPending,
        Some(3) => ServiceStatus::StopPending,
        Some(4) => ServiceStatus::Running,
        Some(7) => ServiceStatus::Paused,
        _ => ServiceStatus::Unknown,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformServices;

#[cfg(windows)]
impl PlatformServices {
    fn sc(args: &[&str]) -> Result<std::process::Output, CleanError> {
        std::process::Command::new("sc")
            .args(args)
            .output()
            .map_err(|e| CleanError::from_io_error(e, "running sc.exe", None))
    }

    fn failure(name: &str, output: &std::process::Output) -> CleanError {
        let text = String::from_utf8_lossy(&output.stdout);
        CleanError::Service {
            name: name.to_string(),
            reason: format!(
                "sc.exe exited with {:?}: {}",
                output.status.code(),
                text.lines().last().unwrap_or("").trim()
            ),
        }
    }
}

#[cfg(windows)]
impl ServiceControl for PlatformServices {
    fn status(&self, name: &str) -> Result<ServiceStatus, CleanError> {
        let output = Self::sc(&["query", name])?;
        if !output.status.success() {
            return Err(Self::failure(name, &output));
        }
        Ok(parse_state(&String::from_utf8_lossy(&output.stdout)))
    }

    fn stop(&self, name: &str, timeout: Duration) -> Result<(), CleanError> {
        let output = Self::sc(&["stop", name])?;
        match output.status.code() {
            Some(0) => {}
            Some(ERROR_SERVICE_NOT_ACTIVE) => return Ok(()),
            _ => return Err(Self::failure(name, &output)),
        }

        let started = Instant::now();
        loop {
            if self.status(name)? == ServiceStatus::Stopped {
                debug!(service = name, elapsed = ?started.elapsed(), "service stopped");
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(CleanError::Service {
                    name: name.to_string(),
                    reason: format!("did not stop within {timeout:?}"),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn start(&self, name: &str) -> Result<(), CleanError> {
        let output = Self::sc(&["start", name])?;
        match output.status.code() {
            Some(0) | Some(ERROR_SERVICE_ALREADY_RUNNING) => Ok(()),
            _ => Err(Self::failure(name, &output)),
        }
    }
}

#[cfg(not(windows))]
impl ServiceControl for PlatformServices {
    fn status(&self, _name: &str) -> Result<ServiceStatus, CleanError> {
        Ok(ServiceStatus::Stopped)
    }

    fn stop(&self, _name: &str, _timeout: Duration) -> Result<(), CleanError> {
        Ok(())
    }

    fn start(&self, _name: &str) -> Result<(), CleanError> {
        Ok(())
    }
}
