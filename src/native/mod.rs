//! OS capabilities the engine consumes.
//!
//! Each capability is a narrow trait with one implementation per target.
//! The scan and delete engines only ever see the traits.

pub mod eventlog;
pub mod recycle;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cleaner::error::CleanError;

/// Item count and size of the recycle bin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecycleInfo {
    pub item_count: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyOutcome {
    Success,
    AlreadyEmpty,
    Failure,
}

pub trait RecycleBin: Send + Sync {
    fn query(&self) -> Result<RecycleInfo, CleanError>;
    fn empty(&self) -> EmptyOutcome;
}

/// One event-log channel and the bytes clearing it would release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub name: String,
    pub reclaimable_bytes: u64,
}

pub trait EventLog: Send + Sync {
    /// Channels worth clearing. Sizes come from the backing files, not per-channel queries.
    fn channels(&self) -> Vec<Channel>;
    fn clear(&self, name: &str) -> Result<(), CleanError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceStatus {
    Running,
    Stopped,
    StartPending,
    StopPending,
    Paused,
    Unknown,
}

impl ServiceStatus {
    /// Running or on its way there.
    pub fn is_active(self) -> bool {
        matches!(self, ServiceStatus::Running | ServiceStatus::StartPending)
    }
}

pub trait ServiceControl: Send + Sync {
    fn status(&self, name: &str) -> Result<ServiceStatus, CleanError>;
    /// Request a stop and wait up to `timeout` for it to take effect.
    fn stop(&self, name: &str, timeout: Duration) -> Result<(), CleanError>;
    fn start(&self, name: &str) -> Result<(), CleanError>;
}

/// Recycle bin of the current platform.
pub fn recycle_bin() -> Arc<dyn RecycleBin> {
    Arc::new(recycle::PlatformRecycleBin::new())
}

/// Event-log store of the current platform.
pub fn event_log() -> Arc<dyn EventLog> {
    Arc::new(eventlog::PlatformEventLog::new())
}

/// Service manager of the current platform.
pub fn service_control() -> Arc<dyn ServiceControl> {
    Arc::new(service::PlatformServices)
}
