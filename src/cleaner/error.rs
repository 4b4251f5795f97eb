// Centralized error handling for the cleaner engine
// Per-file and per-location failures are counted, never returned; only
// setup failures surface as CleanError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::session::RunState;

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("Permission denied while {operation}: {}", .path.display())]
    PermissionDenied { path: PathBuf, operation: String },

    #[error("Path not found while {operation}: {}", .path.display())]
    NotFound { path: PathBuf, operation: String },

    #[error("I/O error while {operation}{}: {source}", fmt_opt_path(.path))]
    Io {
        path: Option<PathBuf>,
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Could not start worker pool: {0}")]
    WorkerPool(String),

    #[error("Engine is busy ({0:?}); wait for it to return to Idle")]
    Busy(RunState),

    #[error("Invalid configuration in {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Service {name} control failed: {reason}")]
    Service { name: String, reason: String },

    #[error("Storage medium probe failed: {0}")]
    Probe(String),
}

fn fmt_opt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" {}", p.display()),
        None => String::new(),
    }
}

impl CleanError {
    /// Create an error from an io::Error with context about the operation and optional path
    pub fn from_io_error(err: io::Error, operation: &str, path: Option<PathBuf>) -> Self {
        match (err.kind(), path) {
            (io::ErrorKind::NotFound, Some(path)) => CleanError::NotFound {
                path,
                operation: operation.to_string(),
            },
            (io::ErrorKind::PermissionDenied, Some(path)) => CleanError::PermissionDenied {
                path,
                operation: operation.to_string(),
            },
            (_, path) => CleanError::Io {
                path,
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    /// Access-denied failures are the common "skip and continue" case.
    pub fn is_access_denied(&self) -> bool {
        match self {
            CleanError::PermissionDenied { .. } => true,
            CleanError::Io { source, .. } => source.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CleanError::NotFound { .. })
    }
}

impl From<rayon::ThreadPoolBuildError> for CleanError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        CleanError::WorkerPool(err.to_string())
    }
}
