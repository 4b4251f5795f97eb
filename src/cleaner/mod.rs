//! Cleaner module - scan, classify and delete transient disk junk
//!
//! This module walks temp directories, browser caches, update caches and
//! similar locations on a bounded worker pool, decides per file whether it
//! is safe to remove, and deletes the accepted set.

pub mod browsers;
pub mod cancel;
pub mod category;
pub mod config;
pub mod coordinator;
pub mod deleter;
pub mod error;
pub mod locations;
pub mod patterns;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod stats;
pub mod tuner;

pub use cancel::{CancelToken, CancellationController};
pub use category::{Bucket, Category};
pub use config::Options;
pub use coordinator::ServiceCoordinator;
pub use deleter::DeleteEngine;
pub use error::CleanError;
pub use patterns::{Classifier, Verdict};
pub use progress::{ChannelSink, NullSink, Phase, ProgressEvent, ProgressSink};
pub use scanner::ScanEngine;
pub use session::{RunState, Session};
pub use stats::{Candidate, CleanupOutcome, Location, ScanResult};
pub use tuner::ConcurrencyTuner;
