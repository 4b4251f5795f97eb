//! Cooperative cancellation.
//!
//! Every scan or clean gets one [`CancelToken`]. The token is checked at the
//! start of each location, each file and each delete. A child token can add
//! a deadline on top of the shared flag; the deadline only affects the child.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

/// Shared cancel signal, optionally bounded by a deadline.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Raise the shared signal. Every clone and child observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once the shared signal is raised or this token's deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.is_stop_requested() || self.deadline_expired()
    }

    /// True only for the shared signal, ignoring any deadline.
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Child token sharing this signal and expiring after `timeout`.
    /// An earlier deadline inherited from `self` is kept.
    pub fn with_deadline(&self, timeout: Duration) -> CancelToken {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        CancelToken {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    fn same_signal(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the current operation was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    Sleep,
}

/// Hands out one token per operation and routes stop requests to it.
#[derive(Debug, Default)]
pub struct CancellationController {
    current: Mutex<Option<CancelToken>>,
    interrupted_by_sleep: AtomicBool,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh token for a new operation. A still-registered previous token is cancelled.
    pub fn begin(&self) -> CancelToken {
        let token = CancelToken::new();
        let previous = self.lock().replace(token.clone());
        if let Some(old) = previous {
            old.cancel();
        }
        token
    }

    /// Unregister `token` once its operation returned.
    pub fn finish(&self, token: &CancelToken) {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|t| t.same_signal(token)) {
            *current = None;
        }
    }

    /// Whether an operation is currently registered.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Explicit user stop. Returns false when nothing was running.
    pub fn stop(&self) -> bool {
        self.cancel_current(StopReason::User)
    }

    /// System is about to sleep: cancel proactively and latch the reason.
    pub fn on_suspend(&self) -> bool {
        self.cancel_current(StopReason::Sleep)
    }

    /// System resumed. Returns and clears the "interrupted by sleep" latch.
    pub fn on_resume(&self) -> bool {
        let interrupted = self.interrupted_by_sleep.swap(false, Ordering::SeqCst);
        if interrupted {
            info!("system resumed after an interrupted operation");
        }
        interrupted
    }

    /// Peek at the latch without consuming it.
    pub fn was_interrupted_by_sleep(&self) -> bool {
        self.interrupted_by_sleep.load(Ordering::SeqCst)
    }

    fn cancel_current(&self, reason: StopReason) -> bool {
        let current = self.lock();
        match current.as_ref() {
            Some(token) if !token.is_stop_requested() => {
                if reason == StopReason::Sleep {
                    self.interrupted_by_sleep.store(true, Ordering::SeqCst);
                }
                token.cancel();
                info!(?reason, "operation cancelled");
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancelToken>> {
        // A panic while holding this lock cannot leave the Option half-written.
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
