//! Cooperative cancellation for blocking provider calls.
//!
//! A [`CancelToken`] carries an explicit cancel flag plus an optional deadline.
//! Provider clients bound every HTTP timeout by [`CancelToken::remaining`] and
//! sleep through [`CancelToken::sleep`], which wakes as soon as the token is
//! cancelled.
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Why a call stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` was called (e.g. Ctrl-C).
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cloneable cancellation handle; all clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never expires on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            shared: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a token sharing the cancel flag but with a tighter deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            shared: Arc::clone(&self.shared),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        let mut cancelled = self
            .shared
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cancelled = true;
        self.shared.wake.notify_all();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason if the token is no longer live.
    pub fn check(&self) -> Option<CancelReason> {
        if self.is_flagged() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.check().is_some()
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Block for `duration`, returning early with the reason if the token is
    /// cancelled or the deadline passes first.
    pub fn sleep(&self, duration: Duration) -> Result<(), CancelReason> {
        let wake_at = Instant::now() + duration;
        let mut cancelled = self
            .shared
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if *cancelled {
                return Err(CancelReason::Cancelled);
            }
            let now = Instant::now();
            if let Some(deadline) = self.deadline {
                if now >= deadline {
                    return Err(CancelReason::DeadlineExceeded);
                }
            }
            if now >= wake_at {
                return Ok(());
            }
            let mut until = wake_at;
            if let Some(deadline) = self.deadline {
                until = until.min(deadline);
            }
            let (guard, _) = self
                .shared
                .wake
                .wait_timeout(cancelled, until - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cancelled = guard;
        }
    }

    fn is_flagged(&self) -> bool {
        *self
            .shared
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
