//! Bounded retry for provider calls.
//!
//! Each attempt is classified into a closed [`AttemptOutcome`]. Only
//! [`AttemptOutcome::Transient`] is retried; everything else ends the call on
//! first occurrence. The loop is an explicit state machine:
//!
//! ```text
//! Attempt(n) --Success------------------------------> Done(Ok)
//! Attempt(n) --Transient, n < max--> Backoff(n + 1) --> Attempt(n + 1)
//! Attempt(n) --Transient, n = max-------------------> Done(Err Transient)
//! Attempt(n) --Fatal | Cancelled--------------------> Done(Err)
//! Backoff(n) --token cancelled----------------------> Done(Err Cancelled)
//! ```
use super::ProviderError;
use crate::cancel::{CancelReason, CancelToken};
use std::time::Duration;

/// Attempts per call, the first one included.
pub const MAX_ATTEMPTS: u32 = 3;
/// Wait between attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Classification of a single provider attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Recognized success with non-empty answer content.
    Success(String),
    /// Recognized overload / rate-limit signal; worth retrying.
    Transient(String),
    /// Transport, status, decoding or missing-answer failure.
    Fatal(String),
    /// The token fired while the request was in flight.
    Cancelled(CancelReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            delay: RETRY_DELAY,
        }
    }
}

enum State {
    Attempt(u32),
    Backoff { next: u32, last: String },
    Done(Result<String, ProviderError>),
}

/// Drive `attempt` until it succeeds, fails fatally, runs out of attempts, or
/// the token is cancelled. `attempt` receives the 1-based attempt number.
pub fn run_with_retry<F>(
    provider: &str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut attempt: F,
) -> Result<String, ProviderError>
where
    F: FnMut(u32) -> AttemptOutcome,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut state = State::Attempt(1);
    loop {
        state = match state {
            State::Attempt(n) => match cancel.check() {
                Some(reason) => State::Done(Err(ProviderError::Cancelled {
                    provider: provider.to_string(),
                    attempt: n,
                    reason,
                })),
                None => match attempt(n) {
                    AttemptOutcome::Success(text) => {
                        if n > 1 {
                            tracing::info!(provider, attempt = n, "provider retry succeeded");
                        }
                        State::Done(Ok(text))
                    }
                    AttemptOutcome::Transient(message) if n < max_attempts => State::Backoff {
                        next: n + 1,
                        last: message,
                    },
                    AttemptOutcome::Transient(message) => {
                        State::Done(Err(ProviderError::Transient {
                            provider: provider.to_string(),
                            attempts: n,
                            message,
                        }))
                    }
                    AttemptOutcome::Fatal(message) => State::Done(Err(ProviderError::Fatal {
                        provider: provider.to_string(),
                        attempt: n,
                        message,
                    })),
                    AttemptOutcome::Cancelled(reason) => {
                        State::Done(Err(ProviderError::Cancelled {
                            provider: provider.to_string(),
                            attempt: n,
                            reason,
                        }))
                    }
                },
            },
            State::Backoff { next, last } => {
                tracing::warn!(
                    provider,
                    next_attempt = next,
                    max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    reason = %last,
                    "provider overloaded; retrying"
                );
                match cancel.sleep(policy.delay) {
                    Ok(()) => State::Attempt(next),
                    Err(reason) => State::Done(Err(ProviderError::Cancelled {
                        provider: provider.to_string(),
                        attempt: next,
                        reason,
                    })),
                }
            }
            State::Done(result) => return result,
        };
    }
}
