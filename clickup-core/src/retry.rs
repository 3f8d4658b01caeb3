//! Bounded retry with backoff.
//!
//! Every request runs through a small state machine:
//!
//! ```text
//! Attempting(1) -> Waiting(1, d) -> Attempting(2) -> ... -> Succeeded | Failed(n)
//! ```
//!
//! [`RetryPolicy`] decides the bound and the delay; [`RetryState`] only moves between
//! states, so both can be tested without any I/O.

use std::time::Duration;

/// Retry bound and delay policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry when the provider gives no hint
    pub initial_backoff: Duration,
    /// Upper bound for any delay, hinted or computed
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    ///
    /// Uses the provider hint when present, otherwise `initial * 2^(attempt-1)`.
    /// The result never exceeds `max_backoff`.
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = match hint {
            Some(hint) => hint,
            None => {
                let exponent = attempt.saturating_sub(1).min(31);
                self.initial_backoff.saturating_mul(2_u32.saturating_pow(exponent))
            }
        };
        delay.min(self.max_backoff)
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Where a request is in its retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is in flight
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed transiently, next one starts after `delay`
    Waiting { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    /// Bound exceeded after `attempts` attempts
    Failed { attempts: u32 },
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    pub fn on_success(self) -> Self {
        match self {
            RetryState::Attempting { attempt } => RetryState::Succeeded { attempts: attempt },
            other => other,
        }
    }

    pub fn on_transient_failure(self, policy: &RetryPolicy, hint: Option<Duration>) -> Self {
        match self {
            RetryState::Attempting { attempt } if attempt <= policy.max_retries => {
                RetryState::Waiting {
                    attempt,
                    delay: policy.delay(attempt, hint),
                }
            }
            RetryState::Attempting { attempt } => RetryState::Failed { attempts: attempt },
            other => other,
        }
    }

    pub fn on_wait_elapsed(self) -> Self {
        match self {
            RetryState::Waiting { attempt, .. } => RetryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}
