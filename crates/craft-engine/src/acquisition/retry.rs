//! Bounded retry as an explicit state machine
//!
//! ```text
//! Attempting(n) ──ok──────────────────────────▶ Success
//!      │
//!      └─err─┬─ transient, n < max ──▶ Retrying(n+1) ──backoff──▶ Attempting(n+1)
//!            ├─ fallback permitted ──▶ Fallback
//!            └─ otherwise ───────────▶ Fatal
//! ```

use crate::config::AcquisitionConfig;
use std::future::Future;
use std::time::Duration;

/// Where a retried operation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt `n` (1-based) is running
    Attempting(u32),
    Success,
    /// Waiting out the backoff before attempt `n`
    Retrying(u32),
    /// Attempts exhausted; substitute local content
    Fallback,
    /// Attempts exhausted or error not retryable; give up
    Fatal,
}

impl RetryState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Fallback | Self::Fatal)
    }
}

/// Final result of [`RetryPolicy::run`]
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success(T),
    /// Last error, when fallback is permitted
    Fallback(E),
    Fatal(E),
}

/// Attempt bound, backoff and fallback permission for one source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub fallback: bool,
}

impl RetryPolicy {
    /// Policy without fallback; `max_attempts` is at least 1
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            fallback: false,
        }
    }

    #[must_use]
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(config.max_attempts, config.backoff())
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn start(&self) -> RetryState {
        RetryState::Attempting(1)
    }

    /// Transition after attempt `attempt` failed
    #[must_use]
    pub fn after_failure(&self, attempt: u32, transient: bool) -> RetryState {
        if transient && attempt < self.max_attempts {
            RetryState::Retrying(attempt + 1)
        } else if self.fallback {
            RetryState::Fallback
        } else {
            RetryState::Fatal
        }
    }

    /// Drive `op` through the state machine
    ///
    /// `op` receives the 1-based attempt number. The backoff is slept only
    /// between attempts, never after the last one.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        is_transient: impl Fn(&E) -> bool,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(err) => err,
            };

            match self.after_failure(attempt, is_transient(&err)) {
                RetryState::Retrying(next) => {
                    tracing::warn!(attempt, max = self.max_attempts, error = %err, "attempt failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                    attempt = next;
                }
                RetryState::Fallback => return RetryOutcome::Fallback(err),
                RetryState::Fatal | RetryState::Attempting(_) | RetryState::Success => {
                    return RetryOutcome::Fatal(err)
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AcquisitionConfig::default())
    }
}
