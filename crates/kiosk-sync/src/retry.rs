//! # Retry Policy
//!
//! One retry abstraction shared by every caller that re-attempts local work:
//! a maximum attempt count plus a backoff schedule from the `backoff` crate.
//!
//! ```text
//! attempt 1 ──✗──► wait(backoff) ──► attempt 2 ──✗──► wait ──► attempt 3 ──✗──► RetryExhausted
//!     │                                  │                         │
//!     ✓                                  ✓                         ✓
//!     └──────────────────────────────────┴─────────────────────────┴──► Ok(value)
//! ```
//!
//! Remote uploads are deliberately not retried within a pass; this policy
//! is for local filesystem work.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use tracing::debug;

/// Returned when every attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Maximum attempts plus a fixed backoff between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    /// 3 attempts, 500 ms apart.
    fn default() -> Self {
        RetryPolicy::fixed(
            kiosk_core::FANOUT_MAX_ATTEMPTS,
            Duration::from_millis(kiosk_core::FANOUT_BACKOFF_MS),
        )
    }
}

impl RetryPolicy {
    /// `max_attempts` tries with a constant `delay` between them.
    /// At least one attempt is always made.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Same attempt count, no waiting. For tests.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy::fixed(max_attempts, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self) -> Constant {
        Constant::new(self.delay)
    }

    /// Runs `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut backoff = self.backoff();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(last_error) if attempt >= self.max_attempts => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error,
                    });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Attempt failed, retrying");
                    if let Some(wait) = backoff.next_backoff() {
                        if !wait.is_zero() {
                            tokio::time::sleep(wait).await;
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }
}
