//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::time::Duration;

use tracing::warn;

use crate::metrics;

/// Longest wait between two tries, unless the initial delay is longer.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of tries. Zero behaves like one.
    pub attempts: u32,
    /// Wait before the second try.
    pub delay: Duration,
    /// Multiplier applied to the wait after every failed try.
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            attempts,
            delay,
            backoff,
        }
    }

    /// Wait after the given failed try (1-based), capped at
    /// [`MAX_RETRY_DELAY`] or the initial delay, whichever is longer.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let cap = MAX_RETRY_DELAY.max(self.delay);
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.delay.as_secs_f64() * factor)
            .map_or(cap, |delay| delay.min(cap))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), 2.0)
    }
}

/// Run `op` until it succeeds or the policy is exhausted; the last error is
/// returned on exhaustion.
pub async fn retry_with_policy<T, E, F>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => {
                metrics::QUEUE_OP_ATTEMPTS
                    .with_label_values(&[op_name, "success"])
                    .inc();
                return Ok(value);
            }
            Err(e) => {
                metrics::QUEUE_OP_ATTEMPTS
                    .with_label_values(&[op_name, "error"])
                    .inc();
                if attempt >= attempts {
                    return Err(e);
                }
                let wait = policy.delay_after(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts = attempts,
                    retry_in_ms = wait.as_millis() as u64,
                    "Operation failed: {}",
                    e
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
