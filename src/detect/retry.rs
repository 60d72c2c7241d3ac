use anyhow::Result;
use std::time::Duration;

use super::client::is_rate_limited;

/// Bounded exponential backoff for rate-limited requests.
///
/// Only rate-limit errors are retried. Any other error is returned after the
/// attempt that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait after the first rate-limited attempt; doubles for each later one.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Run `op` (called with the 1-based attempt number) under this policy.
    ///
    /// `sleep` is invoked with each backoff delay; no delay follows the final attempt.
    pub fn run<T>(
        &self,
        mut sleep: impl FnMut(Duration),
        mut op: impl FnMut(u32) -> Result<T>,
    ) -> Result<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.initial_delay;
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if is_rate_limited(&err) && attempt < max_attempts => {
                    log::warn!(
                        "rate limited (attempt {}/{}), waiting {:.1}s",
                        attempt,
                        max_attempts,
                        delay.as_secs_f64()
                    );
                    sleep(delay);
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) if is_rate_limited(&err) => {
                    return Err(err.context(format!(
                        "rate limit exceeded after {} attempts",
                        attempt
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }
}
