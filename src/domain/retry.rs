//! Retry Policy
//!
//! Fixed-delay retry loop shared by the price aggregator and trade executor.
//! Only errors the caller classifies as transient are retried; anything else
//! propagates immediately.

use std::future::Future;
use std::time::Duration;

/// Default number of attempts for network-bound calls
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Reusable retry configuration for network-bound calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` up to `max_attempts` times, sleeping `delay` between attempts.
    ///
    /// `is_transient` decides whether a given error is worth retrying.
    /// Non-transient errors (validation failures, open breakers) return on the
    /// first occurrence.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_transient(&e) => {
                    tracing::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        e,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
