//! Rate Limiter
//!
//! Token-bucket admission control per named external source. Each bucket is
//! registered explicitly before use; acquiring from an unknown source is a
//! configuration error, not a silent default.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("unknown rate limit source '{0}' - register it with capacity and refill rate first")]
    UnknownSource(String),

    #[error("invalid bucket config for '{0}': capacity and refill rate must be > 0")]
    InvalidBucket(String),

    #[error("requested {requested} tokens exceeds bucket capacity {capacity} for '{origin}'")]
    RequestExceedsCapacity {
        origin: String,
        requested: f64,
        capacity: f64,
    },
}

/// Per-source token bucket
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    /// Tokens replenished per second
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Token-bucket rate limiter over a registry of named sources.
///
/// Buckets are independent; exhausting one source never blocks another.
/// All mutation happens under the registry lock, which is never held across
/// an await point.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bucket for a named source. Replaces any existing bucket,
    /// starting full.
    pub fn register(
        &self,
        source: &str,
        capacity: f64,
        refill_rate: f64,
    ) -> Result<(), RateLimitError> {
        if capacity <= 0.0 || refill_rate <= 0.0 {
            return Err(RateLimitError::InvalidBucket(source.to_string()));
        }
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.insert(
            source.to_string(),
            Bucket {
                capacity,
                tokens: capacity,
                refill_rate,
                last_refill: Instant::now(),
            },
        );
        Ok(())
    }

    /// Try to take `tokens` from the source's bucket without waiting.
    ///
    /// Refills from elapsed time first, then deducts if enough is available.
    /// Returns `Ok(false)` (no partial deduction) when the bucket is short.
    pub fn acquire(&self, source: &str, tokens: f64) -> Result<bool, RateLimitError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets
            .get_mut(source)
            .ok_or_else(|| RateLimitError::UnknownSource(source.to_string()))?;

        if tokens > bucket.capacity {
            return Err(RateLimitError::RequestExceedsCapacity {
                origin: source.to_string(),
                requested: tokens,
                capacity: bucket.capacity,
            });
        }

        bucket.refill(Instant::now());
        if bucket.tokens >= tokens {
            bucket.tokens -= tokens;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Acquire `tokens`, suspending for the computed refill deficit when the
    /// bucket is short. The sleep duration is `deficit / refill_rate`, so the
    /// worst-case wait is deterministic.
    pub async fn wait_for_token(&self, source: &str, tokens: f64) -> Result<(), RateLimitError> {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
                let bucket = buckets
                    .get_mut(source)
                    .ok_or_else(|| RateLimitError::UnknownSource(source.to_string()))?;

                if tokens > bucket.capacity {
                    return Err(RateLimitError::RequestExceedsCapacity {
                        origin: source.to_string(),
                        requested: tokens,
                        capacity: bucket.capacity,
                    });
                }

                bucket.refill(Instant::now());
                if bucket.tokens >= tokens {
                    bucket.tokens -= tokens;
                    return Ok(());
                }

                let deficit = tokens - bucket.tokens;
                Duration::from_secs_f64(deficit / bucket.refill_rate)
            };

            tracing::debug!("Rate limit wait on '{}': {:?}", source, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Current token count for a source (post-refill), for status reporting.
    pub fn available(&self, source: &str) -> Result<f64, RateLimitError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets
            .get_mut(source)
            .ok_or_else(|| RateLimitError::UnknownSource(source.to_string()))?;
        bucket.refill(Instant::now());
        Ok(bucket.tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(source: &str, capacity: f64, rate: f64) -> RateLimiter {
        let limiter = RateLimiter::new();
        limiter.register(source, capacity, rate).unwrap();
        limiter
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_exhaustion() {
        let limiter = limiter_with("jupiter", 10.0, 1.0);

        for _ in 0..10 {
            assert!(limiter.acquire("jupiter", 1.0).unwrap());
        }
        // 11th acquisition fails
        assert!(!limiter.acquire("jupiter", 1.0).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_wait() {
        let limiter = limiter_with("jupiter", 10.0, 1.0);

        for _ in 0..10 {
            assert!(limiter.acquire("jupiter", 1.0).unwrap());
        }
        assert!(!limiter.acquire("jupiter", 1.0).unwrap());

        // 2 seconds at 1 token/s buys exactly 2 more acquisitions
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.acquire("jupiter", 1.0).unwrap());
        assert!(limiter.acquire("jupiter", 1.0).unwrap());
        assert!(!limiter.acquire("jupiter", 1.0).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_capped_at_capacity() {
        let limiter = limiter_with("jupiter", 5.0, 10.0);

        // Long idle period must not overfill the bucket
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!((limiter.available("jupiter").unwrap() - 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_acquire_does_not_deduct() {
        let limiter = limiter_with("jupiter", 3.0, 1.0);

        assert!(limiter.acquire("jupiter", 2.0).unwrap());
        // 1 token left, asking for 2 fails and leaves the 1 in place
        assert!(!limiter.acquire("jupiter", 2.0).unwrap());
        assert!(limiter.acquire("jupiter", 1.0).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_source_rejected() {
        let limiter = RateLimiter::new();
        let result = limiter.acquire("nowhere", 1.0);
        assert!(matches!(result, Err(RateLimitError::UnknownSource(_))));

        let result = limiter.wait_for_token("nowhere", 1.0).await;
        assert!(matches!(result, Err(RateLimitError::UnknownSource(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_beyond_capacity_rejected() {
        let limiter = limiter_with("jupiter", 2.0, 1.0);
        let result = limiter.acquire("jupiter", 5.0);
        assert!(matches!(
            result,
            Err(RateLimitError::RequestExceedsCapacity { .. })
        ));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("jupiter"), "got: {message}");
        assert!(message.contains("5"), "got: {message}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_token_suspends_for_deficit() {
        let limiter = limiter_with("jupiter", 1.0, 2.0);

        assert!(limiter.acquire("jupiter", 1.0).unwrap());

        // Empty bucket at 2 tokens/s: a 1-token wait is 0.5s. With the paused
        // clock, sleep auto-advances; completion proves the computed deficit
        // sleep resolves instead of spinning.
        let start = Instant::now();
        limiter.wait_for_token("jupiter", 1.0).await.unwrap();
        let waited = Instant::now().duration_since(start);
        assert!(waited >= Duration::from_millis(499), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buckets_are_independent() {
        let limiter = RateLimiter::new();
        limiter.register("jupiter", 1.0, 1.0).unwrap();
        limiter.register("dexscreener", 1.0, 1.0).unwrap();

        assert!(limiter.acquire("jupiter", 1.0).unwrap());
        assert!(!limiter.acquire("jupiter", 1.0).unwrap());
        // Exhausting jupiter leaves dexscreener untouched
        assert!(limiter.acquire("dexscreener", 1.0).unwrap());
    }

    #[test]
    fn test_invalid_bucket_config() {
        let limiter = RateLimiter::new();
        assert!(matches!(
            limiter.register("bad", 0.0, 1.0),
            Err(RateLimitError::InvalidBucket(_))
        ));
        assert!(matches!(
            limiter.register("bad", 1.0, -1.0),
            Err(RateLimitError::InvalidBucket(_))
        ));
    }
}
