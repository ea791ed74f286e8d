//! Circuit Breaker
//!
//! Three-state failure isolation around any fallible async call. A breaker
//! that has seen `failure_threshold` consecutive failures stops invoking the
//! protected dependency and fails fast until `reset_timeout` elapses, after
//! which exactly one trial call is let through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Default consecutive failures before opening
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before a half-open trial is permitted
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry hint handed to callers rejected during a half-open trial
pub const DEFAULT_HALF_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BreakerError<E: std::error::Error + 'static> {
    /// Dependency is known-bad; the protected call was not invoked.
    #[error("circuit breaker open for '{name}', retry in {retry_in:?}")]
    Open { name: String, retry_in: Duration },

    /// The protected call ran and failed; the original error is preserved.
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerCore {
    state: BreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Snapshot of breaker internals for status reporting
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
}

/// Per-dependency circuit breaker.
///
/// State lives under a mutex that is never held across an await point: the
/// admission decision and the outcome recording are separate critical
/// sections flanking the protected call.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_timeout: Duration,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(
            name,
            DEFAULT_FAILURE_THRESHOLD,
            DEFAULT_RESET_TIMEOUT,
            DEFAULT_HALF_OPEN_TIMEOUT,
        )
    }

    pub fn with_config(
        name: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
        half_open_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            half_open_timeout,
            core: Mutex::new(BreakerCore {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.core.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.core.lock().unwrap_or_else(|e| e.into_inner());
        BreakerSnapshot {
            name: self.name.clone(),
            state: core.state,
            failure_count: core.failure_count,
        }
    }

    /// Run `op` through the breaker.
    ///
    /// While open within `reset_timeout` of the last failure, callers fail
    /// fast without invoking `op`, so at most one probe reaches a known-bad
    /// dependency per timeout window. The first caller after the window runs
    /// a half-open trial; concurrent callers during the trial are rejected
    /// with the half-open retry hint.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let trial = self.admit()?;

        match op().await {
            Ok(value) => {
                self.record_success(trial);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(trial);
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Admission decision. `Ok(true)` means this call is the half-open trial.
    fn admit<E: std::error::Error + 'static>(&self) -> Result<bool, BreakerError<E>> {
        let mut core = self.core.lock().unwrap_or_else(|e| e.into_inner());
        match core.state {
            BreakerState::Closed => Ok(false),
            BreakerState::HalfOpen => Err(BreakerError::Open {
                name: self.name.clone(),
                retry_in: self.half_open_timeout,
            }),
            BreakerState::Open => {
                let elapsed = core
                    .last_failure_time
                    .map(|t| Instant::now().duration_since(t))
                    .unwrap_or(self.reset_timeout);
                if elapsed >= self.reset_timeout {
                    core.state = BreakerState::HalfOpen;
                    tracing::info!("Circuit breaker '{}' half-open, permitting trial", self.name);
                    Ok(true)
                } else {
                    Err(BreakerError::Open {
                        name: self.name.clone(),
                        retry_in: self.reset_timeout - elapsed,
                    })
                }
            }
        }
    }

    fn record_success(&self, trial: bool) {
        let mut core = self.core.lock().unwrap_or_else(|e| e.into_inner());
        core.failure_count = 0;
        if trial || core.state == BreakerState::HalfOpen {
            tracing::info!("Circuit breaker '{}' closed after successful trial", self.name);
        }
        core.state = BreakerState::Closed;
    }

    fn record_failure(&self, trial: bool) {
        let mut core = self.core.lock().unwrap_or_else(|e| e.into_inner());
        core.failure_count += 1;
        if trial || core.failure_count >= self.failure_threshold {
            if core.state != BreakerState::Open {
                tracing::error!(
                    "Circuit breaker '{}' OPEN after {} failure(s)",
                    self.name,
                    core.failure_count
                );
            }
            core.state = BreakerState::Open;
            core.last_failure_time = Some(Instant::now());
        }
    }
}

/// Per-venue/per-source breaker registry, owned by the service instance and
/// injected where needed rather than living in a global.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_timeout: Duration,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::with_defaults(
            DEFAULT_FAILURE_THRESHOLD,
            DEFAULT_RESET_TIMEOUT,
            DEFAULT_HALF_OPEN_TIMEOUT,
        )
    }

    /// Registry whose lazily-created breakers use the given settings.
    pub fn with_defaults(
        failure_threshold: u32,
        reset_timeout: Duration,
        half_open_timeout: Duration,
    ) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            failure_threshold,
            reset_timeout,
            half_open_timeout,
        }
    }

    /// Register a breaker with explicit settings for a named dependency.
    pub fn register(
        &self,
        name: &str,
        failure_threshold: u32,
        reset_timeout: Duration,
        half_open_timeout: Duration,
    ) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::with_config(
            name,
            failure_threshold,
            reset_timeout,
            half_open_timeout,
        ));
        self.breakers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Fetch the breaker for a dependency, creating one with registry
    /// defaults on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::with_config(
                name,
                self.failure_threshold,
                self.reset_timeout,
                self.half_open_timeout,
            ))
        }))
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|b| b.snapshot())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    fn test_breaker() -> CircuitBreaker {
        CircuitBreaker::with_config(
            "venue",
            2,
            Duration::from_millis(500),
            Duration::from_millis(100),
        )
    }

    async fn fail(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<Boom>> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Boom)
            })
            .await
            .map(|_| ())
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<Boom>> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), Boom>(())
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_below_threshold_propagate_and_stay_closed() {
        let breaker = test_breaker();
        let calls = AtomicU32::new(0);

        let result = fail(&breaker, &calls).await;
        assert!(matches!(result, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_open_the_breaker() {
        let breaker = test_breaker();
        let calls = AtomicU32::new(0);

        fail(&breaker, &calls).await.unwrap_err();
        fail(&breaker, &calls).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_fails_fast_without_invoking() {
        let breaker = test_breaker();
        let calls = AtomicU32::new(0);

        fail(&breaker, &calls).await.unwrap_err();
        fail(&breaker, &calls).await.unwrap_err();

        // Inside the reset window the wrapped fn must not run
        tokio::time::advance(Duration::from_millis(200)).await;
        let result = succeed(&breaker, &calls).await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_closes_on_success() {
        let breaker = test_breaker();
        let calls = AtomicU32::new(0);

        fail(&breaker, &calls).await.unwrap_err();
        fail(&breaker, &calls).await.unwrap_err();

        tokio::time::advance(Duration::from_millis(500)).await;
        succeed(&breaker, &calls).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Fully recovered: another call goes straight through
        succeed(&breaker, &calls).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = test_breaker();
        let calls = AtomicU32::new(0);

        fail(&breaker, &calls).await.unwrap_err();
        fail(&breaker, &calls).await.unwrap_err();

        tokio::time::advance(Duration::from_millis(500)).await;
        let result = fail(&breaker, &calls).await;
        assert!(matches!(result, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.state(), BreakerState::Open);

        // Failed trial restarts the cooldown
        let result = succeed(&breaker, &calls).await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = test_breaker();
        let calls = AtomicU32::new(0);

        fail(&breaker, &calls).await.unwrap_err();
        succeed(&breaker, &calls).await.unwrap();
        // Counter was reset, so a single new failure does not open
        fail(&breaker, &calls).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_returns_same_breaker() {
        let registry = BreakerRegistry::with_defaults(
            2,
            Duration::from_millis(500),
            Duration::from_millis(100),
        );
        let a = registry.get("raydium");
        let b = registry.get("raydium");
        assert!(Arc::ptr_eq(&a, &b));

        let other = registry.get("orca");
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.snapshots().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_explicit_settings() {
        let registry = BreakerRegistry::new();
        let breaker = registry.register(
            "raydium",
            1,
            Duration::from_millis(100),
            Duration::from_millis(50),
        );
        let calls = AtomicU32::new(0);

        fail(&breaker, &calls).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(registry.get("raydium").state(), BreakerState::Open);
    }
}
