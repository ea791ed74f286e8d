//! Price Aggregator
//!
//! Fetches a primary quote and an independent validation quote, compares
//! them, and refuses to authorize a trade when the two sources disagree
//! beyond the circuit-breaker threshold. A single unavailable source
//! degrades the result instead of blocking trading outright; divergence is
//! the only condition that hard-stops a trade, since it signals thin
//! liquidity, stale quotes, or a manipulated pool on one side.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::circuit_breaker::{BreakerError, BreakerRegistry};
use crate::domain::rate_limiter::{RateLimitError, RateLimiter};
use crate::domain::retry::RetryPolicy;
use crate::ports::price_source::{PriceSource, Quote, SourceError};

/// Default divergence above which the result is flagged degraded
pub const DEFAULT_MAX_PRICE_DIFF: f64 = 0.05;

/// Default divergence at which the aggregator refuses to authorize a trade
pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: f64 = 0.10;

#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Cross-source disagreement at or above the circuit-breaker threshold.
    /// The trade must not proceed.
    #[error(
        "price divergence circuit breaker triggered: {price_diff:.4} >= {threshold:.4} \
         (primary {primary_price}, validation {validation_price})"
    )]
    Divergence {
        price_diff: f64,
        threshold: f64,
        primary_price: f64,
        validation_price: f64,
    },

    /// Neither source produced a usable quote
    #[error("all price sources failed - primary: {primary}; validation: {validation}")]
    AllSourcesDown { primary: String, validation: String },

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

/// Validated price produced fresh per request; never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPrice {
    /// The price trading decisions should use
    pub price: f64,
    /// Name of the source that produced `price`
    pub source: String,
    /// Price from the independent validation source, when available
    pub validation_price: Option<f64>,
    /// Relative divergence between the two sources
    pub price_diff: Option<f64>,
    /// True when only one source was reachable
    pub fallback: bool,
    /// True when divergence sits between the soft and hard thresholds;
    /// usable, but callers may apply tighter risk limits
    pub degraded: bool,
}

/// Aggregator configuration. `max_price_diff` must sit below
/// `circuit_breaker_threshold`; the config loader enforces this.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub max_price_diff: f64,
    pub circuit_breaker_threshold: f64,
    pub retry: RetryPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_price_diff: DEFAULT_MAX_PRICE_DIFF,
            circuit_breaker_threshold: DEFAULT_CIRCUIT_BREAKER_THRESHOLD,
            retry: RetryPolicy::default(),
        }
    }
}

/// Cross-validating price fetcher over two independent sources
pub struct PriceAggregator {
    primary: Arc<dyn PriceSource>,
    validation: Arc<dyn PriceSource>,
    limiter: Arc<RateLimiter>,
    breakers: Arc<BreakerRegistry>,
    config: AggregatorConfig,
}

impl PriceAggregator {
    pub fn new(
        primary: Arc<dyn PriceSource>,
        validation: Arc<dyn PriceSource>,
        limiter: Arc<RateLimiter>,
        breakers: Arc<BreakerRegistry>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            primary,
            validation,
            limiter,
            breakers,
            config,
        }
    }

    /// Fetch and cross-validate a price for swapping `amount` of `token_in`
    /// into `token_out`.
    pub async fn get_aggregated_price(
        &self,
        token_in: &str,
        token_out: &str,
        amount: u64,
    ) -> Result<AggregatedPrice, AggregatorError> {
        let primary = self.fetch_guarded(&self.primary, token_in, token_out, amount).await;
        let validation = self
            .fetch_guarded(&self.validation, token_in, token_out, amount)
            .await;

        match (primary, validation) {
            (Ok(p), Ok(v)) => self.compare(p, v),
            (Ok(p), Err(e)) => {
                tracing::warn!(
                    "Validation source '{}' unavailable ({}), using primary alone",
                    self.validation.name(),
                    e
                );
                Ok(AggregatedPrice {
                    price: p.price,
                    source: p.source,
                    validation_price: None,
                    price_diff: None,
                    fallback: true,
                    degraded: false,
                })
            }
            (Err(e), Ok(v)) => {
                tracing::warn!(
                    "Primary source '{}' unavailable ({}), falling back to validation source",
                    self.primary.name(),
                    e
                );
                Ok(AggregatedPrice {
                    price: v.price,
                    source: v.source,
                    validation_price: None,
                    price_diff: None,
                    fallback: true,
                    degraded: false,
                })
            }
            (Err(FetchError::RateLimit(e)), Err(_)) => Err(AggregatorError::RateLimit(e)),
            (Err(primary_err), Err(validation_err)) => Err(AggregatorError::AllSourcesDown {
                primary: primary_err.to_string(),
                validation: validation_err.to_string(),
            }),
        }
    }

    fn compare(&self, primary: Quote, validation: Quote) -> Result<AggregatedPrice, AggregatorError> {
        let price_diff = (primary.price - validation.price).abs() / validation.price;

        if price_diff >= self.config.circuit_breaker_threshold {
            tracing::error!(
                "Price divergence {:.4} between '{}' ({}) and '{}' ({}) - trade blocked",
                price_diff,
                primary.source,
                primary.price,
                validation.source,
                validation.price
            );
            return Err(AggregatorError::Divergence {
                price_diff,
                threshold: self.config.circuit_breaker_threshold,
                primary_price: primary.price,
                validation_price: validation.price,
            });
        }

        let degraded = price_diff >= self.config.max_price_diff;
        if degraded {
            tracing::warn!(
                "Price divergence {:.4} above soft limit {:.4} - result degraded",
                price_diff,
                self.config.max_price_diff
            );
        }

        Ok(AggregatedPrice {
            price: primary.price,
            source: primary.source,
            validation_price: Some(validation.price),
            price_diff: Some(price_diff),
            fallback: false,
            degraded,
        })
    }

    /// One source call: rate-limit wait, then the retried fetch through the
    /// source's circuit breaker. Open breakers are not retried.
    async fn fetch_guarded(
        &self,
        source: &Arc<dyn PriceSource>,
        token_in: &str,
        token_out: &str,
        amount: u64,
    ) -> Result<Quote, FetchError> {
        self.limiter
            .wait_for_token(source.name(), 1.0)
            .await
            .map_err(FetchError::RateLimit)?;

        let breaker = self.breakers.get(source.name());
        self.config
            .retry
            .run(
                || breaker.call(|| source.fetch_quote(token_in, token_out, amount)),
                |e| matches!(e, BreakerError::Inner(inner) if inner.is_transient()),
            )
            .await
            .map_err(FetchError::Fetch)
    }
}

/// Internal per-source failure, before the two sources are combined
#[derive(Debug, Error)]
enum FetchError {
    #[error(transparent)]
    RateLimit(RateLimitError),
    #[error(transparent)]
    Fetch(BreakerError<SourceError>),
}
