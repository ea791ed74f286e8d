//! Price Source Port
//!
//! Trait boundary for external quote providers. The aggregator treats every
//! source the same way: a named endpoint that either returns an immutable
//! quote or fails with a classifiable error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SourceError {
    /// Transient network/timeout failure - worth retrying
    #[error("connectivity error from {origin}: {message}")]
    Connectivity { origin: String, message: String },

    /// Response arrived but could not be interpreted
    #[error("malformed response from {origin}: {message}")]
    Malformed { origin: String, message: String },

    /// Source answered but has no price for the pair
    #[error("{origin} has no price data for {mint}")]
    NoData { origin: String, mint: String },
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Connectivity { .. })
    }

    pub fn source_name(&self) -> &str {
        match self {
            SourceError::Connectivity { origin, .. }
            | SourceError::Malformed { origin, .. }
            | SourceError::NoData { origin, .. } => origin,
        }
    }
}

/// A price/amount pair for a prospective swap. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Name of the source that produced this quote
    pub source: String,
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in base units
    pub input_amount: u64,
    /// Output amount in base units
    pub output_amount: u64,
    /// Derived price: output per unit of input
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        source: impl Into<String>,
        input_mint: impl Into<String>,
        output_mint: impl Into<String>,
        input_amount: u64,
        output_amount: u64,
        price: f64,
    ) -> Self {
        Self {
            source: source.into(),
            input_mint: input_mint.into(),
            output_mint: output_mint.into(),
            input_amount,
            output_amount,
            price,
            fetched_at: Utc::now(),
        }
    }
}

/// External quote provider
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Stable name used for rate-limit buckets and circuit breakers
    fn name(&self) -> &str;

    /// Fetch a quote for swapping `amount` base units of `input_mint` into
    /// `output_mint`.
    async fn fetch_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
    ) -> Result<Quote, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_messages_carry_origin_name() {
        let err = SourceError::Connectivity {
            origin: "jupiter".to_string(),
            message: "timed out".to_string(),
        };
        assert_eq!(err.source_name(), "jupiter");
        assert_eq!(err.to_string(), "connectivity error from jupiter: timed out");

        let err = SourceError::NoData {
            origin: "dexscreener".to_string(),
            mint: "So111".to_string(),
        };
        assert_eq!(err.source_name(), "dexscreener");
        assert_eq!(err.to_string(), "dexscreener has no price data for So111");
    }
}
