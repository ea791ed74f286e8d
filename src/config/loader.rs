//! Configuration Loader
//!
//! Loads and validates configuration from TOML files. Unknown keys are
//! rejected at parse time so a typo in a threshold name fails loudly instead
//! of silently falling back to a default.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::application::price_aggregator::AggregatorConfig;
use crate::application::trade_executor::ExecutorConfig;
use crate::domain::circuit_breaker::BreakerRegistry;
use crate::domain::profit_taker::ProfitTier;
use crate::domain::rate_limiter::{RateLimitError, RateLimiter};
use crate::domain::retry::RetryPolicy;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub execution: ExecutionSection,
    pub aggregator: AggregatorSection,
    /// Rate-limit bucket per named source or venue
    pub sources: HashMap<String, SourceSection>,
    /// Circuit breaker settings per named venue or source
    #[serde(default)]
    pub venues: HashMap<String, VenueSection>,
    #[serde(default)]
    pub profit_taking: ProfitTakingSection,
    pub jupiter: JupiterSection,
    pub solana: SolanaSection,
    pub logging: LoggingSection,
}

/// Trade execution section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSection {
    /// Minimum accepted slippage tolerance in basis points
    pub min_slippage_bps: u16,
    /// Maximum accepted slippage tolerance in basis points
    pub max_slippage_bps: u16,
    /// Submission attempts per trade
    pub max_retries: u32,
    /// Delay between submission attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Settlement polls before an order expires
    pub confirm_attempts: u32,
    /// Delay between settlement polls in milliseconds
    pub confirm_interval_ms: u64,
}

/// Price aggregation section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregatorSection {
    /// Divergence above which results are flagged degraded
    pub max_price_diff: f64,
    /// Divergence at which trades are blocked outright
    pub circuit_breaker_threshold: f64,
    /// Fetch attempts per source
    pub max_retries: u32,
    /// Delay between fetch attempts in milliseconds
    pub retry_delay_ms: u64,
}

/// Token-bucket rate limit for one source
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    /// Maximum burst size in tokens
    pub capacity: f64,
    /// Refill rate in tokens per second
    pub refill_rate: f64,
}

/// Circuit breaker settings for one venue
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VenueSection {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// How long the breaker stays open in milliseconds
    pub reset_timeout_ms: u64,
    /// Retry hint handed to callers rejected during a half-open trial
    pub half_open_timeout_ms: u64,
}

/// Staged profit taking section
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProfitTakingSection {
    /// Tiers as (price multiple, fraction of original position to sell).
    /// Empty means use the built-in ladder.
    #[serde(default)]
    pub tiers: Vec<TierEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierEntry {
    pub multiple: f64,
    pub sell_fraction: f64,
}

/// Jupiter API section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JupiterSection {
    /// Swap API base URL
    pub api_url: String,
    /// Optional API key for higher rate limits
    #[serde(default)]
    pub api_key: Option<String>,
}

impl JupiterSection {
    /// API key with environment variable fallback (JUPITER_API_KEY)
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var("JUPITER_API_KEY").ok()
    }
}

/// Solana RPC section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolanaSection {
    /// RPC endpoint used for settlement polling
    pub rpc_url: String,
    /// Wallet address swap transactions are built for
    pub wallet_pubkey: String,
}

impl SolanaSection {
    /// RPC URL with environment variable override (SOLANA_RPC_URL)
    pub fn get_rpc_url(&self) -> String {
        std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.min_slippage_bps > self.execution.max_slippage_bps {
            return Err(ConfigError::ValidationError(format!(
                "min_slippage_bps {} exceeds max_slippage_bps {}",
                self.execution.min_slippage_bps, self.execution.max_slippage_bps
            )));
        }
        if self.execution.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "max_retries must be > 0".to_string(),
            ));
        }
        if self.execution.confirm_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "confirm_attempts must be > 0".to_string(),
            ));
        }

        if self.aggregator.max_price_diff <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "max_price_diff must be > 0, got {}",
                self.aggregator.max_price_diff
            )));
        }
        if self.aggregator.circuit_breaker_threshold <= self.aggregator.max_price_diff {
            return Err(ConfigError::ValidationError(format!(
                "circuit_breaker_threshold {} must exceed max_price_diff {}",
                self.aggregator.circuit_breaker_threshold, self.aggregator.max_price_diff
            )));
        }

        for (name, source) in &self.sources {
            if source.capacity <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "source '{}': capacity must be > 0, got {}",
                    name, source.capacity
                )));
            }
            if source.refill_rate <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "source '{}': refill_rate must be > 0, got {}",
                    name, source.refill_rate
                )));
            }
        }

        for (name, venue) in &self.venues {
            if venue.failure_threshold == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "venue '{}': failure_threshold must be > 0",
                    name
                )));
            }
        }

        let mut fraction_sum = 0.0;
        for tier in &self.profit_taking.tiers {
            if tier.multiple <= 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "profit tier multiple must be > 1, got {}",
                    tier.multiple
                )));
            }
            if tier.sell_fraction <= 0.0 || tier.sell_fraction > 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "profit tier sell_fraction must be in (0, 1], got {}",
                    tier.sell_fraction
                )));
            }
            fraction_sum += tier.sell_fraction;
        }
        if fraction_sum > 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "profit tier fractions sum to {fraction_sum}, exceeding the position"
            )));
        }

        if self.jupiter.api_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "api_url cannot be empty".to_string(),
            ));
        }
        if self.solana.rpc_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "rpc_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Build a rate limiter with one bucket per configured source
    pub fn build_rate_limiter(&self) -> Result<RateLimiter, RateLimitError> {
        let limiter = RateLimiter::new();
        for (name, source) in &self.sources {
            limiter.register(name, source.capacity, source.refill_rate)?;
        }
        Ok(limiter)
    }

    /// Build a breaker registry seeded with per-venue overrides
    pub fn build_breaker_registry(&self) -> BreakerRegistry {
        let registry = BreakerRegistry::new();
        for (name, venue) in &self.venues {
            registry.register(
                name,
                venue.failure_threshold,
                Duration::from_millis(venue.reset_timeout_ms),
                Duration::from_millis(venue.half_open_timeout_ms),
            );
        }
        registry
    }

    pub fn profit_tiers(&self) -> Vec<ProfitTier> {
        self.profit_taking
            .tiers
            .iter()
            .map(|t| ProfitTier {
                multiple: t.multiple,
                sell_fraction: t.sell_fraction,
            })
            .collect()
    }
}

impl From<&Config> for ExecutorConfig {
    fn from(config: &Config) -> Self {
        ExecutorConfig {
            min_slippage_bps: config.execution.min_slippage_bps,
            max_slippage_bps: config.execution.max_slippage_bps,
            retry: RetryPolicy::new(
                config.execution.max_retries,
                Duration::from_millis(config.execution.retry_delay_ms),
            ),
            confirm_attempts: config.execution.confirm_attempts,
            confirm_interval: Duration::from_millis(config.execution.confirm_interval_ms),
        }
    }
}

impl From<&Config> for AggregatorConfig {
    fn from(config: &Config) -> Self {
        AggregatorConfig {
            max_price_diff: config.aggregator.max_price_diff,
            circuit_breaker_threshold: config.aggregator.circuit_breaker_threshold,
            retry: RetryPolicy::new(
                config.aggregator.max_retries,
                Duration::from_millis(config.aggregator.retry_delay_ms),
            ),
        }
    }
}
