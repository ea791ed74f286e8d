//! DexScreener Price Source
//!
//! Independent validation feed. DexScreener indexes on-chain pools directly,
//! so its price does not share a failure mode with the Jupiter routing API,
//! which is what makes it useful for cross-validation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::ports::price_source::{PriceSource, Quote, SourceError};

pub const DEFAULT_DEXSCREENER_API_URL: &str = "https://api.dexscreener.com/latest/dex";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DexScreenerConfig {
    pub api_base_url: String,
    pub timeout: Duration,
    /// Restrict pair lookup to one chain
    pub chain_id: String,
}

impl Default for DexScreenerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_DEXSCREENER_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            chain_id: "solana".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DexScreenerSource {
    config: DexScreenerConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    #[serde(default)]
    pairs: Vec<PairData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairData {
    chain_id: String,
    price_native: String,
    #[serde(default)]
    liquidity: Option<LiquidityData>,
}

#[derive(Debug, Deserialize)]
struct LiquidityData {
    #[serde(default)]
    usd: f64,
}

impl DexScreenerSource {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_config(DexScreenerConfig::default())
    }

    pub fn with_config(config: DexScreenerConfig) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Connectivity {
                origin: "dexscreener".to_string(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl PriceSource for DexScreenerSource {
    fn name(&self) -> &str {
        "dexscreener"
    }

    async fn fetch_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
    ) -> Result<Quote, SourceError> {
        let url = format!("{}/tokens/{}", self.config.api_base_url, output_mint);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Connectivity {
                origin: self.name().to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(SourceError::Connectivity {
                origin: self.name().to_string(),
                message: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Malformed {
                origin: self.name().to_string(),
                message: format!("HTTP {status}"),
            });
        }

        let body: DexScreenerResponse =
            response.json().await.map_err(|e| SourceError::Malformed {
                origin: self.name().to_string(),
                message: format!("failed to parse response: {e}"),
            })?;

        // Deepest pool on the configured chain gives the most reliable price
        let pair = body
            .pairs
            .into_iter()
            .filter(|p| p.chain_id == self.config.chain_id)
            .max_by(|a, b| {
                let la = a.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
                let lb = b.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
                la.total_cmp(&lb)
            })
            .ok_or_else(|| SourceError::NoData {
                origin: self.name().to_string(),
                mint: output_mint.to_string(),
            })?;

        let unit_price: f64 = pair.price_native.parse().map_err(|_| SourceError::Malformed {
            origin: self.name().to_string(),
            message: format!("non-numeric priceNative '{}'", pair.price_native),
        })?;
        if unit_price <= 0.0 {
            return Err(SourceError::NoData {
                origin: self.name().to_string(),
                mint: output_mint.to_string(),
            });
        }

        // priceNative is input-per-output; the aggregator compares
        // output-per-input, so invert
        let price = 1.0 / unit_price;
        Ok(Quote::new(
            self.name(),
            input_mint,
            output_mint,
            amount,
            (amount as f64 * price) as u64,
            price,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parses_and_prefers_deepest_pool() {
        let json = r#"{"pairs":[
            {"chainId":"solana","priceNative":"0.0100","liquidity":{"usd":5000.0}},
            {"chainId":"solana","priceNative":"0.0105","liquidity":{"usd":250000.0}},
            {"chainId":"ethereum","priceNative":"0.0200","liquidity":{"usd":900000.0}}
        ]}"#;
        let body: DexScreenerResponse = serde_json::from_str(json).unwrap();
        let best = body
            .pairs
            .into_iter()
            .filter(|p| p.chain_id == "solana")
            .max_by(|a, b| {
                let la = a.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
                let lb = b.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
                la.total_cmp(&lb)
            })
            .unwrap();
        assert_eq!(best.price_native, "0.0105");
    }

    #[test]
    fn test_empty_pairs_deserializes() {
        let body: DexScreenerResponse = serde_json::from_str(r#"{"pairs":[]}"#).unwrap();
        assert!(body.pairs.is_empty());
    }

    #[test]
    fn test_client_creation() {
        assert!(DexScreenerSource::new().is_ok());
    }
}
