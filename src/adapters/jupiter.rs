//! Jupiter Price Source
//!
//! HTTP adapter over the Jupiter DEX aggregator quote API. Retries and
//! circuit breaking live in the aggregator, so this client is single-shot:
//! one request, one classified result.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::ports::price_source::{PriceSource, Quote, SourceError};

pub const DEFAULT_JUPITER_API_URL: &str = "https://api.jup.ag/swap/v1";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_QUOTE_SLIPPAGE_BPS: u16 = 50;

#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub api_base_url: String,
    /// Optional API key for higher rate limits
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_JUPITER_API_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JupiterPriceSource {
    config: JupiterConfig,
    http: Client,
}

/// Quote response subset we consume. Amounts are decimal strings on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterQuoteResponse {
    in_amount: String,
    out_amount: String,
}

impl JupiterPriceSource {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_config(JupiterConfig::default())
    }

    pub fn with_config(config: JupiterConfig) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Connectivity {
                origin: "jupiter".to_string(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { config, http })
    }

    fn connectivity(&self, message: impl Into<String>) -> SourceError {
        SourceError::Connectivity {
            origin: self.name().to_string(),
            message: message.into(),
        }
    }

    fn malformed(&self, message: impl Into<String>) -> SourceError {
        SourceError::Malformed {
            origin: self.name().to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl PriceSource for JupiterPriceSource {
    fn name(&self) -> &str {
        "jupiter"
    }

    async fn fetch_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
    ) -> Result<Quote, SourceError> {
        let url = format!("{}/quote", self.config.api_base_url);

        let mut req = self.http.get(&url).query(&[
            ("inputMint", input_mint),
            ("outputMint", output_mint),
            ("amount", &amount.to_string()),
            ("slippageBps", &DEFAULT_QUOTE_SLIPPAGE_BPS.to_string()),
        ]);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| self.connectivity(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(self.connectivity(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.malformed(format!("HTTP {status}: {body}")));
        }

        let quote: JupiterQuoteResponse = response
            .json()
            .await
            .map_err(|e| self.malformed(format!("failed to parse quote: {e}")))?;

        let in_amount: u64 = quote
            .in_amount
            .parse()
            .map_err(|_| self.malformed(format!("non-numeric inAmount '{}'", quote.in_amount)))?;
        let out_amount: u64 = quote
            .out_amount
            .parse()
            .map_err(|_| self.malformed(format!("non-numeric outAmount '{}'", quote.out_amount)))?;
        if in_amount == 0 {
            return Err(self.malformed("quote has zero input amount"));
        }

        Ok(Quote::new(
            self.name(),
            input_mint,
            output_mint,
            in_amount,
            out_amount,
            out_amount as f64 / in_amount as f64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JupiterConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_JUPITER_API_URL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_client_creation() {
        assert!(JupiterPriceSource::new().is_ok());
    }

    #[test]
    fn test_quote_response_parses_camel_case() {
        let json = r#"{"inAmount":"1000000","outAmount":"150000000","routePlan":[]}"#;
        let quote: JupiterQuoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(quote.in_amount, "1000000");
        assert_eq!(quote.out_amount, "150000000");
    }
}
