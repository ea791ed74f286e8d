//! Jupiter Swap Venue
//!
//! Execution adapter: builds a swap transaction through the Jupiter swap API,
//! hands it to the injected signer for signing and broadcast, and checks
//! settlement through `getSignatureStatuses` on a Solana JSON-RPC endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::order::TradeOrder;
use crate::ports::venue::{TransactionSigner, Venue, VenueError, VenueTxStatus};

pub const DEFAULT_SWAP_API_URL: &str = "https://api.jup.ag/swap/v1";
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct JupiterVenueConfig {
    pub swap_api_url: String,
    pub api_key: Option<String>,
    pub rpc_url: String,
    /// Wallet address the swap transaction is built for
    pub user_public_key: String,
    pub timeout: Duration,
}

impl Default for JupiterVenueConfig {
    fn default() -> Self {
        Self {
            swap_api_url: DEFAULT_SWAP_API_URL.to_string(),
            api_key: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            user_public_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Request body for the swap-build endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest {
    user_public_key: String,
    quote_response: serde_json::Value,
    dynamic_compute_unit_limit: bool,
}

/// Response subset: the base64 transaction ready to sign
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

pub struct JupiterVenue {
    config: JupiterVenueConfig,
    http: Client,
    signer: Arc<dyn TransactionSigner>,
}

impl JupiterVenue {
    pub fn new(
        config: JupiterVenueConfig,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self, VenueError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VenueError::Connectivity {
                venue: "jupiter".to_string(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            config,
            http,
            signer,
        })
    }

    fn connectivity(&self, message: impl Into<String>) -> VenueError {
        VenueError::Connectivity {
            venue: self.name().to_string(),
            message: message.into(),
        }
    }

    fn rejected(&self, reason: impl Into<String>) -> VenueError {
        VenueError::Rejected {
            venue: self.name().to_string(),
            reason: reason.into(),
        }
    }

    /// Fresh routing quote for the order, kept as raw JSON because the swap
    /// endpoint wants it echoed back verbatim.
    async fn fetch_quote_response(
        &self,
        order: &TradeOrder,
    ) -> Result<serde_json::Value, VenueError> {
        let (input_mint, output_mint) = order
            .swap_legs()
            .map_err(|e| self.rejected(e.to_string()))?;
        let url = format!("{}/quote", self.config.swap_api_url);

        let mut req = self.http.get(&url).query(&[
            ("inputMint", input_mint),
            ("outputMint", output_mint),
            ("amount", &order.amount.to_string()),
            ("slippageBps", &order.slippage_bps.to_string()),
        ]);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| self.connectivity(e.to_string()))?;
        self.read_json(response).await
    }

    async fn build_swap_transaction(
        &self,
        quote_response: serde_json::Value,
    ) -> Result<String, VenueError> {
        let url = format!("{}/swap", self.config.swap_api_url);
        let body = SwapRequest {
            user_public_key: self.config.user_public_key.clone(),
            quote_response,
            dynamic_compute_unit_limit: true,
        };

        let mut req = self.http.post(&url).json(&body);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| self.connectivity(e.to_string()))?;
        let swap: SwapResponse = self.read_json(response).await?;
        Ok(swap.swap_transaction)
    }

    /// Classify the HTTP status, then deserialize. 429 and 5xx are transient;
    /// other non-success statuses are venue rejections.
    async fn read_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, VenueError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(self.connectivity(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.rejected(format!("HTTP {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| self.rejected(format!("failed to parse response: {e}")))
    }
}

#[async_trait]
impl Venue for JupiterVenue {
    fn name(&self) -> &str {
        "jupiter"
    }

    async fn submit_swap(
        &self,
        order: &TradeOrder,
        quoted_price: f64,
    ) -> Result<String, VenueError> {
        tracing::debug!(
            "Building swap for order {} ({} {} @ {})",
            order.id,
            order.amount,
            order.pair,
            quoted_price
        );
        let quote_response = self.fetch_quote_response(order).await?;
        let transaction = self.build_swap_transaction(quote_response).await?;
        self.signer.sign_and_submit(&transaction).await
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<VenueTxStatus, VenueError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getSignatureStatuses",
            "params": [[tx_id], {"searchTransactionHistory": true}],
        });

        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.connectivity(e.to_string()))?;
        let payload: serde_json::Value = self.read_json(response).await?;

        let entry = &payload["result"]["value"][0];
        if entry.is_null() {
            return Ok(VenueTxStatus::Pending);
        }
        if !entry["err"].is_null() {
            return Ok(VenueTxStatus::Failed(entry["err"].to_string()));
        }
        match entry["confirmationStatus"].as_str() {
            Some("confirmed") | Some("finalized") => Ok(VenueTxStatus::Confirmed),
            _ => Ok(VenueTxStatus::Pending),
        }
    }
}
