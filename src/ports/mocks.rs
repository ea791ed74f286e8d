//! Scripted mock implementations of the ports, shared by unit and
//! integration tests. Each mock records calls and plays back a configured
//! sequence of responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;

use crate::domain::order::TradeOrder;
use crate::ports::price_source::{PriceSource, Quote, SourceError};
use crate::ports::venue::{TransactionSigner, Venue, VenueError, VenueTxStatus};

/// Price source that plays back a script of prices/errors, then falls back
/// to a steady price (if set) once the script is exhausted.
pub struct MockPriceSource {
    name: String,
    script: Mutex<VecDeque<Result<f64, SourceError>>>,
    steady_price: Mutex<Option<f64>>,
    calls: AtomicU32,
}

impl MockPriceSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            steady_price: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    /// Source that always returns the same price
    pub fn steady(name: &str, price: f64) -> Self {
        let source = Self::new(name);
        *source.steady_price.lock().unwrap_or_else(|e| e.into_inner()) = Some(price);
        source
    }

    pub fn push_price(&self, price: f64) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(price));
        self
    }

    pub fn push_error(&self, error: SourceError) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    pub fn push_connectivity_error(&self) -> &Self {
        self.push_error(SourceError::Connectivity {
            origin: self.name.clone(),
            message: "connection refused".to_string(),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
    ) -> Result<Quote, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let price = match scripted {
            Some(result) => result?,
            None => {
                let steady = *self.steady_price.lock().unwrap_or_else(|e| e.into_inner());
                steady.ok_or_else(|| SourceError::NoData {
                    origin: self.name.clone(),
                    mint: input_mint.to_string(),
                })?
            }
        };

        Ok(Quote::new(
            &self.name,
            input_mint,
            output_mint,
            amount,
            (amount as f64 * price) as u64,
            price,
        ))
    }
}

/// Venue that plays back scripted submit results and status transitions.
/// Once the status script drains, the last status repeats (a confirmed
/// transaction stays confirmed).
pub struct MockVenue {
    name: String,
    submit_script: Mutex<VecDeque<Result<String, VenueError>>>,
    status_script: Mutex<VecDeque<VenueTxStatus>>,
    last_status: Mutex<VenueTxStatus>,
    submit_calls: AtomicU32,
    status_calls: AtomicU32,
}

impl MockVenue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            submit_script: Mutex::new(VecDeque::new()),
            status_script: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(VenueTxStatus::Pending),
            submit_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
        }
    }

    pub fn push_submit_ok(&self, tx_id: &str) -> &Self {
        self.submit_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(tx_id.to_string()));
        self
    }

    pub fn push_submit_error(&self, error: VenueError) -> &Self {
        self.submit_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    pub fn push_connectivity_error(&self) -> &Self {
        self.push_submit_error(VenueError::Connectivity {
            venue: self.name.clone(),
            message: "connection reset".to_string(),
        })
    }

    pub fn push_status(&self, status: VenueTxStatus) -> &Self {
        self.status_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(status);
        self
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Venue for MockVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_swap(
        &self,
        _order: &TradeOrder,
        _quoted_price: f64,
    ) -> Result<String, VenueError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submit_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(VenueError::Rejected {
                    venue: self.name.clone(),
                    reason: "no scripted response".to_string(),
                })
            })
    }

    async fn transaction_status(&self, _tx_id: &str) -> Result<VenueTxStatus, VenueError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .status_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let mut last = self.last_status.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(status) = next {
            *last = status;
        }
        Ok(last.clone())
    }
}

/// Signer that accepts everything and derives the tx id from the payload
#[derive(Debug, Default)]
pub struct MockSigner;

#[async_trait]
impl TransactionSigner for MockSigner {
    async fn sign_and_submit(&self, transaction: &str) -> Result<String, VenueError> {
        Ok(format!("sig-{}", transaction.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_source_script_then_steady() {
        let source = MockPriceSource::steady("mock", 100.0);
        source.push_price(95.0);

        let quote = source.fetch_quote("SOL", "USDC", 1_000).await.unwrap();
        assert_eq!(quote.price, 95.0);

        let quote = source.fetch_quote("SOL", "USDC", 1_000).await.unwrap();
        assert_eq!(quote.price, 100.0);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_venue_status_repeats_last() {
        let venue = MockVenue::new("mock");
        venue.push_status(VenueTxStatus::Pending);
        venue.push_status(VenueTxStatus::Confirmed);

        assert_eq!(
            venue.transaction_status("tx").await.unwrap(),
            VenueTxStatus::Pending
        );
        assert_eq!(
            venue.transaction_status("tx").await.unwrap(),
            VenueTxStatus::Confirmed
        );
        // Script drained: confirmed stays confirmed
        assert_eq!(
            venue.transaction_status("tx").await.unwrap(),
            VenueTxStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_mock_signer_derives_id_from_payload() {
        let signer = MockSigner;
        let sig = signer.sign_and_submit("AAAA").await.unwrap();
        assert_eq!(sig, "sig-4");
    }
}
