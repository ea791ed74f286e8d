//! Venue Port
//!
//! Trait boundary for swap submission and confirmation against a DEX venue,
//! plus the opaque signing capability. The executor never sees transaction
//! bytes; it hands an order to the venue and gets back a transaction id to
//! poll.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::order::TradeOrder;

#[derive(Debug, Error, Clone)]
pub enum VenueError {
    /// Transient network/timeout failure - retried by the executor
    #[error("connectivity error from venue {venue}: {message}")]
    Connectivity { venue: String, message: String },

    /// Venue rejected the swap outright - never retried
    #[error("venue {venue} rejected the swap: {reason}")]
    Rejected { venue: String, reason: String },

    /// The signing capability failed
    #[error("signing failed: {0}")]
    Signing(String),
}

impl VenueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Connectivity { .. })
    }
}

/// Confirmation state of a submitted transaction as the venue reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueTxStatus {
    Pending,
    Confirmed,
    Failed(String),
}

/// A DEX venue capable of executing swaps and reporting on them
#[async_trait]
pub trait Venue: Send + Sync {
    /// Stable name used for rate-limit buckets and circuit breakers
    fn name(&self) -> &str;

    /// Submit a swap for the order at the authorized price. Returns the
    /// venue's transaction id on acceptance.
    async fn submit_swap(&self, order: &TradeOrder, quoted_price: f64)
        -> Result<String, VenueError>;

    /// Report the confirmation state of a previously submitted transaction
    async fn transaction_status(&self, tx_id: &str) -> Result<VenueTxStatus, VenueError>;
}

/// Opaque wallet/signing capability: given swap instructions (a serialized
/// unsigned transaction), sign it and submit it, returning the transaction
/// id. Key management lives entirely behind this trait.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_and_submit(&self, transaction: &str) -> Result<String, VenueError>;
}
