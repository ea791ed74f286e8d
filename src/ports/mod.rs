//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Price quote sources (primary routing API, validation market data)
//! - Swap submission and confirmation against a DEX venue
//! - The wallet/signing capability

pub mod mocks;
pub mod price_source;
pub mod venue;

pub use price_source::{PriceSource, Quote, SourceError};
pub use venue::{TransactionSigner, Venue, VenueError, VenueTxStatus};
