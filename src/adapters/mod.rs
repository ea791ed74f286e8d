//! Adapters Layer - External System Implementations
//!
//! Implementations of the port traits:
//! - Jupiter: DEX aggregator quote client (primary price source)
//! - DexScreener: on-chain pool index (validation price source)
//! - Venue: Jupiter swap building and settlement polling
//! - CLI: command-line interface definitions

pub mod cli;
pub mod dexscreener;
pub mod jupiter;
pub mod venue;

pub use cli::CliApp;
pub use dexscreener::{DexScreenerConfig, DexScreenerSource};
pub use jupiter::{JupiterConfig, JupiterPriceSource};
pub use venue::{JupiterVenue, JupiterVenueConfig};
