//! Sentinel - Resilient DEX Trade Execution Core
//!
//! Layered protections for automated trading against external venues:
//! rate limiting, circuit breaking, cross-source price validation, and a
//! staged profit-taking ladder.
//!
//! # Modules
//!
//! - `domain`: Core components (RateLimiter, CircuitBreaker, TradeOrder, StagedProfitTaker)
//! - `ports`: Trait abstractions (PriceSource, Venue, TransactionSigner)
//! - `workers`: Background machinery (TaskQueue, BatchProcessor)
//! - `adapters`: External implementations (Jupiter, DexScreener, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: PriceAggregator and TradeExecutor

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod workers;
