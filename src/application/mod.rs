//! Application layer: orchestration over the domain components and ports

pub mod price_aggregator;
pub mod trade_executor;

pub use price_aggregator::{AggregatedPrice, AggregatorConfig, AggregatorError, PriceAggregator};
pub use trade_executor::{ExecutorConfig, ExecutorStatus, TradeError, TradeExecutor};
