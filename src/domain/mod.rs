//! Domain Layer - Core resilience primitives
//!
//! Pure domain types and logic with no external dependencies. All network
//! interactions happen through the ports layer; these modules only decide
//! whether a call may proceed and how its outcome is tracked.

pub mod circuit_breaker;
pub mod order;
pub mod profit_taker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{
    BreakerError, BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker,
};
pub use order::{OrderError, OrderStatus, Side, TradeOrder};
pub use profit_taker::{
    default_tiers, ProfitTakerError, ProfitTakingState, ProfitTier, SellDecision,
    StagedProfitTaker,
};
pub use rate_limiter::{RateLimitError, RateLimiter};
pub use retry::RetryPolicy;
