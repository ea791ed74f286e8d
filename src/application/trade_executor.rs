//! Trade Executor
//!
//! Drives the full lifecycle of a trade: validate the request, obtain a
//! cross-validated price, submit through the venue behind its rate limiter
//! and circuit breaker, then poll the venue until the transaction settles.
//! Order state lives here; callers get immutable snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::application::price_aggregator::{AggregatorError, PriceAggregator};
use crate::domain::circuit_breaker::{BreakerError, BreakerRegistry, BreakerSnapshot};
use crate::domain::order::{OrderError, OrderStatus, Side, TradeOrder};
use crate::domain::rate_limiter::{RateLimitError, RateLimiter};
use crate::domain::retry::RetryPolicy;
use crate::ports::venue::{Venue, VenueError, VenueTxStatus};

pub const DEFAULT_MIN_SLIPPAGE_BPS: u16 = 10;
pub const DEFAULT_MAX_SLIPPAGE_BPS: u16 = 500;
pub const DEFAULT_CONFIRM_ATTEMPTS: u32 = 10;
pub const DEFAULT_CONFIRM_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("invalid trade request: {0}")]
    Validation(String),

    #[error("no trustworthy price available: {0}")]
    PriceUnavailable(String),

    #[error("price divergence {diff:.4} at or above limit {limit:.4}, trade blocked")]
    Divergence { diff: f64, limit: f64 },

    #[error("venue '{venue}' circuit breaker open, retry in {retry_in:?}")]
    BreakerOpen { venue: String, retry_in: Duration },

    #[error("venue connectivity failure after {attempts} attempt(s): {message}")]
    Connectivity { attempts: u32, message: String },

    #[error("venue '{venue}' rejected the order: {reason}")]
    Rejected { venue: String, reason: String },

    #[error("order {order_id} unconfirmed after {attempts} poll(s)")]
    ExecutionTimeout { order_id: String, attempts: u32 },

    #[error("unknown order: {0}")]
    UnknownOrder(String),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub min_slippage_bps: u16,
    pub max_slippage_bps: u16,
    pub retry: RetryPolicy,
    pub confirm_attempts: u32,
    pub confirm_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_slippage_bps: DEFAULT_MIN_SLIPPAGE_BPS,
            max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BPS,
            retry: RetryPolicy::default(),
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
            confirm_interval: DEFAULT_CONFIRM_INTERVAL,
        }
    }
}

/// Point-in-time view of the executor's book and venue breakers
#[derive(Debug, Clone)]
pub struct ExecutorStatus {
    pub total_orders: usize,
    pub pending_orders: usize,
    pub breakers: Vec<BreakerSnapshot>,
}

pub struct TradeExecutor {
    aggregator: Arc<PriceAggregator>,
    venue: Arc<dyn Venue>,
    limiter: Arc<RateLimiter>,
    breakers: Arc<BreakerRegistry>,
    config: ExecutorConfig,
    orders: Mutex<HashMap<String, TradeOrder>>,
    next_order_id: AtomicU64,
}

impl TradeExecutor {
    pub fn new(
        aggregator: Arc<PriceAggregator>,
        venue: Arc<dyn Venue>,
        limiter: Arc<RateLimiter>,
        breakers: Arc<BreakerRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            aggregator,
            venue,
            limiter,
            breakers,
            config,
            orders: Mutex::new(HashMap::new()),
            next_order_id: AtomicU64::new(1),
        }
    }

    /// Validate, price, and submit a trade. On success the returned order is
    /// `Submitted` and carries the venue transaction id; call
    /// [`confirm_trade`](Self::confirm_trade) to wait for settlement.
    pub async fn execute_trade(
        &self,
        pair: &str,
        side: Side,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<TradeOrder, TradeError> {
        self.validate_request(pair, amount, slippage_bps)?;

        let (token_in, token_out) = crate::domain::order::swap_legs(pair, side)
            .map_err(|e| TradeError::Validation(e.to_string()))?;
        let quote = self
            .aggregator
            .get_aggregated_price(token_in, token_out, amount)
            .await
            .map_err(map_aggregator_error)?;

        if quote.fallback {
            tracing::warn!(
                "Executing '{}' on single-source price from '{}'",
                pair,
                quote.source
            );
        }

        let order_id = format!("ord-{}", self.next_order_id.fetch_add(1, Ordering::Relaxed));
        let mut order = TradeOrder::new(
            order_id.clone(),
            pair,
            side,
            amount,
            slippage_bps,
            self.venue.name(),
        );
        order.quoted_price = Some(quote.price);

        self.limiter.wait_for_token(self.venue.name(), 1.0).await?;

        let attempts = AtomicU32::new(0);
        let breaker = self.breakers.get(self.venue.name());
        let submit = self
            .config
            .retry
            .run(
                || {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    breaker.call(|| self.venue.submit_swap(&order, quote.price))
                },
                |e| matches!(e, BreakerError::Inner(inner) if inner.is_transient()),
            )
            .await;
        order.attempts = attempts.load(Ordering::Relaxed);

        match submit {
            Ok(tx_id) => {
                order.tx_id = Some(tx_id.clone());
                order.transition(OrderStatus::Submitted)?;
                tracing::info!(
                    "Order {} submitted to '{}' as {} ({} {} @ {})",
                    order.id,
                    order.venue,
                    tx_id,
                    order.amount,
                    order.pair,
                    quote.price
                );
                self.store(order.clone());
                Ok(order)
            }
            Err(e) => {
                let trade_err = map_submit_error(self.venue.name(), order.attempts, e);
                order.last_error = Some(trade_err.to_string());
                order.transition(OrderStatus::Failed)?;
                self.store(order);
                Err(trade_err)
            }
        }
    }

    /// Poll the venue until the order's transaction settles, up to
    /// `confirm_attempts` polls spaced `confirm_interval` apart. Calling on an
    /// already-terminal order returns its recorded state unchanged.
    pub async fn confirm_trade(&self, order_id: &str) -> Result<TradeOrder, TradeError> {
        let order = self
            .get_trade_status(order_id)
            .ok_or_else(|| TradeError::UnknownOrder(order_id.to_string()))?;

        if order.status.is_terminal() {
            return Ok(order);
        }
        let tx_id = order
            .tx_id
            .clone()
            .ok_or_else(|| TradeError::Validation(format!("order {order_id} has no transaction id")))?;

        for attempt in 1..=self.config.confirm_attempts {
            match self.venue.transaction_status(&tx_id).await {
                Ok(VenueTxStatus::Confirmed) => {
                    tracing::info!("Order {} confirmed after {} poll(s)", order_id, attempt);
                    return self.finish(order_id, OrderStatus::Confirmed, None);
                }
                Ok(VenueTxStatus::Failed(reason)) => {
                    tracing::warn!("Order {} failed on-venue: {}", order_id, reason);
                    self.finish(order_id, OrderStatus::Failed, Some(reason.clone()))?;
                    return Err(TradeError::Rejected {
                        venue: self.venue.name().to_string(),
                        reason,
                    });
                }
                Ok(VenueTxStatus::Pending) => {}
                Err(e) => {
                    // A status poll failing is not evidence the trade failed;
                    // keep polling until the attempt budget runs out.
                    tracing::warn!("Status poll {} for order {} failed: {}", attempt, order_id, e);
                }
            }
            if attempt < self.config.confirm_attempts {
                tokio::time::sleep(self.config.confirm_interval).await;
            }
        }

        self.finish(
            order_id,
            OrderStatus::Expired,
            Some("confirmation window elapsed".to_string()),
        )?;
        Err(TradeError::ExecutionTimeout {
            order_id: order_id.to_string(),
            attempts: self.config.confirm_attempts,
        })
    }

    /// Snapshot of an order's current state
    pub fn get_trade_status(&self, order_id: &str) -> Option<TradeOrder> {
        self.orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(order_id)
            .cloned()
    }

    /// Snapshots of every order still awaiting settlement
    pub fn pending_orders(&self) -> Vec<TradeOrder> {
        self.orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Aggregate view of the executor plus the breakers it routes through
    pub fn status(&self) -> ExecutorStatus {
        let orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        let pending = orders.values().filter(|o| !o.status.is_terminal()).count();
        ExecutorStatus {
            total_orders: orders.len(),
            pending_orders: pending,
            breakers: self.breakers.snapshots(),
        }
    }

    fn validate_request(&self, pair: &str, amount: u64, slippage_bps: u16) -> Result<(), TradeError> {
        if pair.is_empty() {
            return Err(TradeError::Validation("pair must not be empty".to_string()));
        }
        if amount == 0 {
            return Err(TradeError::Validation("amount must be positive".to_string()));
        }
        if slippage_bps < self.config.min_slippage_bps || slippage_bps > self.config.max_slippage_bps
        {
            return Err(TradeError::Validation(format!(
                "slippage {} bps outside [{}, {}]",
                slippage_bps, self.config.min_slippage_bps, self.config.max_slippage_bps
            )));
        }
        Ok(())
    }

    fn store(&self, order: TradeOrder) {
        self.orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(order.id.clone(), order);
    }

    fn finish(
        &self,
        order_id: &str,
        status: OrderStatus,
        error: Option<String>,
    ) -> Result<TradeOrder, TradeError> {
        let mut orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| TradeError::UnknownOrder(order_id.to_string()))?;
        order.transition(status)?;
        if error.is_some() {
            order.last_error = error;
        }
        Ok(order.clone())
    }
}

fn map_aggregator_error(err: AggregatorError) -> TradeError {
    match err {
        AggregatorError::Divergence {
            price_diff,
            threshold,
            ..
        } => TradeError::Divergence {
            diff: price_diff,
            limit: threshold,
        },
        other => TradeError::PriceUnavailable(other.to_string()),
    }
}

fn map_submit_error(venue: &str, attempts: u32, err: BreakerError<VenueError>) -> TradeError {
    match err {
        BreakerError::Open { name, retry_in } => TradeError::BreakerOpen {
            venue: name,
            retry_in,
        },
        BreakerError::Inner(VenueError::Rejected { venue, reason }) => {
            TradeError::Rejected { venue, reason }
        }
        BreakerError::Inner(inner) => TradeError::Connectivity {
            attempts,
            message: format!("'{venue}': {inner}"),
        },
    }
}
