//! Trade Orders
//!
//! Order lifecycle owned by the trade executor. Status transitions are
//! enforced here: terminal orders (Confirmed/Failed/Expired) are immutable,
//! so repeated status polls can never corrupt a finished trade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Failed | OrderStatus::Expired
        )
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {id} is terminal ({status:?}) and cannot transition to {attempted:?}")]
    TerminalTransition {
        id: String,
        status: OrderStatus,
        attempted: OrderStatus,
    },

    #[error("order {id} cannot move {from:?} -> {to:?}")]
    InvalidTransition {
        id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("malformed pair '{0}', expected BASE/QUOTE")]
    MalformedPair(String),
}

/// Input and output tokens for a swap: buys spend the quote asset, sells
/// spend the base asset.
pub fn swap_legs(pair: &str, side: Side) -> Result<(&str, &str), OrderError> {
    let (base, quote) = pair
        .split_once('/')
        .ok_or_else(|| OrderError::MalformedPair(pair.to_string()))?;
    if base.is_empty() || quote.is_empty() {
        return Err(OrderError::MalformedPair(pair.to_string()));
    }
    Ok(match side {
        Side::Buy => (quote, base),
        Side::Sell => (base, quote),
    })
}

/// A swap order in flight against a DEX venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOrder {
    pub id: String,
    /// Trading pair symbol, e.g. "SOL/USDC"
    pub pair: String,
    pub side: Side,
    /// Amount in base units of the input token
    pub amount: u64,
    pub slippage_bps: u16,
    pub venue: String,
    pub status: OrderStatus,
    /// Submission attempts made so far
    pub attempts: u32,
    /// Last error seen on this order, preserved through terminal transitions
    pub last_error: Option<String>,
    /// Transaction id returned by the venue after submission
    pub tx_id: Option<String>,
    /// Price the trade was authorized at
    pub quoted_price: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl TradeOrder {
    pub fn new(
        id: impl Into<String>,
        pair: impl Into<String>,
        side: Side,
        amount: u64,
        slippage_bps: u16,
        venue: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            pair: pair.into(),
            side,
            amount,
            slippage_bps,
            venue: venue.into(),
            status: OrderStatus::Pending,
            attempts: 0,
            last_error: None,
            tx_id: None,
            quoted_price: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Input and output tokens this order swaps between
    pub fn swap_legs(&self) -> Result<(&str, &str), OrderError> {
        swap_legs(&self.pair, self.side)
    }

    /// Move the order to a new status, enforcing terminal immutability and
    /// the pending -> submitted -> terminal lifecycle.
    pub fn transition(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::TerminalTransition {
                id: self.id.clone(),
                status: self.status,
                attempted: to,
            });
        }

        let allowed = matches!(
            (self.status, to),
            (OrderStatus::Pending, OrderStatus::Submitted)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Submitted, OrderStatus::Confirmed)
                | (OrderStatus::Submitted, OrderStatus::Failed)
                | (OrderStatus::Submitted, OrderStatus::Expired)
        );

        if !allowed {
            return Err(OrderError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }

        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> TradeOrder {
        TradeOrder::new("ord-1", "SOL/USDC", Side::Buy, 1_000_000_000, 50, "jupiter")
    }

    #[test]
    fn test_new_order_is_pending() {
        let order = order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.attempts, 0);
        assert!(!order.is_terminal());
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut order = order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Confirmed).unwrap();
        assert!(order.is_terminal());
    }

    #[test]
    fn test_terminal_orders_are_immutable() {
        let mut order = order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Confirmed).unwrap();

        let result = order.transition(OrderStatus::Failed);
        assert!(matches!(result, Err(OrderError::TerminalTransition { .. })));
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[test]
    fn test_pending_cannot_confirm_directly() {
        let mut order = order();
        let result = order.transition(OrderStatus::Confirmed);
        assert!(matches!(result, Err(OrderError::InvalidTransition { .. })));
    }

    #[test]
    fn test_submitted_can_expire() {
        let mut order = order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Expired).unwrap();
        assert!(order.is_terminal());
    }

    #[test]
    fn test_pending_can_fail() {
        let mut order = order();
        order.transition(OrderStatus::Failed).unwrap();
        assert!(order.is_terminal());
    }

    #[test]
    fn test_swap_legs_follow_side() {
        assert_eq!(swap_legs("SOL/USDC", Side::Buy).unwrap(), ("USDC", "SOL"));
        assert_eq!(swap_legs("SOL/USDC", Side::Sell).unwrap(), ("SOL", "USDC"));
        assert!(matches!(
            swap_legs("SOLUSDC", Side::Buy),
            Err(OrderError::MalformedPair(_))
        ));
        assert!(matches!(
            swap_legs("/USDC", Side::Buy),
            Err(OrderError::MalformedPair(_))
        ));
    }
}
