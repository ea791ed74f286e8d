//! Staged Profit Taker
//!
//! Tracks, per open position, which profit tiers have already been realized
//! and emits at most one partial-exit amount per evaluation. Tiers are
//! checked highest multiple first; a price that jumps across several
//! thresholds in one step realizes only the highest newly-crossed tier on
//! that call, bounding the worst-case sell size per evaluation.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default tier table: 20% at 5x, 25% at 3x, 20% at 2x of the original size
pub fn default_tiers() -> Vec<ProfitTier> {
    vec![
        ProfitTier { multiple: 5.0, sell_fraction: 0.20 },
        ProfitTier { multiple: 3.0, sell_fraction: 0.25 },
        ProfitTier { multiple: 2.0, sell_fraction: 0.20 },
    ]
}

#[derive(Debug, Error)]
pub enum ProfitTakerError {
    #[error("tier table is empty")]
    EmptyTiers,

    #[error("tier multiple {0} must be > 1.0")]
    InvalidMultiple(f64),

    #[error("tier sell fraction {0} must be in (0, 1]")]
    InvalidFraction(f64),

    #[error("tier fractions sum to {0:.2}, must not exceed 1.0")]
    FractionsExceedPosition(f64),

    #[error("invalid evaluation inputs: entry price {entry_price}, position size {position_size}")]
    InvalidInputs { entry_price: f64, position_size: f64 },
}

/// One profit-taking tier: sell `sell_fraction` of the original position
/// once price reaches `multiple` times the entry price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfitTier {
    pub multiple: f64,
    pub sell_fraction: f64,
}

/// Per-position tracking state. Created lazily on first evaluation, removed
/// by `reset_state` when a position closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitTakingState {
    pub position_id: String,
    /// Parallel to the tier table (highest multiple first); each flag flips
    /// false -> true at most once.
    pub triggered: Vec<bool>,
    pub total_sold: f64,
    pub remaining_position: f64,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum SellDecision {
    Sell { amount: f64, tier_multiple: f64 },
    NoAction,
}

impl SellDecision {
    pub fn amount(&self) -> f64 {
        match self {
            SellDecision::Sell { amount, .. } => *amount,
            SellDecision::NoAction => 0.0,
        }
    }
}

/// State machine for staged partial exits, keyed by position id
#[derive(Debug)]
pub struct StagedProfitTaker {
    /// Tier table sorted by multiple, highest first
    tiers: Vec<ProfitTier>,
    states: HashMap<String, ProfitTakingState>,
}

impl StagedProfitTaker {
    pub fn new() -> Self {
        let mut tiers = default_tiers();
        tiers.sort_by(|a, b| b.multiple.total_cmp(&a.multiple));
        Self {
            tiers,
            states: HashMap::new(),
        }
    }

    pub fn with_tiers(mut tiers: Vec<ProfitTier>) -> Result<Self, ProfitTakerError> {
        if tiers.is_empty() {
            return Err(ProfitTakerError::EmptyTiers);
        }
        let mut fraction_sum = 0.0;
        for tier in &tiers {
            if tier.multiple <= 1.0 {
                return Err(ProfitTakerError::InvalidMultiple(tier.multiple));
            }
            if tier.sell_fraction <= 0.0 || tier.sell_fraction > 1.0 {
                return Err(ProfitTakerError::InvalidFraction(tier.sell_fraction));
            }
            fraction_sum += tier.sell_fraction;
        }
        if fraction_sum > 1.0 + 1e-9 {
            return Err(ProfitTakerError::FractionsExceedPosition(fraction_sum));
        }

        tiers.sort_by(|a, b| b.multiple.total_cmp(&a.multiple));
        Ok(Self {
            tiers,
            states: HashMap::new(),
        })
    }

    pub fn tiers(&self) -> &[ProfitTier] {
        &self.tiers
    }

    /// Evaluate one position against the tier table.
    ///
    /// Sell amounts are fractions of the ORIGINAL position size, capped by
    /// whatever is still unsold. At most one tier fires per call.
    pub fn calculate_sell_amount(
        &mut self,
        position_id: &str,
        entry_price: f64,
        current_price: f64,
        position_size: f64,
    ) -> Result<SellDecision, ProfitTakerError> {
        if entry_price <= 0.0 || position_size <= 0.0 {
            return Err(ProfitTakerError::InvalidInputs {
                entry_price,
                position_size,
            });
        }

        let tier_count = self.tiers.len();
        let state = self
            .states
            .entry(position_id.to_string())
            .or_insert_with(|| ProfitTakingState {
                position_id: position_id.to_string(),
                triggered: vec![false; tier_count],
                total_sold: 0.0,
                remaining_position: position_size,
            });

        if state.total_sold >= position_size {
            return Ok(SellDecision::NoAction);
        }

        let multiple = current_price / entry_price;

        for (idx, tier) in self.tiers.iter().enumerate() {
            if state.triggered[idx] || multiple < tier.multiple {
                continue;
            }

            let remaining = position_size - state.total_sold;
            let amount = (position_size * tier.sell_fraction).min(remaining);

            state.triggered[idx] = true;
            state.total_sold += amount;
            state.remaining_position = position_size - state.total_sold;

            tracing::info!(
                "Position {} hit {}x tier: selling {:.4} ({:.4} remaining)",
                position_id,
                tier.multiple,
                amount,
                state.remaining_position
            );

            return Ok(SellDecision::Sell {
                amount,
                tier_multiple: tier.multiple,
            });
        }

        Ok(SellDecision::NoAction)
    }

    /// Snapshot of a position's tracking state, if it exists
    pub fn state(&self, position_id: &str) -> Option<&ProfitTakingState> {
        self.states.get(position_id)
    }

    /// Drop all tracking for a closed or reopened position
    pub fn reset_state(&mut self, position_id: &str) {
        if self.states.remove(position_id).is_some() {
            tracing::debug!("Profit taking state reset for position {}", position_id);
        }
    }
}

impl Default for StagedProfitTaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_staged_exit_walk() {
        let mut taker = StagedProfitTaker::new();

        // entry=100, size=1000: 2x sells 200, 3x sells 250, 5x sells 200
        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 200.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::Sell { amount: 200.0, tier_multiple: 2.0 });

        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 300.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::Sell { amount: 250.0, tier_multiple: 3.0 });

        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 500.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::Sell { amount: 200.0, tier_multiple: 5.0 });

        let state = taker.state("pos-1").unwrap();
        assert_relative_eq!(state.total_sold, 650.0);
        assert_relative_eq!(state.remaining_position, 350.0);

        // All tiers realized: any further price returns no action
        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 10_000.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::NoAction);
    }

    #[test]
    fn test_one_tier_per_call_on_price_jump() {
        let mut taker = StagedProfitTaker::new();

        // Price jumped straight past 5x: only the 5x tier fires this call
        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 600.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::Sell { amount: 200.0, tier_multiple: 5.0 });

        // Next evaluation at the same price picks up the 3x tier
        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 600.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::Sell { amount: 250.0, tier_multiple: 3.0 });
    }

    #[test]
    fn test_below_all_tiers_no_action() {
        let mut taker = StagedProfitTaker::new();
        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 150.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::NoAction);
        // Lazily created state exists but nothing sold
        assert_relative_eq!(taker.state("pos-1").unwrap().total_sold, 0.0);
    }

    #[test]
    fn test_tier_fires_at_most_once() {
        let mut taker = StagedProfitTaker::new();
        taker
            .calculate_sell_amount("pos-1", 100.0, 200.0, 1000.0)
            .unwrap();
        // Same 2x price again: flag already set, no second sell
        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 200.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::NoAction);
    }

    #[test]
    fn test_reset_state_restores_flags() {
        let mut taker = StagedProfitTaker::new();
        taker
            .calculate_sell_amount("pos-1", 100.0, 500.0, 1000.0)
            .unwrap();
        assert!(taker.state("pos-1").is_some());

        taker.reset_state("pos-1");
        assert!(taker.state("pos-1").is_none());

        // After reset the tiers can fire again
        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 200.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::Sell { amount: 200.0, tier_multiple: 2.0 });
        assert_relative_eq!(taker.state("pos-1").unwrap().total_sold, 200.0);
    }

    #[test]
    fn test_sell_capped_by_remaining() {
        // An aggressive table where the last tier would overshoot
        let mut taker = StagedProfitTaker::with_tiers(vec![
            ProfitTier { multiple: 2.0, sell_fraction: 0.60 },
            ProfitTier { multiple: 3.0, sell_fraction: 0.40 },
        ])
        .unwrap();

        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 300.0, 1000.0)
            .unwrap();
        assert_eq!(d.amount(), 400.0);
        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 300.0, 1000.0)
            .unwrap();
        // 60% of original is 600, but only 600 remains; exact fit here,
        // total_sold never exceeds the position
        assert_eq!(d.amount(), 600.0);
        assert_relative_eq!(taker.state("pos-1").unwrap().total_sold, 1000.0);

        let d = taker
            .calculate_sell_amount("pos-1", 100.0, 300.0, 1000.0)
            .unwrap();
        assert_eq!(d, SellDecision::NoAction);
    }

    #[test]
    fn test_positions_tracked_independently() {
        let mut taker = StagedProfitTaker::new();
        taker
            .calculate_sell_amount("pos-1", 100.0, 200.0, 1000.0)
            .unwrap();

        let d = taker
            .calculate_sell_amount("pos-2", 50.0, 100.0, 400.0)
            .unwrap();
        assert_eq!(d, SellDecision::Sell { amount: 80.0, tier_multiple: 2.0 });
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut taker = StagedProfitTaker::new();
        assert!(taker
            .calculate_sell_amount("pos-1", 0.0, 100.0, 1000.0)
            .is_err());
        assert!(taker
            .calculate_sell_amount("pos-1", 100.0, 100.0, 0.0)
            .is_err());
    }

    #[test]
    fn test_invalid_tier_tables_rejected() {
        assert!(matches!(
            StagedProfitTaker::with_tiers(vec![]),
            Err(ProfitTakerError::EmptyTiers)
        ));
        assert!(matches!(
            StagedProfitTaker::with_tiers(vec![ProfitTier { multiple: 0.5, sell_fraction: 0.2 }]),
            Err(ProfitTakerError::InvalidMultiple(_))
        ));
        assert!(matches!(
            StagedProfitTaker::with_tiers(vec![ProfitTier { multiple: 2.0, sell_fraction: 1.5 }]),
            Err(ProfitTakerError::InvalidFraction(_))
        ));
        assert!(matches!(
            StagedProfitTaker::with_tiers(vec![
                ProfitTier { multiple: 2.0, sell_fraction: 0.8 },
                ProfitTier { multiple: 3.0, sell_fraction: 0.8 },
            ]),
            Err(ProfitTakerError::FractionsExceedPosition(_))
        ));
    }
}
