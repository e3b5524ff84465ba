//! Stop-loss levels, position sizing, and allocation normalization

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::common::errors::{EngineError, Result};
use crate::common::types::Side;
use crate::config::types::RiskParameters;

/// Risk output computed for one prospective entry.
///
/// `computed_at` carries the bar timestamp the figures were derived from, so
/// the strategy can refuse to build an order from stale figures.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskFigures {
    pub stop_loss: Decimal,
    pub max_quantity: Decimal,
    pub computed_at: DateTime<Utc>,
}

/// Pure risk arithmetic over the configured parameters
#[derive(Debug, Clone)]
pub struct RiskManager {
    params: RiskParameters,
}

impl RiskManager {
    pub fn new(params: RiskParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    /// Stop-loss level for an entry at `price`.
    ///
    /// Side-aware: a long stop sits below the entry, a short stop above it.
    pub fn stop_loss(&self, price: Decimal, pct: Decimal, side: Side) -> Decimal {
        match side {
            Side::Long | Side::ExitLong => price * (Decimal::ONE - pct),
            Side::Short | Side::ExitShort => price * (Decimal::ONE + pct),
        }
    }

    /// Maximum position size for the given balance and stop distance.
    ///
    /// risk amount = balance x max_risk_pct; per-unit risk = |entry - stop|;
    /// the quotient is floored to the instrument's quantity increment. A stop
    /// equal to the entry has no per-unit risk to divide by and fails with
    /// `InsufficientRiskBudget`.
    pub fn max_position_size(
        &self,
        account_balance: Decimal,
        max_risk_pct: Decimal,
        stop_loss_price: Decimal,
        entry_price: Decimal,
    ) -> Result<Decimal> {
        let per_unit_risk = (entry_price - stop_loss_price).abs();
        if per_unit_risk.is_zero() {
            return Err(EngineError::InsufficientRiskBudget);
        }

        let risk_amount = account_balance * max_risk_pct;
        let quantity = risk_amount / per_unit_risk;
        Ok(self.floor_to_step(quantity))
    }

    /// Stop and size for an entry, computed together so the strategy can
    /// stamp them with the originating bar's timestamp
    pub fn entry_figures(
        &self,
        account_balance: Decimal,
        entry_price: Decimal,
        side: Side,
        bar_timestamp: DateTime<Utc>,
    ) -> Result<RiskFigures> {
        let stop_loss = self.stop_loss(entry_price, self.params.stop_loss_pct, side);
        let max_quantity = self.max_position_size(
            account_balance,
            self.params.max_risk_pct,
            stop_loss,
            entry_price,
        )?;

        Ok(RiskFigures {
            stop_loss,
            max_quantity,
            computed_at: bar_timestamp,
        })
    }

    /// Normalize target allocation weights.
    ///
    /// Weights must be non-negative with a positive total; the result sums
    /// to 1. Pure: the portfolio itself is only ever mutated by fills.
    pub fn allocate(
        &self,
        weights: &HashMap<String, Decimal>,
    ) -> Result<HashMap<String, Decimal>> {
        let mut total = Decimal::ZERO;
        for (symbol, weight) in weights {
            if *weight < Decimal::ZERO {
                return Err(EngineError::InvalidAllocation(format!(
                    "negative weight {} for {}",
                    weight, symbol
                )));
            }
            total += *weight;
        }
        if total <= Decimal::ZERO {
            return Err(EngineError::InvalidAllocation(
                "weights must sum to a positive total".to_string(),
            ));
        }

        Ok(weights
            .iter()
            .map(|(symbol, weight)| (symbol.clone(), *weight / total))
            .collect())
    }

    fn floor_to_step(&self, quantity: Decimal) -> Decimal {
        let step = self.params.qty_step;
        (quantity / step).floor() * step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn manager() -> RiskManager {
        RiskManager::new(RiskParameters {
            stop_loss_pct: dec!(0.05),
            max_risk_pct: dec!(0.1),
            qty_step: dec!(0.01),
        })
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn long_stop_sits_below_entry() {
        let stop = manager().stop_loss(dec!(150), dec!(0.05), Side::Long);
        assert_eq!(stop, dec!(142.50));
    }

    #[test]
    fn short_stop_sits_above_entry() {
        let stop = manager().stop_loss(dec!(150), dec!(0.05), Side::Short);
        assert_eq!(stop, dec!(157.50));
    }

    #[test]
    fn position_size_matches_canonical_scenario() {
        // 10000 balance, 10% risk, entry 150, stop 142.5:
        // 1000 / 7.5 = 133.33... floored to the 0.01 step
        let quantity = manager()
            .max_position_size(dec!(10000), dec!(0.1), dec!(142.5), dec!(150))
            .unwrap();
        assert_eq!(quantity, dec!(133.33));
    }

    #[test]
    fn risked_amount_never_exceeds_budget() {
        let manager = manager();
        let cases = [
            (dec!(10000), dec!(0.1), dec!(142.5), dec!(150)),
            (dec!(5000), dec!(0.02), dec!(99), dec!(100)),
            (dec!(250), dec!(0.5), dec!(110), dec!(100)),
        ];
        for (balance, risk_pct, stop, entry) in cases {
            let quantity = manager
                .max_position_size(balance, risk_pct, stop, entry)
                .unwrap();
            let risked = quantity * (entry - stop).abs();
            assert!(
                risked <= balance * risk_pct,
                "risked {} exceeds budget {}",
                risked,
                balance * risk_pct
            );
        }
    }

    #[test]
    fn stop_equal_to_entry_is_insufficient_budget() {
        let result = manager().max_position_size(dec!(10000), dec!(0.1), dec!(150), dec!(150));
        assert!(matches!(result, Err(EngineError::InsufficientRiskBudget)));
    }

    #[test]
    fn entry_figures_stamp_the_bar_timestamp() {
        let figures = manager()
            .entry_figures(dec!(10000), dec!(150), Side::Long, ts())
            .unwrap();
        assert_eq!(figures.stop_loss, dec!(142.50));
        assert_eq!(figures.max_quantity, dec!(133.33));
        assert_eq!(figures.computed_at, ts());
    }

    #[test]
    fn allocation_normalizes_to_one() {
        let weights = HashMap::from([
            ("BTCUSDT".to_string(), dec!(3)),
            ("ETHUSDT".to_string(), dec!(1)),
        ]);
        let allocation = manager().allocate(&weights).unwrap();
        assert_eq!(allocation["BTCUSDT"], dec!(0.75));
        assert_eq!(allocation["ETHUSDT"], dec!(0.25));

        let total: Decimal = allocation.values().copied().sum();
        assert_eq!(total, dec!(1));
    }

    #[test]
    fn negative_weight_is_invalid() {
        let weights = HashMap::from([
            ("BTCUSDT".to_string(), dec!(2)),
            ("ETHUSDT".to_string(), dec!(-1)),
        ]);
        assert!(matches!(
            manager().allocate(&weights),
            Err(EngineError::InvalidAllocation(_))
        ));
    }

    #[test]
    fn zero_total_is_invalid() {
        let weights = HashMap::from([("BTCUSDT".to_string(), dec!(0))]);
        assert!(matches!(
            manager().allocate(&weights),
            Err(EngineError::InvalidAllocation(_))
        ));
    }
}
