//! Portfolio state: cash, positions, and realized PnL

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::common::errors::Result;
use crate::common::types::{Fill, Side};

/// Current position in a symbol.
///
/// Positive quantity = long, negative = short.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
}

/// Account state shared across symbol workers.
///
/// Mutated only through `apply_fill`; every mutation path goes through the
/// orchestrator's single lock, so equity is never observed mid-update. Fills
/// are idempotent by order id.
#[derive(Debug, Clone)]
pub struct Portfolio {
    cash: Decimal,
    positions: HashMap<String, Position>,
    realized_pnl: Decimal,
    applied_orders: HashSet<String>,
}

impl Portfolio {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            positions: HashMap::new(),
            realized_pnl: Decimal::ZERO,
            applied_orders: HashSet::new(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Signed quantity held in a symbol (zero when flat)
    pub fn position_quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Apply a fill exactly once.
    ///
    /// Returns `Ok(false)` for a duplicate order id (the fill is ignored).
    /// Cash moves by quantity x price; entries build the position at a
    /// volume-weighted average entry price, exits realize PnL against it.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<bool> {
        if !self.applied_orders.insert(fill.order_id.clone()) {
            warn!("Ignoring duplicate fill for order {}", fill.order_id);
            return Ok(false);
        }

        let notional = fill.quantity * fill.price;
        match fill.side {
            Side::Long => {
                self.cash -= notional;
                self.add_to_position(&fill.symbol, fill.quantity, fill.price);
            }
            Side::Short => {
                self.cash += notional;
                self.add_to_position(&fill.symbol, -fill.quantity, fill.price);
            }
            Side::ExitLong => {
                self.cash += notional;
                self.close_from_position(&fill.symbol, fill.quantity, fill.price, Side::ExitLong);
            }
            Side::ExitShort => {
                self.cash -= notional;
                self.close_from_position(&fill.symbol, fill.quantity, fill.price, Side::ExitShort);
            }
        }

        debug!(
            "Applied fill {} ({} {} {} @ {}); cash {}",
            fill.order_id, fill.side, fill.quantity, fill.symbol, fill.price, self.cash
        );
        Ok(true)
    }

    /// Total equity: cash plus positions marked at the given prices.
    ///
    /// Positions without a mark are valued at their entry price.
    pub fn equity(&self, marks: &HashMap<String, Decimal>) -> Decimal {
        let position_value: Decimal = self
            .positions
            .iter()
            .map(|(symbol, position)| {
                let mark = marks
                    .get(symbol)
                    .copied()
                    .unwrap_or(position.avg_entry_price);
                position.quantity * mark
            })
            .sum();
        self.cash + position_value
    }

    fn add_to_position(&mut self, symbol: &str, delta: Decimal, price: Decimal) {
        let entry = self
            .positions
            .entry(symbol.to_string())
            .or_insert(Position {
                quantity: Decimal::ZERO,
                avg_entry_price: Decimal::ZERO,
            });

        let old_abs = entry.quantity.abs();
        let new_quantity = entry.quantity + delta;
        let new_abs = new_quantity.abs();

        // Weighted average entry over the absolute size
        entry.avg_entry_price = if new_abs.is_zero() {
            Decimal::ZERO
        } else {
            (entry.avg_entry_price * old_abs + price * delta.abs()) / new_abs
        };
        entry.quantity = new_quantity;
    }

    fn close_from_position(&mut self, symbol: &str, quantity: Decimal, price: Decimal, side: Side) {
        let Some(position) = self.positions.get_mut(symbol) else {
            warn!("Exit fill for {} with no open position", symbol);
            return;
        };

        let pnl = match side {
            Side::ExitLong => quantity * (price - position.avg_entry_price),
            Side::ExitShort => quantity * (position.avg_entry_price - price),
            _ => unreachable!("close_from_position called with entry side"),
        };
        self.realized_pnl += pnl;

        position.quantity = match side {
            Side::ExitLong => position.quantity - quantity,
            Side::ExitShort => position.quantity + quantity,
            _ => unreachable!(),
        };
        if position.quantity.is_zero() {
            self.positions.remove(symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn fill(order_id: &str, side: Side, quantity: Decimal, price: Decimal) -> Fill {
        Fill {
            order_id: order_id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side,
            quantity,
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn marks(price: Decimal) -> HashMap<String, Decimal> {
        HashMap::from([("BTCUSDT".to_string(), price)])
    }

    #[test]
    fn long_entry_moves_cash_into_the_position() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio
            .apply_fill(&fill("a-1", Side::Long, dec!(10), dec!(100)))
            .unwrap();

        assert_eq!(portfolio.cash(), dec!(9000));
        assert_eq!(portfolio.position_quantity("BTCUSDT"), dec!(10));
        assert_eq!(
            portfolio.position("BTCUSDT").unwrap().avg_entry_price,
            dec!(100)
        );
    }

    #[test]
    fn equity_is_invariant_across_a_fill() {
        let mut portfolio = Portfolio::new(dec!(10000));
        let before = portfolio.equity(&marks(dec!(100)));

        portfolio
            .apply_fill(&fill("a-1", Side::Long, dec!(10), dec!(100)))
            .unwrap();
        let after = portfolio.equity(&marks(dec!(100)));
        assert_eq!(before, after);

        // Same invariant through a short entry and an exit
        portfolio
            .apply_fill(&fill("a-2", Side::ExitLong, dec!(10), dec!(100)))
            .unwrap();
        assert_eq!(portfolio.equity(&marks(dec!(100))), dec!(10000));
    }

    #[test]
    fn round_trip_realizes_pnl() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio
            .apply_fill(&fill("a-1", Side::Long, dec!(10), dec!(100)))
            .unwrap();
        portfolio
            .apply_fill(&fill("a-2", Side::ExitLong, dec!(10), dec!(110)))
            .unwrap();

        assert_eq!(portfolio.cash(), dec!(10100));
        assert_eq!(portfolio.realized_pnl(), dec!(100));
        assert_eq!(portfolio.position_count(), 0);
    }

    #[test]
    fn short_round_trip_realizes_inverse_pnl() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio
            .apply_fill(&fill("a-1", Side::Short, dec!(10), dec!(100)))
            .unwrap();
        assert_eq!(portfolio.position_quantity("BTCUSDT"), dec!(-10));

        portfolio
            .apply_fill(&fill("a-2", Side::ExitShort, dec!(10), dec!(90)))
            .unwrap();
        assert_eq!(portfolio.realized_pnl(), dec!(100));
        assert_eq!(portfolio.cash(), dec!(10100));
        assert_eq!(portfolio.position_count(), 0);
    }

    #[test]
    fn duplicate_order_ids_are_ignored() {
        let mut portfolio = Portfolio::new(dec!(10000));
        let f = fill("a-1", Side::Long, dec!(10), dec!(100));
        assert!(portfolio.apply_fill(&f).unwrap());
        assert!(!portfolio.apply_fill(&f).unwrap());

        assert_eq!(portfolio.cash(), dec!(9000));
        assert_eq!(portfolio.position_quantity("BTCUSDT"), dec!(10));
    }

    #[test]
    fn scaling_in_averages_the_entry_price() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio
            .apply_fill(&fill("a-1", Side::Long, dec!(10), dec!(100)))
            .unwrap();
        portfolio
            .apply_fill(&fill("a-2", Side::Long, dec!(10), dec!(110)))
            .unwrap();

        let position = portfolio.position("BTCUSDT").unwrap();
        assert_eq!(position.quantity, dec!(20));
        assert_eq!(position.avg_entry_price, dec!(105));
    }

    #[test]
    fn unmarked_positions_value_at_entry() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio
            .apply_fill(&fill("a-1", Side::Long, dec!(10), dec!(100)))
            .unwrap();
        assert_eq!(portfolio.equity(&HashMap::new()), dec!(10000));
    }
}
