//! Strategy state types

use rust_decimal::Decimal;

/// Position state for one symbol's strategy.
///
/// Entries carry the stop computed at signal time; the exit transitions key
/// off it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat,
    Long { stop: Decimal },
    Short { stop: Decimal },
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }
}

/// Which side of the SMA the close sits on.
///
/// A close exactly on the SMA is neither side and leaves the crossover
/// tracker unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmaRelation {
    Above,
    Below,
}

/// Read-only account state handed to the strategy by the orchestrator.
///
/// The strategy never holds the portfolio itself; it sees one snapshot per
/// tick, taken under the portfolio lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyContext {
    /// Cash balance available for risk sizing
    pub cash: Decimal,
    /// Signed position quantity in this symbol (zero when flat)
    pub position_quantity: Decimal,
}

/// An intent dispatched but not yet settled.
///
/// While one is outstanding the strategy emits no further signals for the
/// symbol; a fill commits `next_state`, a rejection discards it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransition {
    pub order_id: String,
    pub next_state: PositionState,
}
