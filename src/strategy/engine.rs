//! SMA-crossover strategy state machine

use tracing::{debug, warn};

use super::types::{PendingTransition, PositionState, SmaRelation, StrategyContext};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{Bar, Fill, OrderIntent, Side};
use crate::indicator::IndicatorSnapshot;
use crate::risk::{RiskFigures, RiskManager};

/// Per-symbol strategy: state machine {Flat, Long, Short} driven by the
/// close crossing the SMA.
///
/// Crossover, not raw comparison: the previous side of the SMA is tracked,
/// and an entry fires only when the side changes. The first bar with an
/// available SMA counts as a cross, and price staying on one side never
/// re-fires. Transitions commit on fill confirmation, so a gated or
/// rejected intent leaves the state untouched.
pub struct StrategyEngine {
    symbol: String,
    risk: RiskManager,
    state: PositionState,
    prev_relation: Option<SmaRelation>,
    pending: Option<PendingTransition>,
    order_seq: u64,
}

impl StrategyEngine {
    /// The orchestrator constructs the risk manager and injects it here;
    /// the strategy never reaches for shared singletons.
    pub fn new(symbol: impl Into<String>, risk: RiskManager) -> Self {
        Self {
            symbol: symbol.into(),
            risk,
            state: PositionState::Flat,
            prev_relation: None,
            pending: None,
            order_seq: 0,
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Evaluate one tick and possibly produce an order intent.
    ///
    /// An unavailable SMA suppresses signal generation for the tick. Risk
    /// errors (`InsufficientRiskBudget`, `InvalidOrder`) propagate so the
    /// worker can log and skip; `RiskNotComputed` propagates as fatal.
    pub fn evaluate(
        &mut self,
        bar: &Bar,
        snapshot: &IndicatorSnapshot,
        ctx: &StrategyContext,
    ) -> Result<Option<OrderIntent>> {
        if self.pending.is_some() {
            debug!("{}: intent outstanding, skipping evaluation", self.symbol);
            return Ok(None);
        }

        let Some(sma) = snapshot.sma else {
            debug!("{}: SMA unavailable, no signal", self.symbol);
            return Ok(None);
        };

        let relation = if bar.close > sma {
            SmaRelation::Above
        } else if bar.close < sma {
            SmaRelation::Below
        } else {
            return Ok(None);
        };
        let crossed = self.prev_relation != Some(relation);
        self.prev_relation = Some(relation);

        match self.state {
            PositionState::Flat if crossed => {
                let side = match relation {
                    SmaRelation::Above => Side::Long,
                    SmaRelation::Below => Side::Short,
                };
                let figures = self
                    .risk
                    .entry_figures(ctx.cash, bar.close, side, bar.timestamp)?;
                let intent = self.entry_order(side, bar, Some(&figures))?;
                Ok(Some(intent))
            }
            PositionState::Long { stop } if bar.close < stop => {
                self.exit_order(Side::ExitLong, bar, ctx).map(Some)
            }
            PositionState::Short { stop } if bar.close > stop => {
                self.exit_order(Side::ExitShort, bar, ctx).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Build an entry order from risk figures computed this tick.
    ///
    /// Missing figures, or figures computed from an earlier bar, are a
    /// sequencing bug and fail with `RiskNotComputed` before any order is
    /// constructed.
    pub fn entry_order(
        &mut self,
        side: Side,
        bar: &Bar,
        figures: Option<&RiskFigures>,
    ) -> Result<OrderIntent> {
        let figures = figures.ok_or_else(|| EngineError::RiskNotComputed {
            symbol: self.symbol.clone(),
        })?;
        if figures.computed_at != bar.timestamp {
            return Err(EngineError::RiskNotComputed {
                symbol: self.symbol.clone(),
            });
        }

        let intent = OrderIntent::entry(
            self.next_order_id(),
            &self.symbol,
            side,
            figures.max_quantity,
            figures.max_quantity,
            bar.close,
            bar.timestamp,
        )?;

        let next_state = match side {
            Side::Long => PositionState::Long {
                stop: figures.stop_loss,
            },
            Side::Short => PositionState::Short {
                stop: figures.stop_loss,
            },
            _ => unreachable!("entry_order called with exit side"),
        };
        self.pending = Some(PendingTransition {
            order_id: intent.id.clone(),
            next_state,
        });
        Ok(intent)
    }

    fn exit_order(
        &mut self,
        side: Side,
        bar: &Bar,
        ctx: &StrategyContext,
    ) -> Result<OrderIntent> {
        let quantity = ctx.position_quantity.abs();
        if quantity.is_zero() {
            // State said positioned but the portfolio is flat; resync
            warn!(
                "{}: exit signal with no open position, resetting to flat",
                self.symbol
            );
            self.state = PositionState::Flat;
            return Err(EngineError::InvalidOrder(format!(
                "no position to exit in {}",
                self.symbol
            )));
        }

        let intent = OrderIntent::exit(
            self.next_order_id(),
            &self.symbol,
            side,
            quantity,
            bar.close,
            bar.timestamp,
        )?;
        self.pending = Some(PendingTransition {
            order_id: intent.id.clone(),
            next_state: PositionState::Flat,
        });
        Ok(intent)
    }

    /// Commit the pending transition settled by this fill
    pub fn confirm_fill(&mut self, fill: &Fill) {
        match self.pending.take() {
            Some(pending) if pending.order_id == fill.order_id => {
                debug!(
                    "{}: fill {} commits transition to {:?}",
                    self.symbol, fill.order_id, pending.next_state
                );
                self.state = pending.next_state;
            }
            Some(pending) => {
                warn!(
                    "{}: fill {} does not match pending order {}",
                    self.symbol, fill.order_id, pending.order_id
                );
                self.pending = Some(pending);
            }
            None => {
                warn!(
                    "{}: fill {} arrived with no pending transition",
                    self.symbol, fill.order_id
                );
            }
        }
    }

    /// Discard the pending transition after a gate failure or rejection.
    /// State is left exactly as it was before the signal.
    pub fn abort_pending(&mut self, order_id: &str) {
        match &self.pending {
            Some(pending) if pending.order_id == order_id => {
                debug!("{}: discarding pending order {}", self.symbol, order_id);
                self.pending = None;
            }
            _ => {}
        }
    }

    fn next_order_id(&mut self) -> String {
        self.order_seq += 1;
        format!("{}-{}", self.symbol.to_lowercase(), self.order_seq)
    }
}
