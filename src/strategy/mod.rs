//! Strategy layer: per-symbol crossover state machine and its context types
//!
//! The engine receives one bar + indicator snapshot per tick and emits at
//! most one order intent. Risk figures are computed through the injected
//! [`crate::risk::RiskManager`] before any intent is constructed, and state
//! transitions commit only when the orchestrator confirms a fill.

mod engine;
mod types;

pub use engine::StrategyEngine;
pub use types::{PendingTransition, PositionState, SmaRelation, StrategyContext};
