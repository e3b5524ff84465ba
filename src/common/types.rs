//! Unified types shared across the feed, strategy, and execution layers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{EngineError, Result};

/// Direction of an order intent.
///
/// Entries open a position; exits flatten an existing one. The distinction
/// matters for risk sizing (entries are capped by the risk budget) and for
/// portfolio accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
    ExitLong,
    ExitShort,
}

impl Side {
    /// True for sides that open a position
    pub fn is_entry(&self) -> bool {
        matches!(self, Side::Long | Side::Short)
    }

    /// True for sides that flatten a position
    pub fn is_exit(&self) -> bool {
        !self.is_entry()
    }

    /// The order action a broker expects for this side
    pub fn order_action(&self) -> &'static str {
        match self {
            Side::Long | Side::ExitShort => "BUY",
            Side::Short | Side::ExitLong => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
            Side::ExitLong => write!(f, "exit_long"),
            Side::ExitShort => write!(f, "exit_short"),
        }
    }
}

/// One OHLCV observation for a fixed time interval.
///
/// Immutable once produced. `timestamp` is the close time of the interval;
/// bars for a symbol are strictly ordered by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A strategy-generated, not-yet-executed order request.
///
/// Construction is fallible: quantity must be positive, and entry quantities
/// must not exceed the risk manager's computed maximum. A violation here is a
/// bug in the caller, so it surfaces as an error rather than a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub reference_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OrderIntent {
    /// Build an entry intent, validating the quantity against the risk cap
    pub fn entry(
        id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        max_quantity: Decimal,
        reference_price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if !side.is_entry() {
            return Err(EngineError::InvalidOrder(format!(
                "{} is not an entry side",
                side
            )));
        }
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(format!(
                "entry quantity must be positive, got {}",
                quantity
            )));
        }
        if quantity > max_quantity {
            return Err(EngineError::InvalidOrder(format!(
                "entry quantity {} exceeds risk cap {}",
                quantity, max_quantity
            )));
        }
        Ok(Self {
            id: id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            reference_price,
            timestamp,
        })
    }

    /// Build an exit intent for an existing position
    pub fn exit(
        id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        reference_price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if !side.is_exit() {
            return Err(EngineError::InvalidOrder(format!(
                "{} is not an exit side",
                side
            )));
        }
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(format!(
                "exit quantity must be positive, got {}",
                quantity
            )));
        }
        Ok(Self {
            id: id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            reference_price,
            timestamp,
        })
    }
}

/// Confirmation that an order intent executed.
///
/// Immutable; consumed exactly once by the portfolio (duplicate order ids are
/// ignored there, which makes fills idempotent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Order id this fill settles (the intent id, uniform across sinks)
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Why an execution sink refused an order intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Live sink used before `connect()` succeeded
    NotConnected,
    /// Broker did not answer within the submit timeout
    Timeout,
    /// The compliance gate failed the intent
    Compliance,
    /// Broker or simulator refused the order
    Broker,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NotConnected => write!(f, "not_connected"),
            RejectReason::Timeout => write!(f, "timeout"),
            RejectReason::Compliance => write!(f, "compliance"),
            RejectReason::Broker => write!(f, "broker"),
        }
    }
}

/// A refused order intent. Recorded and discarded; never resubmitted
/// automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub order_id: String,
    pub reason: RejectReason,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Rejection {
    pub fn new(
        order_id: impl Into<String>,
        reason: RejectReason,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            reason,
            message: message.into(),
            timestamp,
        }
    }
}

/// Connection status for a streaming data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Successfully connected
    Connected,
    /// Disconnected (with optional reason)
    Disconnected(Option<String>),
    /// Attempting to reconnect
    Reconnecting { attempt: u32 },
    /// Connection error
    Error(String),
}

/// Event emitted by the websocket reader task toward a live feed
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A closed bar for the subscribed interval
    Bar(Bar),
    /// Transport status change
    Status(ConnectionStatus),
}

/// Structured event surfaced by the orchestrator to the operator.
///
/// Failures travel this channel as data; the tick loop itself never panics on
/// a rejected order or a dead feed.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SignalGenerated {
        symbol: String,
        side: Side,
        timestamp: DateTime<Utc>,
    },
    OrderFilled(Fill),
    OrderRejected(Rejection),
    ComplianceRejected {
        order_id: String,
        symbol: String,
        reason: String,
    },
    WorkerFailed {
        symbol: String,
        error: String,
    },
    FeedEnded {
        symbol: String,
    },
    EquityMark {
        timestamp: DateTime<Utc>,
        equity: Decimal,
    },
}
