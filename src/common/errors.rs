//! Error types for the engine

use thiserror::Error;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// WebSocket connection errors
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    /// WebSocket send/receive errors
    #[error("WebSocket communication error: {0}")]
    WebSocketCommunication(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Market data source unavailable after the retry budget is exhausted.
    /// Fatal to the affected symbol's worker, not the whole process.
    #[error("market feed failed for {symbol}: {reason}")]
    FeedFailure { symbol: String, reason: String },

    /// Not enough history to produce an indicator value.
    /// Non-fatal: suppresses signal generation for the tick.
    #[error("indicator unavailable for {symbol}: {have}/{needed} observations")]
    IndicatorUnavailable {
        symbol: String,
        needed: usize,
        have: usize,
    },

    /// Per-unit risk is zero (stop equals entry), so no position size exists
    #[error("insufficient risk budget: stop-loss equals entry price")]
    InsufficientRiskBudget,

    /// Allocation weights are negative or sum to a non-positive total
    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    /// An order intent was built without fresh risk figures.
    /// This is a sequencing bug in the pipeline, not a market condition.
    #[error("risk figures missing or stale for {symbol} at order construction")]
    RiskNotComputed { symbol: String },

    /// Order intent failed construction-time validation
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Live sink used before its broker connection succeeded
    #[error("broker connection not established")]
    NotConnected,

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the worker loop should log this error and keep ticking.
    ///
    /// `RiskNotComputed` is deliberately not recoverable: it means the
    /// pipeline dispatched out of order.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::IndicatorUnavailable { .. }
                | EngineError::InsufficientRiskBudget
                | EngineError::InvalidAllocation(_)
                | EngineError::InvalidOrder(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EngineError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        EngineError::WebSocketCommunication(err.to_string())
    }
}
