//! kline_trader Library
//!
//! A trading-strategy execution engine: streams Binance klines, derives
//! SMA-crossover signals, sizes positions under risk constraints, and routes
//! orders to a backtest, paper, or live execution sink behind one contract.

pub mod binance;
pub mod common;
pub mod compliance;
pub mod config;
pub mod execution;
pub mod feed;
pub mod indicator;
pub mod portfolio;
pub mod risk;
pub mod strategy;
pub mod trader;

// Re-export commonly used types
pub use common::errors::{EngineError, Result};
pub use common::types::{
    Bar, ConnectionStatus, EngineEvent, FeedEvent, Fill, OrderIntent, RejectReason, Rejection,
    Side,
};
pub use config::types::{AppConfig, FillPolicy, RiskParameters, SinkMode};

// Market data
pub use binance::{BinanceBroker, BinanceRestClient, BinanceWebSocketClient, BrokerApi};
pub use feed::{BoxedFeed, HistoricalFeed, LiveFeed, MarketFeed};
pub use indicator::{IndicatorEngine, IndicatorSnapshot};

// Pipeline
pub use compliance::{ComplianceGate, ComplianceVerdict, PermissiveGate};
pub use execution::{BacktestSink, BoxedSink, ExecutionSink, LiveSink, PaperSink, SubmitResult};
pub use portfolio::{Portfolio, Position};
pub use risk::{RiskFigures, RiskManager};
pub use strategy::{PositionState, StrategyContext, StrategyEngine};
pub use trader::{RunReport, SymbolWorker, Trader};
