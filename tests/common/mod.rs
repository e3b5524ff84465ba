//! Shared helpers for integration tests

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use kline_trader::common::errors::Result;
use kline_trader::common::types::{Bar, OrderIntent};
use kline_trader::compliance::{ComplianceGate, ComplianceVerdict};
use kline_trader::config::{
    AppConfig, AppSettings, BacktestConfig, BinanceConfig, EngineConfig, RiskParameters, SinkMode,
};
use kline_trader::feed::MarketFeed;
use rust_decimal_macros::dec;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 59).unwrap()
}

pub fn bar(symbol: &str, minute: i64, open: Decimal, close: Decimal) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        timestamp: base_time() + Duration::minutes(minute),
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        volume: dec!(1),
    }
}

/// One bar per close, one minute apart, open equal to close
pub fn bars_from_closes(symbol: &str, closes: &[Decimal]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| bar(symbol, i as i64, *close, *close))
        .collect()
}

/// Config for a single-symbol run with the canonical risk parameters
pub fn test_config(symbol: &str, sma_window: usize, mode: SinkMode) -> AppConfig {
    AppConfig {
        binance: BinanceConfig::default(),
        engine: EngineConfig {
            symbols: vec![symbol.to_string()],
            mode,
            sma_window,
            bar_interval_secs: 60,
            initial_balance: dec!(10000),
        },
        risk: RiskParameters {
            stop_loss_pct: dec!(0.05),
            max_risk_pct: dec!(0.1),
            qty_step: dec!(0.01),
        },
        backtest: BacktestConfig::default(),
        settings: AppSettings::default(),
    }
}

/// Gate that fails every intent with a fixed reason
pub struct DenyGate;

impl ComplianceGate for DenyGate {
    fn check(&self, _intent: &OrderIntent) -> ComplianceVerdict {
        ComplianceVerdict::Fail("trading rules validation failed".to_string())
    }
}

/// Feed over a channel, for driving paper/live-style runs from a test
pub struct ChannelFeed {
    symbol: String,
    receiver: mpsc::Receiver<Bar>,
}

impl ChannelFeed {
    pub fn new(symbol: &str, receiver: mpsc::Receiver<Bar>) -> Self {
        Self {
            symbol: symbol.to_string(),
            receiver,
        }
    }
}

#[async_trait]
impl MarketFeed for ChannelFeed {
    async fn next(&mut self) -> Result<Option<Bar>> {
        Ok(self.receiver.recv().await)
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }
}
