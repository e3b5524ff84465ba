//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Which execution sink the engine routes orders to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    Backtest,
    Paper,
    Live,
}

impl std::fmt::Display for SinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkMode::Backtest => write!(f, "backtest"),
            SinkMode::Paper => write!(f, "paper"),
            SinkMode::Live => write!(f, "live"),
        }
    }
}

/// How the backtest sink prices fills
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Fill at the intent's reference price, same bar
    #[default]
    ReferencePrice,
    /// Defer one bar and fill at that bar's open
    NextOpen,
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Binance endpoints and credentials
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Engine-level settings: symbols, indicator window, mode
    pub engine: EngineConfig,
    /// Risk parameters, immutable per run
    #[serde(default)]
    pub risk: RiskParameters,
    /// Backtest date range and fill policy
    #[serde(default)]
    pub backtest: BacktestConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Binance endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// WebSocket URL for kline streams
    #[serde(default = "default_binance_ws_url")]
    pub websocket_url: String,
    /// Base URL for the REST API (historical klines, order endpoints)
    #[serde(default = "default_binance_rest_url")]
    pub rest_url: String,
    /// API key for authenticated requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for signing requests
    #[serde(default)]
    pub api_secret: Option<String>,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            websocket_url: default_binance_ws_url(),
            rest_url: default_binance_rest_url(),
            api_key: None,
            api_secret: None,
        }
    }
}

fn default_binance_ws_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_binance_rest_url() -> String {
    "https://api.binance.com".to_string()
}

/// Engine-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbols to subscribe, e.g. ["btcusdt"]
    pub symbols: Vec<String>,
    /// Which execution sink to route orders to
    #[serde(default = "default_mode")]
    pub mode: SinkMode,
    /// SMA window length in bars
    #[serde(default = "default_sma_window")]
    pub sma_window: usize,
    /// Bar interval in seconds (1m klines)
    #[serde(default = "default_bar_interval")]
    pub bar_interval_secs: i64,
    /// Starting cash balance
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
}

fn default_mode() -> SinkMode {
    SinkMode::Backtest
}

fn default_sma_window() -> usize {
    50
}

fn default_bar_interval() -> i64 {
    60
}

fn default_initial_balance() -> Decimal {
    dec!(10000)
}

/// Risk parameters supplied at configuration time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Stop-loss distance as a fraction of entry price
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Fraction of the account balance risked per position
    #[serde(default = "default_max_risk_pct")]
    pub max_risk_pct: Decimal,
    /// Minimum tradable quantity increment; computed sizes are floored to it
    #[serde(default = "default_qty_step")]
    pub qty_step: Decimal,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            max_risk_pct: default_max_risk_pct(),
            qty_step: default_qty_step(),
        }
    }
}

fn default_stop_loss_pct() -> Decimal {
    dec!(0.05)
}

fn default_max_risk_pct() -> Decimal {
    dec!(0.1)
}

fn default_qty_step() -> Decimal {
    dec!(0.01)
}

/// Backtest-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Inclusive range start, RFC 3339
    #[serde(default)]
    pub start: Option<String>,
    /// Inclusive range end, RFC 3339
    #[serde(default)]
    pub end: Option<String>,
    /// Fill pricing policy
    #[serde(default = "default_fill_policy")]
    pub fill_policy: FillPolicy,
}

fn default_fill_policy() -> FillPolicy {
    FillPolicy::ReferencePrice
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay before the first reconnection attempt in milliseconds;
    /// doubles per attempt, capped at one minute
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Maximum reconnection attempts (0 = infinite)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Bound on a single live order submission in seconds
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
    /// Simulated fill latency for the paper sink in milliseconds
    #[serde(default)]
    pub paper_latency_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            submit_timeout_secs: default_submit_timeout(),
            paper_latency_ms: 0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_submit_timeout() -> u64 {
    10
}

/// API credentials for authenticated broker requests
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }
}

impl BinanceConfig {
    /// Credentials, if both key and secret are configured
    pub fn credentials(&self) -> Option<ApiCredentials> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => {
                Some(ApiCredentials::new(key.clone(), secret.clone()))
            }
            _ => None,
        }
    }
}
