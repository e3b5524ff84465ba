//! Binance-specific message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::errors::{EngineError, Result};
use crate::common::types::Bar;

/// Stream name suffix for closed one-minute klines
pub const KLINE_1M_SUFFIX: &str = "@kline_1m";

/// Subscribe/unsubscribe frame for the combined stream endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSubscribeMessage {
    pub method: String,
    pub params: Vec<String>,
    pub id: u64,
}

impl WsSubscribeMessage {
    /// Subscribe to the 1m kline stream for each symbol
    pub fn subscribe(symbols: &[String], id: u64) -> Self {
        Self {
            method: "SUBSCRIBE".to_string(),
            params: symbols
                .iter()
                .map(|s| format!("{}{}", s.to_lowercase(), KLINE_1M_SUFFIX))
                .collect(),
            id,
        }
    }

    pub fn unsubscribe(symbols: &[String], id: u64) -> Self {
        Self {
            method: "UNSUBSCRIBE".to_string(),
            params: symbols
                .iter()
                .map(|s| format!("{}{}", s.to_lowercase(), KLINE_1M_SUFFIX))
                .collect(),
            id,
        }
    }
}

/// Acknowledgement frame for a subscribe request: `{"result": null, "id": 1}`
#[derive(Debug, Clone, Deserialize)]
pub struct WsAckMessage {
    pub result: Option<serde_json::Value>,
    pub id: u64,
}

/// Kline event from the websocket stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KlineEvent {
    /// Event type, "kline"
    #[serde(rename = "e")]
    pub event_type: String,
    /// Event time in epoch milliseconds
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol, upper case
    #[serde(rename = "s")]
    pub symbol: String,
    /// Kline payload
    #[serde(rename = "k")]
    pub kline: KlineData,
}

/// Kline payload within a kline event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KlineData {
    /// Interval open time in epoch milliseconds
    #[serde(rename = "t")]
    pub start_time: i64,
    /// Interval close time in epoch milliseconds
    #[serde(rename = "T")]
    pub close_time: i64,
    /// Symbol, upper case
    #[serde(rename = "s")]
    pub symbol: String,
    /// Interval string, e.g. "1m"
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    /// Whether this kline is closed; open klines are never surfaced as bars
    #[serde(rename = "x")]
    pub is_closed: bool,
}

impl KlineData {
    /// Convert a closed kline into a canonical bar.
    ///
    /// The bar timestamp is the interval close time, matching the ordering
    /// key used throughout the engine.
    pub fn to_bar(&self) -> Result<Bar> {
        Ok(Bar {
            symbol: self.symbol.clone(),
            timestamp: millis_to_datetime(self.close_time)?,
            open: parse_decimal(&self.open, "open")?,
            high: parse_decimal(&self.high, "high")?,
            low: parse_decimal(&self.low, "low")?,
            close: parse_decimal(&self.close, "close")?,
            volume: parse_decimal(&self.volume, "volume")?,
        })
    }
}

pub(crate) fn parse_decimal(value: &str, field: &str) -> Result<rust_decimal::Decimal> {
    value
        .parse()
        .map_err(|e| EngineError::InvalidResponse(format!("invalid {}: {}", field, e)))
}

pub(crate) fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| EngineError::InvalidResponse(format!("invalid timestamp: {}", millis)))
}

/// Order placement response from the broker REST API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub transact_time: i64,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub executed_qty: String,
    pub status: String,
    #[serde(default)]
    pub fills: Vec<OrderFill>,
}

/// A single fill reported inside an order response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFill {
    pub price: String,
    pub qty: String,
}

/// Trade record from the account trade list endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub symbol: String,
    pub id: i64,
    pub order_id: i64,
    pub price: String,
    pub qty: String,
    pub time: i64,
    pub is_buyer: bool,
}

/// Account information response, used as a connection probe
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    #[serde(default)]
    pub can_trade: bool,
    #[serde(default)]
    pub balances: Vec<AccountBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}
