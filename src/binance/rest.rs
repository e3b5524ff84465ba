//! REST API client for Binance market data

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

use super::messages::{millis_to_datetime, parse_decimal};
use crate::common::errors::{EngineError, Result};
use crate::common::types::Bar;

/// Maximum klines per request allowed by the API
const KLINES_PAGE_LIMIT: u32 = 1000;

/// REST API client for Binance market data
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    /// HTTP client
    client: Client,
    /// Base URL for the REST API
    base_url: String,
}

impl BinanceRestClient {
    /// Create a new REST client
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get server time in epoch milliseconds
    #[instrument(skip(self))]
    pub async fn get_server_time(&self) -> Result<i64> {
        let url = format!("{}/api/v3/time", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(EngineError::InvalidResponse(format!(
                "Server returned status: {}",
                response.status()
            )));
        }

        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TimeResponse {
            server_time: i64,
        }

        let time_response: TimeResponse = response.json().await?;
        Ok(time_response.server_time)
    }

    /// Fetch historical 1m klines for a symbol over an inclusive date range.
    ///
    /// Pages through the API in chunks of 1000 until the range is covered;
    /// returned bars are ordered by close time.
    #[instrument(skip(self))]
    pub async fn get_klines(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let mut bars = Vec::new();
        let mut cursor = start.timestamp_millis();
        let end_ms = end.timestamp_millis();

        while cursor < end_ms {
            let url = format!(
                "{}/api/v3/klines?symbol={}&interval=1m&startTime={}&endTime={}&limit={}",
                self.base_url,
                symbol.to_uppercase(),
                cursor,
                end_ms,
                KLINES_PAGE_LIMIT
            );
            debug!("Fetching klines from: {}", url);

            let response = self.client.get(&url).send().await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(EngineError::InvalidResponse(format!(
                    "Server returned status {}: {}",
                    status, body
                )));
            }

            let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
            if rows.is_empty() {
                break;
            }

            let page_len = rows.len();
            for row in rows {
                bars.push(parse_kline_row(symbol, &row)?);
            }

            // Next page starts one interval past the last open time
            cursor = bars
                .last()
                .map(|b| b.timestamp.timestamp_millis() + 1)
                .unwrap_or(end_ms);

            if page_len < KLINES_PAGE_LIMIT as usize {
                break;
            }
        }

        Ok(bars)
    }
}

/// Parse one kline row from the REST response.
///
/// Row layout: [openTime, open, high, low, close, volume, closeTime, ...].
fn parse_kline_row(symbol: &str, row: &[serde_json::Value]) -> Result<Bar> {
    if row.len() < 7 {
        return Err(EngineError::InvalidResponse(format!(
            "kline row has {} fields, expected at least 7",
            row.len()
        )));
    }

    let field_str = |idx: usize, name: &str| -> Result<String> {
        row[idx]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::InvalidResponse(format!("{} is not a string", name)))
    };
    let close_time = row[6]
        .as_i64()
        .ok_or_else(|| EngineError::InvalidResponse("closeTime is not an integer".to_string()))?;

    Ok(Bar {
        symbol: symbol.to_uppercase(),
        timestamp: millis_to_datetime(close_time)?,
        open: parse_decimal(&field_str(1, "open")?, "open")?,
        high: parse_decimal(&field_str(2, "high")?, "high")?,
        low: parse_decimal(&field_str(3, "low")?, "low")?,
        close: parse_decimal(&field_str(4, "close")?, "close")?,
        volume: parse_decimal(&field_str(5, "volume")?, "volume")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = BinanceRestClient::new("https://api.binance.com");
        assert!(client.is_ok());
    }

    #[test]
    fn url_normalization() {
        let client = BinanceRestClient::new("https://api.binance.com/").unwrap();
        assert!(!client.base_url.ends_with('/'));
    }

    #[test]
    fn kline_row_parses_into_bar() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1718064000000, "67000.10", "67080.00", "66990.00", "67050.55", "12.345",
                1718064059999, "827061.5", 100, "6.1", "409000.2", "0"]"#,
        )
        .unwrap();

        let bar = parse_kline_row("btcusdt", &row).unwrap();
        assert_eq!(bar.symbol, "BTCUSDT");
        assert_eq!(bar.open.to_string(), "67000.10");
        assert_eq!(bar.timestamp.timestamp_millis(), 1718064059999);
    }

    #[test]
    fn short_kline_row_is_an_error() {
        let row: Vec<serde_json::Value> = serde_json::from_str(r#"[1718064000000]"#).unwrap();
        assert!(parse_kline_row("btcusdt", &row).is_err());
    }
}
