//! Broker connection for live order routing

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::auth::signed_query;
use super::messages::{millis_to_datetime, parse_decimal, AccountResponse, OrderResponse, TradeRecord};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{Fill, Side};
use crate::config::types::ApiCredentials;

/// An order as the broker sees it: side collapsed to buy/sell, with a
/// client-assigned id for idempotency
#[derive(Debug, Clone)]
pub struct BrokerOrder {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Broker connection used by the live execution sink.
///
/// `connect` must succeed before `submit_order`; the live sink enforces this
/// and turns every error from here into a rejection rather than a crash.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Establish and verify the connection
    async fn connect(&mut self) -> Result<()>;

    /// Place an order; the returned fill carries the client order id
    async fn submit_order(&self, order: &BrokerOrder) -> Result<Fill>;

    /// Fetch executed trades for a symbol, for reconciliation
    async fn poll_fills(&self, symbol: &str) -> Result<Vec<Fill>>;

    /// Check if the connection has been established
    fn is_connected(&self) -> bool;
}

/// Boxed broker for dynamic dispatch
pub type BoxedBroker = Box<dyn BrokerApi>;

/// Binance REST broker
pub struct BinanceBroker {
    client: Client,
    base_url: String,
    credentials: ApiCredentials,
    connected: bool,
}

impl BinanceBroker {
    pub fn new(base_url: &str, credentials: ApiCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            connected: false,
        })
    }

    fn signed_url(&self, path: &str, query: &str) -> Result<String> {
        let query = signed_query(
            &self.credentials.api_secret,
            query,
            Utc::now().timestamp_millis(),
        )?;
        Ok(format!("{}{}?{}", self.base_url, path, query))
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EngineError::Authentication(format!(
                "broker returned {}: {}",
                status, body
            )));
        }
        Err(EngineError::InvalidResponse(format!(
            "broker returned {}: {}",
            status, body
        )))
    }
}

#[async_trait]
impl BrokerApi for BinanceBroker {
    /// Verify credentials against the account endpoint and mark connected
    #[instrument(skip(self))]
    async fn connect(&mut self) -> Result<()> {
        let url = self.signed_url("/api/v3/account", "")?;
        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let account: AccountResponse = response.json().await?;
        if !account.can_trade {
            return Err(EngineError::Authentication(
                "account is not enabled for trading".to_string(),
            ));
        }

        info!("Broker connection established");
        self.connected = true;
        Ok(())
    }

    #[instrument(skip(self), fields(client_order_id = %order.client_order_id))]
    async fn submit_order(&self, order: &BrokerOrder) -> Result<Fill> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }

        let query = format!(
            "symbol={}&side={}&type=LIMIT&timeInForce=GTC&quantity={}&price={}&newClientOrderId={}&newOrderRespType=FULL",
            order.symbol.to_uppercase(),
            order.side.order_action(),
            order.quantity,
            order.price,
            order.client_order_id
        );
        let url = self.signed_url("/api/v3/order", &query)?;

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let order_response: OrderResponse = response.json().await?;
        debug!(
            "Order {} acknowledged with status {}",
            order_response.client_order_id, order_response.status
        );

        if order_response.status != "FILLED" && order_response.status != "PARTIALLY_FILLED" {
            return Err(EngineError::InvalidResponse(format!(
                "order not filled, status: {}",
                order_response.status
            )));
        }

        // Prefer the executed quantity and first reported fill price; fall
        // back to the requested figures for brokers that omit them
        let quantity = match order_response.executed_qty.as_str() {
            "" => order.quantity,
            qty => parse_decimal(qty, "executedQty")?,
        };
        let price = match order_response.fills.first() {
            Some(fill) => parse_decimal(&fill.price, "fill price")?,
            None => order.price,
        };

        Ok(Fill {
            order_id: order.client_order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity,
            price,
            timestamp: millis_to_datetime(order_response.transact_time)?,
        })
    }

    #[instrument(skip(self))]
    async fn poll_fills(&self, symbol: &str) -> Result<Vec<Fill>> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }

        let query = format!("symbol={}", symbol.to_uppercase());
        let url = self.signed_url("/api/v3/myTrades", &query)?;

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let trades: Vec<TradeRecord> = response.json().await?;
        trades
            .into_iter()
            .map(|trade| {
                Ok(Fill {
                    order_id: trade.order_id.to_string(),
                    symbol: trade.symbol.clone(),
                    // Trade records carry only buy/sell; map to position direction
                    side: if trade.is_buyer { Side::Long } else { Side::Short },
                    quantity: parse_decimal(&trade.qty, "qty")?,
                    price: parse_decimal(&trade.price, "price")?,
                    timestamp: millis_to_datetime(trade.time)?,
                })
            })
            .collect()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn broker() -> BinanceBroker {
        BinanceBroker::new(
            "https://api.binance.com",
            ApiCredentials::new("key".to_string(), "secret".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn broker_starts_disconnected() {
        assert!(!broker().is_connected());
    }

    #[tokio::test]
    async fn submit_before_connect_is_not_connected() {
        let broker = broker();
        let order = BrokerOrder {
            client_order_id: "btcusdt-1-0".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            quantity: dec!(1),
            price: dec!(100),
        };
        let result = broker.submit_order(&order).await;
        assert!(matches!(result, Err(EngineError::NotConnected)));
    }
}
