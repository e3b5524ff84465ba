//! Binance integration: websocket kline streams, historical klines, and the
//! live broker connection

pub mod auth;
pub mod broker;
pub mod messages;
pub mod rest;
pub mod websocket;

pub use broker::{BinanceBroker, BoxedBroker, BrokerApi, BrokerOrder};
pub use rest::BinanceRestClient;
pub use websocket::BinanceWebSocketClient;
