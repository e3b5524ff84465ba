//! WebSocket client for Binance kline streams

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{KlineEvent, WsSubscribeMessage};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{Bar, ConnectionStatus, FeedEvent};

/// WebSocket client for Binance kline streams.
///
/// Each `connect_and_subscribe` call opens a fresh connection, sends the
/// kline subscription frame, and spawns a reader task that forwards closed
/// bars and status changes to the given channel. Open (still-forming) klines
/// never leave this layer.
pub struct BinanceWebSocketClient {
    /// WebSocket URL
    url: String,
    /// Connected state flag, shared with the reader task
    is_connected: Arc<AtomicBool>,
    /// Request id counter for subscribe frames
    request_id: AtomicU64,
    /// Currently subscribed symbols
    subscribed_symbols: Vec<String>,
}

impl BinanceWebSocketClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            is_connected: Arc::new(AtomicBool::new(false)),
            request_id: AtomicU64::new(1),
            subscribed_symbols: Vec::new(),
        }
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    /// Symbols subscribed by the last successful connect
    pub fn subscribed_symbols(&self) -> &[String] {
        &self.subscribed_symbols
    }

    /// Connect, subscribe to the symbols' 1m kline streams, and start the
    /// reader task.
    ///
    /// Closed bars arrive on `sender` as `FeedEvent::Bar`; disconnects and
    /// transport errors as `FeedEvent::Status`. The reader task ends when the
    /// stream closes or the receiver is dropped.
    #[instrument(skip(self, sender))]
    pub async fn connect_and_subscribe(
        &mut self,
        symbols: Vec<String>,
        sender: mpsc::Sender<FeedEvent>,
    ) -> Result<()> {
        info!("Connecting to Binance WebSocket: {}", self.url);

        let (ws_stream, _response) = connect_async(&self.url)
            .await
            .map_err(|e| EngineError::WebSocketConnection(e.to_string()))?;

        info!("WebSocket connection established");
        self.is_connected.store(true, Ordering::SeqCst);
        self.subscribed_symbols = symbols.clone();

        let _ = sender
            .send(FeedEvent::Status(ConnectionStatus::Connected))
            .await;

        let (mut write, mut read) = ws_stream.split();

        let request_id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let subscribe_msg = WsSubscribeMessage::subscribe(&symbols, request_id);
        let msg_json = serde_json::to_string(&subscribe_msg)?;
        debug!("Sending subscription frame: {}", msg_json);
        write.send(Message::Text(msg_json)).await?;

        let is_connected = self.is_connected.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => match Self::parse_message(&text) {
                        Ok(Some(bar)) => {
                            if sender.send(FeedEvent::Bar(bar)).await.is_err() {
                                debug!("Feed receiver dropped, stopping reader task");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Failed to parse message: {} - {}", e, text);
                        }
                    },
                    Ok(Message::Ping(_)) => {
                        // tungstenite answers pings on flush; nothing to do
                        debug!("Received ping");
                    }
                    Ok(Message::Pong(_)) => {
                        debug!("Received pong");
                    }
                    Ok(Message::Close(frame)) => {
                        info!("WebSocket closed: {:?}", frame);
                        is_connected.store(false, Ordering::SeqCst);
                        let _ = sender
                            .send(FeedEvent::Status(ConnectionStatus::Disconnected(
                                frame.map(|f| f.reason.to_string()),
                            )))
                            .await;
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        is_connected.store(false, Ordering::SeqCst);
                        let _ = sender
                            .send(FeedEvent::Status(ConnectionStatus::Error(e.to_string())))
                            .await;
                        break;
                    }
                    _ => {}
                }
            }

            // Stream exhausted without a close frame counts as a disconnect
            if is_connected.swap(false, Ordering::SeqCst) {
                let _ = sender
                    .send(FeedEvent::Status(ConnectionStatus::Disconnected(None)))
                    .await;
            }
        });

        Ok(())
    }

    /// Parse an incoming message into a closed bar.
    ///
    /// Returns `Ok(None)` for subscribe acks and open klines.
    fn parse_message(text: &str) -> Result<Option<Bar>> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        // Subscribe/unsubscribe acknowledgement: {"result": null, "id": N}
        if value.get("id").is_some() && value.get("e").is_none() {
            debug!("Received request acknowledgement: {}", text);
            return Ok(None);
        }

        if value.get("e").and_then(|v| v.as_str()) == Some("kline") {
            let event: KlineEvent = serde_json::from_value(value)?;
            if !event.kline.is_closed {
                return Ok(None);
            }
            return Ok(Some(event.kline.to_bar()?));
        }

        debug!("Ignoring unrecognized message: {}", text);
        Ok(None)
    }
}
