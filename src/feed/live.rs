//! Live feed over the Binance kline websocket with bounded reconnection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::MarketFeed;
use crate::binance::websocket::BinanceWebSocketClient;
use crate::common::channels::create_feed_channel;
use crate::common::errors::{EngineError, Result};
use crate::common::types::{Bar, ConnectionStatus, FeedEvent};
use crate::config::types::AppSettings;

/// Cap on a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Reconnection policy for a live feed
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt; doubles per attempt up to the cap
    pub base_delay: Duration,
    /// Attempt budget (0 = infinite)
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.reconnect_delay_ms),
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Live bar feed for one symbol.
///
/// `next` suspends on the websocket reader's channel until a closed bar
/// arrives. On disconnect it reconnects with exponential backoff; once the
/// attempt budget is exhausted it resolves to `FeedFailure`. A close-time
/// monotonicity guard drops any bar already delivered before a reconnect, so
/// consumers never see duplicates.
pub struct LiveFeed {
    symbol: String,
    client: BinanceWebSocketClient,
    receiver: mpsc::Receiver<FeedEvent>,
    policy: ReconnectPolicy,
    last_close_time: Option<DateTime<Utc>>,
}

impl LiveFeed {
    /// Connect and subscribe to the symbol's kline stream
    pub async fn connect(
        symbol: impl Into<String>,
        ws_url: &str,
        policy: ReconnectPolicy,
    ) -> Result<Self> {
        let symbol = symbol.into();
        let mut client = BinanceWebSocketClient::new(ws_url);
        let (sender, receiver) = create_feed_channel();
        client
            .connect_and_subscribe(vec![symbol.clone()], sender)
            .await?;

        Ok(Self {
            symbol,
            client,
            receiver,
            policy,
            last_close_time: None,
        })
    }

    /// Build a feed over an existing event channel, without connecting
    #[cfg(test)]
    fn with_receiver(
        symbol: &str,
        receiver: mpsc::Receiver<FeedEvent>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            client: BinanceWebSocketClient::new("wss://stream.binance.com:9443/ws"),
            receiver,
            policy,
            last_close_time: None,
        }
    }

    /// Reconnect with bounded backoff, replacing the event channel.
    ///
    /// The monotonicity state survives reconnection, which is what prevents
    /// re-delivered bars from reaching the consumer.
    async fn reconnect(&mut self) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if self.policy.max_attempts != 0 && attempt > self.policy.max_attempts {
                return Err(EngineError::FeedFailure {
                    symbol: self.symbol.clone(),
                    reason: format!(
                        "reconnect budget exhausted after {} attempts",
                        self.policy.max_attempts
                    ),
                });
            }

            let delay = self.policy.delay_for(attempt);
            info!(
                "Reconnecting {} (attempt {}) after {:?}",
                self.symbol, attempt, delay
            );
            tokio::time::sleep(delay).await;

            let (sender, receiver) = create_feed_channel();
            match self
                .client
                .connect_and_subscribe(vec![self.symbol.clone()], sender)
                .await
            {
                Ok(()) => {
                    self.receiver = receiver;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                }
            }
        }
    }
}

#[async_trait]
impl MarketFeed for LiveFeed {
    async fn next(&mut self) -> Result<Option<Bar>> {
        loop {
            match self.receiver.recv().await {
                Some(FeedEvent::Bar(bar)) => {
                    if let Some(last) = self.last_close_time {
                        if bar.timestamp <= last {
                            debug!(
                                "Dropping already-delivered bar for {} at {}",
                                self.symbol, bar.timestamp
                            );
                            continue;
                        }
                    }
                    self.last_close_time = Some(bar.timestamp);
                    return Ok(Some(bar));
                }
                Some(FeedEvent::Status(ConnectionStatus::Disconnected(reason))) => {
                    warn!(
                        "Feed for {} disconnected: {:?}; attempting reconnect",
                        self.symbol, reason
                    );
                    self.reconnect().await?;
                }
                Some(FeedEvent::Status(ConnectionStatus::Error(e))) => {
                    warn!("Feed for {} errored: {}; attempting reconnect", self.symbol, e);
                    self.reconnect().await?;
                }
                Some(FeedEvent::Status(_)) => {}
                // Reader task gone without a status frame
                None => {
                    warn!("Feed channel for {} closed; attempting reconnect", self.symbol);
                    self.reconnect().await?;
                }
            }
        }
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }
}
