//! Live execution through a broker connection

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::{ExecutionSink, SubmitResult};
use crate::binance::broker::{BoxedBroker, BrokerOrder};
use crate::common::errors::Result;
use crate::common::types::{OrderIntent, RejectReason, Rejection};

/// Live sink over a broker connection.
///
/// `connect` must succeed before the first submit; until then every intent
/// resolves to `Rejection{NotConnected}`. Broker calls run under a bounded
/// timeout, after which the intent resolves to `Rejection{Timeout}` — the
/// orchestrator loop never hangs on a stalled broker. Each broker submission
/// carries a fresh client order id (intent id + attempt counter), so a
/// resubmission after a timeout cannot collide with the original.
pub struct LiveSink {
    broker: BoxedBroker,
    submit_timeout: Duration,
    attempt_seq: u64,
}

impl LiveSink {
    pub fn new(broker: BoxedBroker, submit_timeout: Duration) -> Self {
        Self {
            broker,
            submit_timeout,
            attempt_seq: 0,
        }
    }

    /// Establish the broker connection
    #[instrument(skip(self))]
    pub async fn connect(&mut self) -> Result<()> {
        self.broker.connect().await?;
        info!("Live sink connected to broker");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.broker.is_connected()
    }
}

#[async_trait]
impl ExecutionSink for LiveSink {
    async fn submit(&mut self, intent: &OrderIntent) -> SubmitResult {
        if !self.broker.is_connected() {
            warn!("Submit for {} before broker connection", intent.id);
            return Err(Rejection::new(
                &intent.id,
                RejectReason::NotConnected,
                "broker connection not established",
                Utc::now(),
            ));
        }

        self.attempt_seq += 1;
        let order = BrokerOrder {
            client_order_id: format!("{}-{}", intent.id, self.attempt_seq),
            symbol: intent.symbol.clone(),
            side: intent.side,
            quantity: intent.quantity,
            price: intent.reference_price,
        };

        match tokio::time::timeout(self.submit_timeout, self.broker.submit_order(&order)).await {
            Ok(Ok(mut fill)) => {
                // Settle against the intent id; the broker-side client order
                // id only disambiguates attempts
                fill.order_id = intent.id.clone();
                Ok(fill)
            }
            Ok(Err(e)) => {
                error!("Broker rejected {}: {}", intent.id, e);
                Err(Rejection::new(
                    &intent.id,
                    RejectReason::Broker,
                    e.to_string(),
                    Utc::now(),
                ))
            }
            Err(_) => {
                error!(
                    "Broker submit for {} timed out after {:?}",
                    intent.id, self.submit_timeout
                );
                Err(Rejection::new(
                    &intent.id,
                    RejectReason::Timeout,
                    format!("no broker response within {:?}", self.submit_timeout),
                    Utc::now(),
                ))
            }
        }
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use crate::binance::broker::BrokerApi;
    use crate::common::errors::EngineError;
    use crate::common::types::{Fill, Side};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 59).unwrap()
    }

    fn intent() -> OrderIntent {
        OrderIntent::entry(
            "btcusdt-1",
            "BTCUSDT",
            Side::Long,
            dec!(1),
            dec!(1),
            dec!(150),
            ts(),
        )
        .unwrap()
    }

    /// Scriptable broker double
    struct FakeBroker {
        connected: bool,
        behavior: Behavior,
    }

    enum Behavior {
        Fill,
        Error,
        Hang,
    }

    #[async_trait]
    impl BrokerApi for FakeBroker {
        async fn connect(&mut self) -> Result<()> {
            self.connected = true;
            Ok(())
        }

        async fn submit_order(&self, order: &BrokerOrder) -> Result<Fill> {
            match self.behavior {
                Behavior::Fill => Ok(Fill {
                    order_id: order.client_order_id.clone(),
                    symbol: order.symbol.clone(),
                    side: order.side,
                    quantity: order.quantity,
                    price: order.price,
                    timestamp: ts(),
                }),
                Behavior::Error => Err(EngineError::InvalidResponse(
                    "insufficient balance".to_string(),
                )),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        async fn poll_fills(&self, _symbol: &str) -> Result<Vec<Fill>> {
            Ok(Vec::new())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn sink(connected: bool, behavior: Behavior) -> LiveSink {
        LiveSink::new(
            Box::new(FakeBroker {
                connected,
                behavior,
            }),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn submit_before_connect_is_rejected() {
        let mut sink = sink(false, Behavior::Fill);
        let rejection = sink.submit(&intent()).await.unwrap_err();
        assert_eq!(rejection.reason, RejectReason::NotConnected);
    }

    #[tokio::test]
    async fn connected_submit_settles_against_the_intent_id() {
        let mut sink = sink(true, Behavior::Fill);
        let fill = sink.submit(&intent()).await.unwrap();
        assert_eq!(fill.order_id, "btcusdt-1");
        assert_eq!(fill.price, dec!(150));
    }

    #[tokio::test]
    async fn broker_errors_become_rejections() {
        let mut sink = sink(true, Behavior::Error);
        let rejection = sink.submit(&intent()).await.unwrap_err();
        assert_eq!(rejection.reason, RejectReason::Broker);
        assert!(rejection.message.contains("insufficient balance"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_broker_resolves_to_timeout() {
        let mut sink = sink(true, Behavior::Hang);
        let rejection = sink.submit(&intent()).await.unwrap_err();
        assert_eq!(rejection.reason, RejectReason::Timeout);
    }

    #[tokio::test]
    async fn each_attempt_gets_a_fresh_client_order_id() {
        let mut sink = sink(true, Behavior::Fill);
        sink.submit(&intent()).await.unwrap();
        sink.submit(&intent()).await.unwrap();
        assert_eq!(sink.attempt_seq, 2);
    }
}
