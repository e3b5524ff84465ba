//! Simulated fills against live prices

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{ExecutionSink, SubmitResult};
use crate::common::types::{Bar, Fill, OrderIntent, RejectReason, Rejection};

/// Simulated sink over live prices.
///
/// Fills at the latest observed bar close for the symbol, optionally after a
/// configured latency to mimic a real round trip. Submitting before any bar
/// has been observed for the symbol is a rejection, not a guess at a price.
#[derive(Debug, Default)]
pub struct PaperSink {
    latest_prices: HashMap<String, Decimal>,
    latency: Option<Duration>,
}

impl PaperSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a fixed latency between intent and fill
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = if latency.is_zero() {
            None
        } else {
            Some(latency)
        };
        self
    }

    /// Latest observed price for a symbol
    pub fn latest_price(&self, symbol: &str) -> Option<Decimal> {
        self.latest_prices.get(symbol).copied()
    }
}

#[async_trait]
impl ExecutionSink for PaperSink {
    async fn submit(&mut self, intent: &OrderIntent) -> SubmitResult {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let Some(price) = self.latest_price(&intent.symbol) else {
            return Err(Rejection::new(
                &intent.id,
                RejectReason::Broker,
                format!("no observed price for {}", intent.symbol),
                Utc::now(),
            ));
        };

        debug!("Paper fill for {} at {}", intent.id, price);
        Ok(Fill {
            order_id: intent.id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            quantity: intent.quantity,
            price,
            timestamp: Utc::now(),
        })
    }

    fn observe_bar(&mut self, bar: &Bar) {
        self.latest_prices.insert(bar.symbol.clone(), bar.close);
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}
