//! Deterministic simulated execution against historical bars

use async_trait::async_trait;
use tracing::debug;

use super::{ExecutionSink, SubmitResult};
use crate::common::types::{Fill, OrderIntent};

/// Simulated sink for backtests.
///
/// Fills synchronously at the intent's reference price with no latency, so a
/// run over identical bars is bit-for-bit reproducible. Fill-at-next-open is
/// handled upstream: the orchestrator defers dispatch one bar and re-prices
/// the intent at that bar's open, after which the fill here is still the
/// reference price.
#[derive(Debug, Default)]
pub struct BacktestSink {
    fills: u64,
}

impl BacktestSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fills produced so far
    pub fn fill_count(&self) -> u64 {
        self.fills
    }
}

#[async_trait]
impl ExecutionSink for BacktestSink {
    async fn submit(&mut self, intent: &OrderIntent) -> SubmitResult {
        self.fills += 1;
        debug!(
            "Backtest fill #{} for {} at {}",
            self.fills, intent.id, intent.reference_price
        );
        Ok(Fill {
            order_id: intent.id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            quantity: intent.quantity,
            price: intent.reference_price,
            // Deterministic: the fill time is the intent's bar time
            timestamp: intent.timestamp,
        })
    }

    fn name(&self) -> &'static str {
        "backtest"
    }
}
