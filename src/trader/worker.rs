//! Per-symbol tick loop

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

use crate::common::errors::Result;
use crate::common::types::{Bar, EngineEvent, OrderIntent};
use crate::compliance::{ComplianceGate, ComplianceVerdict};
use crate::config::types::FillPolicy;
use crate::execution::BoxedSink;
use crate::feed::BoxedFeed;
use crate::indicator::IndicatorEngine;
use crate::portfolio::Portfolio;
use crate::strategy::{StrategyContext, StrategyEngine};

/// Resolve when the shutdown flag flips to true.
///
/// A dropped sender means no shutdown will ever arrive (a bounded backtest
/// run); in that case this never resolves and the worker ends with its feed.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// One symbol's sequential pipeline: feed → indicators → strategy → gate →
/// sink → portfolio.
///
/// Indicator and strategy state are owned here and never shared; the
/// portfolio, marks, and sink are the cross-symbol resources, each behind
/// its own lock. The feed receive is the only suspension point besides the
/// sink's bounded submit.
pub struct SymbolWorker {
    symbol: String,
    feed: BoxedFeed,
    indicators: IndicatorEngine,
    strategy: StrategyEngine,
    portfolio: Arc<Mutex<Portfolio>>,
    sink: Arc<Mutex<BoxedSink>>,
    gate: Arc<dyn ComplianceGate>,
    marks: Arc<Mutex<HashMap<String, Decimal>>>,
    events: mpsc::Sender<EngineEvent>,
    shutdown: watch::Receiver<bool>,
    fill_policy: FillPolicy,
    deferred: Option<OrderIntent>,
}

#[allow(clippy::too_many_arguments)]
impl SymbolWorker {
    pub fn new(
        feed: BoxedFeed,
        indicators: IndicatorEngine,
        strategy: StrategyEngine,
        portfolio: Arc<Mutex<Portfolio>>,
        sink: Arc<Mutex<BoxedSink>>,
        gate: Arc<dyn ComplianceGate>,
        marks: Arc<Mutex<HashMap<String, Decimal>>>,
        events: mpsc::Sender<EngineEvent>,
        shutdown: watch::Receiver<bool>,
        fill_policy: FillPolicy,
    ) -> Self {
        Self {
            symbol: feed.symbol().to_string(),
            feed,
            indicators,
            strategy,
            portfolio,
            sink,
            gate,
            marks,
            events,
            shutdown,
            fill_policy,
            deferred: None,
        }
    }

    /// Run until end of stream, fatal failure, or cooperative shutdown.
    ///
    /// The cancellation signal is checked between ticks only; a dispatch in
    /// flight is always awaited to its fill or rejection first. Failures end
    /// this worker and are reported as events; other symbols keep running.
    pub async fn run(mut self) {
        info!("Worker for {} started", self.symbol);
        loop {
            if *self.shutdown.borrow() {
                info!("Worker for {} shutting down", self.symbol);
                break;
            }

            let bar = tokio::select! {
                result = self.feed.next() => match result {
                    Ok(Some(bar)) => bar,
                    Ok(None) => {
                        info!("Feed for {} ended", self.symbol);
                        let _ = self
                            .events
                            .send(EngineEvent::FeedEnded {
                                symbol: self.symbol.clone(),
                            })
                            .await;
                        break;
                    }
                    Err(e) => {
                        error!("Worker for {} lost its feed: {}", self.symbol, e);
                        let _ = self
                            .events
                            .send(EngineEvent::WorkerFailed {
                                symbol: self.symbol.clone(),
                                error: e.to_string(),
                            })
                            .await;
                        break;
                    }
                },
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    info!("Worker for {} shutting down", self.symbol);
                    break;
                }
            };

            if let Err(e) = self.on_bar(&bar).await {
                if e.is_recoverable() {
                    warn!("Worker for {} skipped a tick: {}", self.symbol, e);
                    continue;
                }
                error!("Worker for {} failed: {}", self.symbol, e);
                let _ = self
                    .events
                    .send(EngineEvent::WorkerFailed {
                        symbol: self.symbol.clone(),
                        error: e.to_string(),
                    })
                    .await;
                break;
            }
        }
    }

    async fn on_bar(&mut self, bar: &Bar) -> Result<()> {
        {
            self.sink.lock().await.observe_bar(bar);
        }
        {
            self.marks
                .lock()
                .await
                .insert(bar.symbol.clone(), bar.close);
        }

        // Next-open policy: the intent produced on the previous bar is
        // re-priced at this bar's open and dispatched now
        if let Some(mut intent) = self.deferred.take() {
            intent.reference_price = bar.open;
            self.dispatch(intent).await?;
        }

        let Some(snapshot) = self.indicators.update(bar) else {
            return Ok(());
        };

        let ctx = {
            let portfolio = self.portfolio.lock().await;
            StrategyContext {
                cash: portfolio.cash(),
                position_quantity: portfolio.position_quantity(&self.symbol),
            }
        };

        if let Some(intent) = self.strategy.evaluate(bar, &snapshot, &ctx)? {
            let _ = self
                .events
                .send(EngineEvent::SignalGenerated {
                    symbol: self.symbol.clone(),
                    side: intent.side,
                    timestamp: bar.timestamp,
                })
                .await;

            if self.fill_policy == FillPolicy::NextOpen {
                self.deferred = Some(intent);
            } else {
                self.dispatch(intent).await?;
            }
        }

        let equity = {
            let portfolio = self.portfolio.lock().await;
            let marks = self.marks.lock().await;
            portfolio.equity(&marks)
        };
        let _ = self
            .events
            .send(EngineEvent::EquityMark {
                timestamp: bar.timestamp,
                equity,
            })
            .await;

        Ok(())
    }

    /// Gate, submit, and settle one intent
    async fn dispatch(&mut self, intent: OrderIntent) -> Result<()> {
        if let ComplianceVerdict::Fail(reason) = self.gate.check(&intent) {
            warn!("Compliance failed {}: {}", intent.id, reason);
            self.strategy.abort_pending(&intent.id);
            let _ = self
                .events
                .send(EngineEvent::ComplianceRejected {
                    order_id: intent.id.clone(),
                    symbol: self.symbol.clone(),
                    reason,
                })
                .await;
            return Ok(());
        }

        let result = { self.sink.lock().await.submit(&intent).await };
        match result {
            Ok(fill) => {
                {
                    self.portfolio.lock().await.apply_fill(&fill)?;
                }
                self.strategy.confirm_fill(&fill);
                let _ = self.events.send(EngineEvent::OrderFilled(fill)).await;
            }
            Err(rejection) => {
                warn!(
                    "Order {} rejected ({}): {}",
                    rejection.order_id, rejection.reason, rejection.message
                );
                self.strategy.abort_pending(&intent.id);
                let _ = self.events.send(EngineEvent::OrderRejected(rejection)).await;
            }
        }
        Ok(())
    }
}
