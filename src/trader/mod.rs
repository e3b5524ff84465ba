//! Orchestrator: one tick loop per symbol over a shared sink and portfolio
//!
//! Backtester, paper trader, and live trader are the same `Trader` wired
//! with a different feed/sink pair; the loop itself never changes. The
//! backtest run terminates at end of stream, paper and live run until the
//! shutdown signal flips.

mod worker;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::common::channels::create_engine_channel;
use crate::common::errors::Result;
use crate::common::types::{EngineEvent, Fill, Rejection};
use crate::compliance::ComplianceGate;
use crate::config::types::{AppConfig, FillPolicy, RiskParameters};
use crate::execution::BoxedSink;
use crate::feed::BoxedFeed;
use crate::indicator::IndicatorEngine;
use crate::portfolio::Portfolio;
use crate::risk::RiskManager;
use crate::strategy::StrategyEngine;

pub use worker::SymbolWorker;

/// Aggregated outcome of a run
#[derive(Debug, Default)]
pub struct RunReport {
    pub signals: u64,
    pub fills: Vec<Fill>,
    pub rejections: Vec<Rejection>,
    pub compliance_rejections: u64,
    pub worker_failures: Vec<(String, String)>,
    pub equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    pub final_equity: Decimal,
    pub realized_pnl: Decimal,
}

impl RunReport {
    fn record(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SignalGenerated { .. } => self.signals += 1,
            EngineEvent::OrderFilled(fill) => self.fills.push(fill),
            EngineEvent::OrderRejected(rejection) => self.rejections.push(rejection),
            EngineEvent::ComplianceRejected { .. } => self.compliance_rejections += 1,
            EngineEvent::WorkerFailed { symbol, error } => {
                self.worker_failures.push((symbol, error))
            }
            EngineEvent::FeedEnded { .. } => {}
            EngineEvent::EquityMark { timestamp, equity } => {
                self.equity_curve.push((timestamp, equity))
            }
        }
    }
}

/// Drives the tick loop across all subscribed symbols.
///
/// Owns the shared state and injects it into each worker at construction:
/// the portfolio and sink behind their serialized access points, the
/// compliance gate, and a fresh indicator/strategy pair per symbol.
pub struct Trader {
    portfolio: Arc<Mutex<Portfolio>>,
    sink: Arc<Mutex<BoxedSink>>,
    gate: Arc<dyn ComplianceGate>,
    marks: Arc<Mutex<HashMap<String, Decimal>>>,
    feeds: Vec<BoxedFeed>,
    sma_window: usize,
    bar_interval: Duration,
    risk_params: RiskParameters,
    fill_policy: FillPolicy,
}

impl Trader {
    pub fn new(config: &AppConfig, sink: BoxedSink, gate: Arc<dyn ComplianceGate>) -> Self {
        Self {
            portfolio: Arc::new(Mutex::new(Portfolio::new(config.engine.initial_balance))),
            sink: Arc::new(Mutex::new(sink)),
            gate,
            marks: Arc::new(Mutex::new(HashMap::new())),
            feeds: Vec::new(),
            sma_window: config.engine.sma_window,
            bar_interval: Duration::seconds(config.engine.bar_interval_secs),
            risk_params: config.risk.clone(),
            fill_policy: config.backtest.fill_policy,
        }
    }

    /// Register a feed; one worker is spawned per registered feed
    pub fn add_feed(&mut self, feed: BoxedFeed) {
        self.feeds.push(feed);
    }

    /// Shared portfolio handle, e.g. for inspection after a run
    pub fn portfolio(&self) -> Arc<Mutex<Portfolio>> {
        self.portfolio.clone()
    }

    /// Spawn workers and collect events until every worker has ended.
    ///
    /// A worker failure is recorded and leaves the remaining workers
    /// running. Flipping `shutdown` to true stops all workers cooperatively
    /// between ticks.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<RunReport> {
        let (events_tx, mut events_rx) = create_engine_channel();

        let mut handles = Vec::with_capacity(self.feeds.len());
        for feed in self.feeds.drain(..) {
            let symbol = feed.symbol().to_string();
            let worker = SymbolWorker::new(
                feed,
                IndicatorEngine::new(&symbol, self.sma_window, self.bar_interval),
                StrategyEngine::new(&symbol, RiskManager::new(self.risk_params.clone())),
                self.portfolio.clone(),
                self.sink.clone(),
                self.gate.clone(),
                self.marks.clone(),
                events_tx.clone(),
                shutdown.clone(),
                self.fill_policy,
            );
            handles.push(tokio::spawn(worker.run()));
        }
        // Workers hold the only remaining senders; the event stream ends
        // when the last worker does
        drop(events_tx);

        let mut report = RunReport::default();
        while let Some(event) = events_rx.recv().await {
            report.record(event);
        }
        for handle in handles {
            let _ = handle.await;
        }

        let portfolio = self.portfolio.lock().await;
        let marks = self.marks.lock().await;
        report.final_equity = portfolio.equity(&marks);
        report.realized_pnl = portfolio.realized_pnl();

        info!(
            "Run complete: {} signals, {} fills, {} rejections, final equity {}",
            report.signals,
            report.fills.len(),
            report.rejections.len(),
            report.final_equity
        );
        Ok(report)
    }
}
