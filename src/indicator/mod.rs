//! Incremental indicator computation over the canonical bar sequence

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::types::Bar;

/// Derived series values for one bar.
///
/// `None` means the value is not yet available (insufficient history, or a
/// degenerate min == max range for normalization). Unavailable is never
/// silently defaulted to zero; strategies treat it as "no signal".
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Arithmetic mean of the trailing `window` closes
    pub sma: Option<Decimal>,
    /// Close scaled into [0, 1] against the min/max observed so far in this
    /// run. Values early in a run are not comparable across runs of
    /// different length; known limitation, kept for backtest parity.
    pub normalized_close: Option<Decimal>,
}

impl IndicatorSnapshot {
    /// The SMA, or `IndicatorUnavailable` when history is insufficient
    pub fn require_sma(&self, needed: usize, have: usize) -> Result<Decimal> {
        self.sma.ok_or(EngineError::IndicatorUnavailable {
            symbol: self.symbol.clone(),
            needed,
            have,
        })
    }
}

/// Per-symbol rolling indicator state.
///
/// One instance per symbol worker; the window deque and min/max trackers are
/// never shared across symbols. Duplicate timestamps are dropped and gaps
/// are forward-filled with the last known close before the new bar enters
/// the window.
pub struct IndicatorEngine {
    symbol: String,
    window: usize,
    interval: Duration,
    closes: VecDeque<Decimal>,
    /// Total bars ingested, forward-fills included. The SMA needs `window`
    /// prior observations, so it first becomes valid on bar `window + 1`.
    seen: usize,
    min_close: Option<Decimal>,
    max_close: Option<Decimal>,
    last_timestamp: Option<DateTime<Utc>>,
    last_close: Option<Decimal>,
}

impl IndicatorEngine {
    pub fn new(symbol: impl Into<String>, window: usize, interval: Duration) -> Self {
        Self {
            symbol: symbol.into(),
            window,
            interval,
            closes: VecDeque::with_capacity(window),
            seen: 0,
            min_close: None,
            max_close: None,
            last_timestamp: None,
            last_close: None,
        }
    }

    /// Number of closes currently in the window
    pub fn observations(&self) -> usize {
        self.closes.len()
    }

    /// Ingest a bar and produce a snapshot.
    ///
    /// Returns `None` when the bar is a duplicate (timestamp at or before
    /// the last accepted one) and was dropped before reaching the window.
    pub fn update(&mut self, bar: &Bar) -> Option<IndicatorSnapshot> {
        if let Some(last) = self.last_timestamp {
            if bar.timestamp <= last {
                debug!(
                    "Dropping duplicate bar for {} at {} (last seen {})",
                    self.symbol, bar.timestamp, last
                );
                return None;
            }
            self.forward_fill(last, bar.timestamp);
        }

        self.push_close(bar.close);
        self.last_timestamp = Some(bar.timestamp);
        self.last_close = Some(bar.close);

        Some(self.snapshot(bar))
    }

    /// Fill interval-sized gaps with the last known close.
    ///
    /// Filling more than `window` slots cannot change the window contents
    /// (it would hold only the filled value), so the fill count is capped.
    fn forward_fill(&mut self, last: DateTime<Utc>, next: DateTime<Utc>) {
        let Some(fill_value) = self.last_close else {
            return;
        };

        let gap = next - last;
        let missing = (gap.num_seconds() / self.interval.num_seconds() - 1).max(0);
        if missing == 0 {
            return;
        }

        let fills = (missing as usize).min(self.window);
        warn!(
            "Forward-filling {} missing bar(s) for {} between {} and {}",
            missing, self.symbol, last, next
        );
        for _ in 0..fills {
            self.push_close(fill_value);
        }
    }

    fn push_close(&mut self, close: Decimal) {
        if self.closes.len() == self.window {
            self.closes.pop_front();
        }
        self.closes.push_back(close);
        self.seen = self.seen.saturating_add(1);

        self.min_close = Some(match self.min_close {
            Some(min) => min.min(close),
            None => close,
        });
        self.max_close = Some(match self.max_close {
            Some(max) => max.max(close),
            None => close,
        });
    }

    fn snapshot(&self, bar: &Bar) -> IndicatorSnapshot {
        // Mean of the trailing `window` closes, valid once `window` prior
        // observations exist (the current bar does not count toward them)
        let sma = if self.seen > self.window {
            let sum: Decimal = self.closes.iter().sum();
            Some(sum / Decimal::from(self.window as u64))
        } else {
            None
        };

        let normalized_close = match (self.min_close, self.max_close) {
            (Some(min), Some(max)) if max > min => Some((bar.close - min) / (max - min)),
            _ => None,
        };

        IndicatorSnapshot {
            symbol: self.symbol.clone(),
            timestamp: bar.timestamp,
            sma,
            normalized_close,
        }
    }
}
