//! Bounded feed over a pre-ordered historical bar sequence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::collections::VecDeque;

use super::MarketFeed;
use crate::common::errors::Result;
use crate::common::types::Bar;

/// Feed over a bounded historical sequence.
///
/// Bars are sorted by timestamp at construction and duplicate timestamps are
/// merged keep-latest, so downstream consumers see a strictly increasing
/// sequence. The stream ends deterministically at the last bar.
pub struct HistoricalFeed {
    symbol: String,
    bars: VecDeque<Bar>,
}

impl HistoricalFeed {
    /// Build a feed from raw bars, sorting and merging duplicates
    pub fn from_bars(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        // BTreeMap insertion both orders by timestamp and keeps the
        // last-seen bar for a duplicate timestamp
        let mut ordered: BTreeMap<DateTime<Utc>, Bar> = BTreeMap::new();
        for bar in bars {
            ordered.insert(bar.timestamp, bar);
        }

        Self {
            symbol: symbol.into(),
            bars: ordered.into_values().collect(),
        }
    }

    /// Restrict the feed to an inclusive timestamp range
    pub fn with_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.bars.retain(|b| b.timestamp >= start && b.timestamp <= end);
        self
    }

    /// Remaining bar count
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[async_trait]
impl MarketFeed for HistoricalFeed {
    async fn next(&mut self) -> Result<Option<Bar>> {
        Ok(self.bars.pop_front())
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn bar(minute: u32, close: Decimal) -> Bar {
        let timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 0, minute, 59).unwrap();
        Bar {
            symbol: "BTCUSDT".to_string(),
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    #[tokio::test]
    async fn bars_are_delivered_in_timestamp_order() {
        let mut feed = HistoricalFeed::from_bars(
            "BTCUSDT",
            vec![bar(2, dec!(102)), bar(0, dec!(100)), bar(1, dec!(101))],
        );

        let mut closes = Vec::new();
        while let Some(b) = feed.next().await.unwrap() {
            closes.push(b.close);
        }
        assert_eq!(closes, vec![dec!(100), dec!(101), dec!(102)]);
    }

    #[tokio::test]
    async fn duplicate_timestamps_keep_latest() {
        let mut feed = HistoricalFeed::from_bars(
            "BTCUSDT",
            vec![bar(0, dec!(100)), bar(1, dec!(101)), bar(1, dec!(999))],
        );

        assert_eq!(feed.len(), 2);
        feed.next().await.unwrap();
        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(second.close, dec!(999));
    }

    #[tokio::test]
    async fn stream_ends_deterministically() {
        let mut feed = HistoricalFeed::from_bars("BTCUSDT", vec![bar(0, dec!(100))]);
        assert!(feed.next().await.unwrap().is_some());
        assert!(feed.next().await.unwrap().is_none());
        assert!(feed.next().await.unwrap().is_none());
    }

    #[test]
    fn range_filter_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 1, 59).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 2, 59).unwrap();
        let feed = HistoricalFeed::from_bars(
            "BTCUSDT",
            vec![bar(0, dec!(100)), bar(1, dec!(101)), bar(2, dec!(102)), bar(3, dec!(103))],
        )
        .with_range(start, end);
        assert_eq!(feed.len(), 2);
    }
}
