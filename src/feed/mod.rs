//! Market data feeds: a uniform pull contract over live and historical bars

pub mod historical;
pub mod live;

use async_trait::async_trait;

use crate::common::errors::Result;
use crate::common::types::Bar;

/// Pull-based bar source.
///
/// `next` suspends until a complete bar is available. `Ok(None)` is a clean
/// end of stream (historical feeds end at their last bar); a feed that cannot
/// recover its transport within the retry budget returns
/// `EngineError::FeedFailure` instead of erroring mid-pipeline.
#[async_trait]
pub trait MarketFeed: Send {
    /// The next bar, end of stream, or a fatal feed failure
    async fn next(&mut self) -> Result<Option<Bar>>;

    /// Symbol this feed produces bars for
    fn symbol(&self) -> &str;
}

/// Boxed feed for dynamic dispatch
pub type BoxedFeed = Box<dyn MarketFeed>;

pub use historical::HistoricalFeed;
pub use live::LiveFeed;
