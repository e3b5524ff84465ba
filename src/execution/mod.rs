//! Execution sinks: one submit contract over backtest, paper, and live
//! order routing

pub mod backtest;
pub mod live;
pub mod paper;

use async_trait::async_trait;

use crate::common::types::{Bar, Fill, OrderIntent, Rejection};

/// Outcome of a submission: a fill or a recorded rejection.
///
/// Rejections are data, not errors; the orchestrator logs them and discards
/// the intent without resubmitting.
pub type SubmitResult = std::result::Result<Fill, Rejection>;

/// Uniform execution contract.
///
/// All three implementations settle orders through the same `Fill` shape, so
/// portfolio updates are identical whether the order was simulated or real;
/// that uniformity is what makes the orchestrators interchangeable.
#[async_trait]
pub trait ExecutionSink: Send {
    /// Submit an intent and resolve it to a fill or rejection.
    ///
    /// Never hangs indefinitely: live submissions are bounded by a timeout
    /// and resolve to `Rejection` on expiry.
    async fn submit(&mut self, intent: &OrderIntent) -> SubmitResult;

    /// Observe a bar from the feed. Paper fills price off the latest
    /// observed bar; the backtest sink ignores it.
    fn observe_bar(&mut self, _bar: &Bar) {}

    /// Sink name for logs and reports
    fn name(&self) -> &'static str;
}

/// Boxed sink for dynamic dispatch
pub type BoxedSink = Box<dyn ExecutionSink>;

pub use backtest::BacktestSink;
pub use live::LiveSink;
pub use paper::PaperSink;
