//! Channel type definitions for inter-task communication

use tokio::sync::mpsc;

use super::types::{EngineEvent, FeedEvent};

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create a new feed event channel with the default buffer size
pub fn create_feed_channel() -> (mpsc::Sender<FeedEvent>, mpsc::Receiver<FeedEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new engine event channel with the default buffer size
pub fn create_engine_channel() -> (mpsc::Sender<EngineEvent>, mpsc::Receiver<EngineEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new feed event channel with a custom buffer size
pub fn create_feed_channel_with_size(
    size: usize,
) -> (mpsc::Sender<FeedEvent>, mpsc::Receiver<FeedEvent>) {
    mpsc::channel(size)
}
