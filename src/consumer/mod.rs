use crate::{
    client::{ClientContext, DefaultClientContext},
    config::ClientConfig,
    error::Result,
    log::{debug, warn},
    message::{CommitMode, OwnedMessage, TopicPartitionList},
    util::Timeout,
};
pub use builder::ConsumerBuilder;
pub use shim::{Consumer, ConsumeResult};
use std::sync::Arc;

mod builder;
mod shim;

/// Largest batch [`Consumer::consume`] accepts.
pub const MAX_CONSUME_MESSAGES: usize = 1_000_000;

/// Consumer-level callbacks, see [`ClientContext`] for the dispatch rules.
pub trait ConsumerContext: ClientContext {
    /// Receives the outcome of an offset commit.
    fn commit_callback(&self, result: Result<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!("committed {} offsets", offsets.count()),
            Err(err) => warn!("failed to commit offsets: {err}"),
        }
    }
}

impl<C: ConsumerContext + ?Sized> ConsumerContext for Arc<C> {
    fn commit_callback(&self, result: Result<()>, offsets: &TopicPartitionList) {
        (**self).commit_callback(result, offsets)
    }
}

#[derive(Default, Clone, Debug)]
pub struct DefaultConsumerContext(DefaultClientContext);

impl ClientContext for DefaultConsumerContext {}

impl ConsumerContext for DefaultConsumerContext {}

/// The native consumer a [`Consumer`] delegates to.
///
/// Implementations own group membership, fetching and offset storage.
/// Callbacks are served from [`poll`](NativeConsumer::poll),
/// [`consume`](NativeConsumer::consume) and synchronous commits only, on the
/// calling thread.
pub trait NativeConsumer: Sized + Send + Sync {
    type Context: ConsumerContext;

    /// Creates a native consumer from an opaque configuration.
    fn from_config(config: ClientConfig, context: Self::Context) -> Result<Self>;

    fn subscribe(&self, topics: &[&str]) -> Result<()>;

    fn unsubscribe(&self) -> Result<()>;

    /// Currently assigned partitions.
    fn assignment(&self) -> Result<TopicPartitionList>;

    /// Fetches one message, event or error, waiting up to `timeout`.
    fn poll(&self, timeout: Timeout) -> Result<Option<OwnedMessage>>;

    /// Fetches up to `num_messages`, waiting up to `timeout` in total.
    fn consume(&self, num_messages: usize, timeout: Timeout) -> Result<Vec<OwnedMessage>>;

    /// Commits the current positions.
    fn commit(&self, mode: CommitMode) -> Result<()>;

    /// Leaves the group and releases the native resources.
    fn close(&self) -> Result<()>;
}
