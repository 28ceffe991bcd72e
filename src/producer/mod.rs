use crate::{
    client::{ClientContext, DefaultClientContext},
    config::ClientConfig,
    error::Result,
    log::warn,
    message::{BaseRecord, DeliveryResult},
    util::Timeout,
};
pub use builder::ProducerBuilder;
pub use shim::{DeliveryFuture, Producer, Record};
use std::sync::Arc;

mod builder;
mod shim;

/// Producer-level callbacks, see [`ClientContext`] for the dispatch rules.
pub trait ProducerContext: ClientContext {
    /// Receives delivery reports of records produced without a per-message
    /// callback.
    fn delivery(&self, result: DeliveryResult) {
        if let Err((err, msg)) = result {
            warn!(
                "failed to deliver message to {} [{}]: {}",
                msg.topic(),
                msg.partition(),
                err
            );
        }
    }
}

impl<C: ProducerContext + ?Sized> ProducerContext for Arc<C> {
    fn delivery(&self, result: DeliveryResult) {
        (**self).delivery(result)
    }
}

#[derive(Default, Clone, Debug)]
pub struct DefaultProducerContext(DefaultClientContext);

impl ClientContext for DefaultProducerContext {}

impl ProducerContext for DefaultProducerContext {}

/// The native producer a [`Producer`] delegates to.
///
/// Implementations own connections, buffering, partitioning and retries.
/// Completed deliveries and client events must be queued internally and only
/// handed to callbacks from [`poll`](NativeProducer::poll) and
/// [`flush`](NativeProducer::flush), on the calling thread.
pub trait NativeProducer: Sized + Send + Sync {
    type Context: ProducerContext;

    /// Creates a native producer from an opaque configuration.
    fn from_config(config: ClientConfig, context: Self::Context) -> Result<Self>;

    /// Enqueues a record for transmission without waiting for it to be sent.
    fn produce(&self, record: BaseRecord) -> Result<()>;

    /// Serves queued callbacks, waiting up to `timeout` for the first one.
    /// Returns the number of events served.
    fn poll(&self, timeout: Timeout) -> Result<usize>;

    /// Serves callbacks until no message awaits a delivery report.
    fn flush(&self, timeout: Timeout) -> Result<()>;

    /// Number of messages awaiting a delivery report.
    fn in_flight_count(&self) -> usize;

    /// Releases the native resources. Any later call fails.
    fn close(&self) -> Result<()>;
}
