use super::NativeProducer;
use crate::{
    codec::{Payload, Serializer, ToPayload, resolve},
    error::{CodecError, KafkaError, Result},
    log::trace,
    message::{BaseRecord, DeliveryCallback, DeliveryResult, OwnedHeaders, PARTITION_UA},
    util::Timeout,
};
use futures::channel::oneshot;
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use typed_builder::TypedBuilder;

/// A message to produce, before serialization.
///
/// `on_delivery` and `callback` are two names for the same completion
/// callback. When both are set `on_delivery` is used.
#[derive(TypedBuilder)]
pub struct Record<'a, K: 'a, V: 'a> {
    /// Required destination topic.
    pub topic: &'a str,
    /// Optional payload, handed to the value serializer.
    #[builder(default, setter(strip_option))]
    pub value: Option<&'a V>,
    /// Optional key, handed to the key serializer.
    #[builder(default, setter(strip_option))]
    pub key: Option<&'a K>,
    /// Destination partition, [`PARTITION_UA`] lets the native partitioner
    /// choose.
    #[builder(default = PARTITION_UA)]
    pub partition: i32,
    #[builder(default, setter(strip_option))]
    pub on_delivery: Option<DeliveryCallback>,
    /// Alias of `on_delivery`.
    #[builder(default, setter(strip_option))]
    pub callback: Option<DeliveryCallback>,
    /// CreateTime in milliseconds since the Unix epoch, `0` meaning now.
    #[builder(default)]
    pub timestamp: i64,
    #[builder(default, setter(strip_option))]
    pub headers: Option<OwnedHeaders>,
    /// Overrides the producer's key serializer for this record only.
    #[builder(default, setter(strip_option))]
    pub key_serializer: Option<&'a dyn Serializer<K>>,
    /// Overrides the producer's value serializer for this record only.
    #[builder(default, setter(strip_option))]
    pub value_serializer: Option<&'a dyn Serializer<V>>,
}

impl<K, V> fmt::Debug for Record<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("timestamp", &self.timestamp)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A producer applying key and value serializers before handing records to
/// its native producer.
///
/// Delivery reports and client callbacks only run when the application calls
/// [`poll`](Producer::poll) or [`flush`](Producer::flush).
pub struct Producer<K, V, N> {
    native: N,
    key_serializer: Option<Arc<dyn Serializer<K>>>,
    value_serializer: Option<Arc<dyn Serializer<V>>>,
    closed: bool,
}

impl<K, V, N> fmt::Debug for Producer<K, V, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("key_serializer", &self.key_serializer.is_some())
            .field("value_serializer", &self.value_serializer.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn serialize<T: ToPayload>(
    serializer: Option<&dyn Serializer<T>>,
    topic: &str,
    value: Option<&T>,
) -> Result<Payload, CodecError> {
    match serializer {
        Some(serializer) => serializer.serialize(topic, value).map_err(CodecError::from),
        // no serializer: the value must already be in wire form
        None => Ok(value.map(ToPayload::to_payload).transpose()?.flatten()),
    }
}

impl<K, V, N> Producer<K, V, N>
where
    N: NativeProducer,
{
    pub(super) fn from_parts(
        native: N,
        key_serializer: Option<Arc<dyn Serializer<K>>>,
        value_serializer: Option<Arc<dyn Serializer<V>>>,
    ) -> Self {
        Self {
            native,
            key_serializer,
            value_serializer,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(KafkaError::ClientClosed)
        } else {
            Ok(())
        }
    }

    /// Serializes `record` and enqueues it with the native producer.
    ///
    /// Returns as soon as the record is queued. An empty topic or a negative
    /// partition other than [`PARTITION_UA`] fails with
    /// [`KafkaError::InvalidArgument`] before any serializer runs. Serializer failures are
    /// returned here and the record is not enqueued; a saturated outbound
    /// queue fails with [`ErrorCode::QueueFull`](crate::error::ErrorCode::QueueFull).
    pub fn produce(&self, record: Record<'_, K, V>) -> Result<()>
    where
        K: ToPayload,
        V: ToPayload,
    {
        self.ensure_open()?;

        let Record {
            topic,
            value,
            key,
            partition,
            on_delivery,
            callback,
            timestamp,
            headers,
            key_serializer,
            value_serializer,
        } = record;

        if topic.is_empty() {
            return Err(KafkaError::InvalidArgument("topic must not be empty".to_string()));
        }
        if partition < PARTITION_UA {
            return Err(KafkaError::InvalidArgument(format!(
                "partition must be PARTITION_UA or non-negative, got {partition}"
            )));
        }

        let on_delivery = on_delivery.or(callback);

        let key_serializer = resolve(key_serializer, self.key_serializer.as_deref());
        let key = serialize(key_serializer, topic, key).map_err(KafkaError::KeySerialization)?;

        let value_serializer = resolve(value_serializer, self.value_serializer.as_deref());
        let payload =
            serialize(value_serializer, topic, value).map_err(KafkaError::ValueSerialization)?;

        trace!("producing to {topic} [{partition}]");
        self.native.produce(BaseRecord {
            topic: topic.to_string(),
            partition,
            payload,
            key,
            timestamp,
            headers,
            on_delivery,
        })
    }

    /// Produces `record` and returns a future resolving to its delivery
    /// report.
    ///
    /// The future only completes once a later [`poll`](Producer::poll) or
    /// [`flush`](Producer::flush) serves the report. A callback set on the
    /// record still runs, before the future completes.
    pub fn send(&self, mut record: Record<'_, K, V>) -> Result<DeliveryFuture>
    where
        K: ToPayload,
        V: ToPayload,
    {
        let (tx, rx) = oneshot::channel();
        let user_callback = record.on_delivery.take().or(record.callback.take());
        let on_delivery: DeliveryCallback = Box::new(move |result: DeliveryResult| {
            if let Some(callback) = user_callback {
                callback(result.clone());
            }
            let _ = tx.send(result);
        });
        record.on_delivery = Some(on_delivery);
        self.produce(record)?;
        Ok(DeliveryFuture { rx })
    }

    /// Serves delivery reports and client callbacks on the calling thread,
    /// waiting up to `timeout` for the first one.
    pub fn poll<T>(&self, timeout: T) -> Result<usize>
    where
        T: Into<Timeout>,
    {
        self.ensure_open()?;
        self.native.poll(timeout.into())
    }

    /// Waits for every in-flight message to be reported, serving callbacks
    /// meanwhile.
    pub fn flush<T>(&self, timeout: T) -> Result<()>
    where
        T: Into<Timeout>,
    {
        self.ensure_open()?;
        self.native.flush(timeout.into())
    }

    /// Number of messages awaiting a delivery report.
    pub fn len(&self) -> usize {
        if self.closed {
            0
        } else {
            self.native.in_flight_count()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases the native producer. Later calls fail with
    /// [`KafkaError::ClientClosed`].
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.native.close()
    }

    pub fn native(&self) -> &N {
        &self.native
    }
}

/// A delivery report that becomes available once served by `poll`/`flush`.
///
/// Resolves to `Err(Canceled)` if the report is dropped unserved, e.g. when
/// the producer is closed with messages in flight.
#[derive(Debug)]
#[must_use = "delivery futures do nothing unless polled"]
pub struct DeliveryFuture {
    rx: oneshot::Receiver<DeliveryResult>,
}

impl Future for DeliveryFuture {
    type Output = Result<DeliveryResult, oneshot::Canceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx)
    }
}
