use super::{MAX_CONSUME_MESSAGES, NativeConsumer};
use crate::{
    codec::{Deserializer, FromPayload, Payload, resolve},
    error::{CodecError, KafkaError, Result},
    message::{CommitMode, Message, OwnedMessage, TopicPartitionList},
    util::Timeout,
};
use std::{fmt, sync::Arc};

/// A fetched item: a deserialized message, or the untouched raw message
/// when it carries an error or event.
pub type ConsumeResult<K, V> = std::result::Result<Message<K, V>, (KafkaError, OwnedMessage)>;

/// A consumer applying key and value deserializers to fetched messages.
///
/// Deserializers and batch consumption exclude each other: a consumer built
/// with an instance deserializer refuses [`consume`](Consumer::consume).
pub struct Consumer<K, V, N> {
    native: N,
    key_deserializer: Option<Arc<dyn Deserializer<K>>>,
    value_deserializer: Option<Arc<dyn Deserializer<V>>>,
    closed: bool,
}

impl<K, V, N> fmt::Debug for Consumer<K, V, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("key_deserializer", &self.key_deserializer.is_some())
            .field("value_deserializer", &self.value_deserializer.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn deserialize<T: FromPayload>(
    deserializer: Option<&dyn Deserializer<T>>,
    topic: &str,
    payload: Payload,
) -> Result<T, CodecError> {
    match deserializer {
        Some(deserializer) => deserializer
            .deserialize(topic, payload.as_deref())
            .map_err(CodecError::from),
        None => T::from_payload(payload),
    }
}

impl<K, V, N> Consumer<K, V, N>
where
    N: NativeConsumer,
{
    pub(super) fn from_parts(
        native: N,
        key_deserializer: Option<Arc<dyn Deserializer<K>>>,
        value_deserializer: Option<Arc<dyn Deserializer<V>>>,
    ) -> Self {
        Self {
            native,
            key_deserializer,
            value_deserializer,
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

    pub fn subscribe(&self, topics: &[&str]) -> Result<()> {
        self.ensure_open()?;
        self.native.subscribe(topics)
    }

    pub fn unsubscribe(&self) -> Result<()> {
        self.ensure_open()?;
        self.native.unsubscribe()
    }

    pub fn assignment(&self) -> Result<TopicPartitionList> {
        self.ensure_open()?;
        self.native.assignment()
    }

    /// Fetches one message, serving pending callbacks, and deserializes it
    /// with the instance deserializers.
    ///
    /// Returns `Ok(None)` when `timeout` elapses with nothing available.
    pub fn poll<T>(&self, timeout: T) -> Result<Option<ConsumeResult<K, V>>>
    where
        T: Into<Timeout>,
        K: FromPayload,
        V: FromPayload,
    {
        self.poll_with(timeout, None, None)
    }

    /// Like [`poll`](Consumer::poll), with deserializers overriding the
    /// instance ones for this call only.
    ///
    /// Messages carrying an error are returned as `Err((error, message))`
    /// without running any deserializer.
    ///
    /// A failing deserializer returns the codec error and the message is
    /// lost: the native consumer has already moved past it, and neither the
    /// raw message nor a key deserialized before a value failure is handed
    /// back. The next call returns the following message.
    pub fn poll_with<T>(
        &self,
        timeout: T,
        key_deserializer: Option<&dyn Deserializer<K>>,
        value_deserializer: Option<&dyn Deserializer<V>>,
    ) -> Result<Option<ConsumeResult<K, V>>>
    where
        T: Into<Timeout>,
        K: FromPayload,
        V: FromPayload,
    {
        self.ensure_open()?;

        let Some(mut msg) = self.native.poll(timeout.into())? else {
            return Ok(None);
        };
        if let Some(err) = msg.error().cloned() {
            return Ok(Some(Err((err, msg))));
        }

        let (raw_key, raw_value) = msg.take_slots();

        let key_deserializer = resolve(key_deserializer, self.key_deserializer.as_deref());
        let key = deserialize(key_deserializer, msg.topic(), raw_key)
            .map_err(KafkaError::KeyDeserialization)?;

        let value_deserializer = resolve(value_deserializer, self.value_deserializer.as_deref());
        let value = deserialize(value_deserializer, msg.topic(), raw_value)
            .map_err(KafkaError::ValueDeserialization)?;

        Ok(Some(Ok(msg.set_key(key).set_value(value))))
    }

    /// Fetches up to `num_messages` raw messages.
    ///
    /// Fails with [`KafkaError::BatchWithDeserializers`] if the consumer has
    /// an instance deserializer, and with [`KafkaError::InvalidArgument`] if
    /// `num_messages` exceeds [`MAX_CONSUME_MESSAGES`]; in both cases the
    /// native consumer is not called. Each returned message may carry an
    /// error and must be checked.
    pub fn consume<T>(&self, num_messages: usize, timeout: T) -> Result<Vec<OwnedMessage>>
    where
        T: Into<Timeout>,
    {
        self.ensure_open()?;

        if self.key_deserializer.is_some() || self.value_deserializer.is_some() {
            return Err(KafkaError::BatchWithDeserializers);
        }
        if num_messages > MAX_CONSUME_MESSAGES {
            return Err(KafkaError::InvalidArgument(format!(
                "num_messages must be between 0 and {MAX_CONSUME_MESSAGES}, got {num_messages}"
            )));
        }

        self.native.consume(num_messages, timeout.into())
    }

    /// Commits the current positions of the assigned partitions.
    pub fn commit(&self, mode: CommitMode) -> Result<()> {
        self.ensure_open()?;
        self.native.commit(mode)
    }

    /// Leaves the group and releases the native consumer. Later calls fail
    /// with [`KafkaError::ClientClosed`].
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.native.close()
    }

    pub fn native(&self) -> &N {
        &self.native
    }
}
