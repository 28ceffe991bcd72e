use crate::{codec::Payload, error::KafkaError};
use std::fmt;
use typed_builder::TypedBuilder;

/// Partition sentinel asking the native client to choose a partition through
/// its configured partitioner.
pub const PARTITION_UA: i32 = -1;

/// Offset of a message that has not been assigned one yet.
pub const OFFSET_INVALID: i64 = -1001;

/// Outcome of a produced message, handed to its delivery callback.
///
/// The message carries the wire representation that was enqueued.
pub type DeliveryResult = Result<OwnedMessage, (KafkaError, OwnedMessage)>;

/// Per-message completion callback.
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryResult) + Send + 'static>;

/// Timestamp of a Kafka message.
#[derive(Debug, PartialOrd, Ord, PartialEq, Eq, Clone, Copy, Default)]
pub enum Timestamp {
    /// Timestamp not available.
    #[default]
    NotAvailable,
    /// Message creation time.
    CreateTime(i64),
    /// Log append time.
    LogAppendTime(i64),
}

impl Timestamp {
    /// Milliseconds since the Unix epoch, if available.
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            Timestamp::NotAvailable => None,
            Timestamp::CreateTime(t) | Timestamp::LogAppendTime(t) => Some(*t),
        }
    }
}

/// A single message header. Header values may be null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

/// A collection of Kafka message headers that owns its backing data.
///
/// Kafka supports associating an array of key-value pairs to every message.
/// Keys need not be unique and their order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnedHeaders(Vec<Header>);

impl OwnedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, returning the updated collection.
    pub fn insert<K, V>(mut self, key: K, value: Option<V>) -> Self
    where
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        self.0.push(Header {
            key: key.into(),
            value: value.map(|v| v.as_ref().to_vec()),
        });
        self
    }

    /// Returns the value of the last header named `key`.
    pub fn get_last(&self, key: &str) -> Option<&Header> {
        self.0.iter().rev().find(|h| h.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, Option<V>)> for OwnedHeaders
where
    K: Into<String>,
    V: AsRef<[u8]>,
{
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(OwnedHeaders::new(), |headers, (k, v)| headers.insert(k, v))
    }
}

/// A Kafka message that owns its backing data.
///
/// Key and value slots are typed: [`OwnedMessage`] is the raw wire form
/// returned by native clients, consumer shims turn it into a
/// `Message<K, V>` by running their deserializers.
///
/// A message whose [`error`](Message::error) is set does not carry data:
/// it reports an event or a failure (e.g. partition EOF).
#[derive(Debug, Clone)]
pub struct Message<K = Payload, V = Payload> {
    topic: String,
    partition: i32,
    offset: i64,
    key: K,
    value: V,
    timestamp: Timestamp,
    headers: Option<OwnedHeaders>,
    error: Option<KafkaError>,
}

/// The wire form of a message.
pub type OwnedMessage = Message<Payload, Payload>;

impl OwnedMessage {
    /// Creates a new raw message with the specified content.
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Payload,
        value: Payload,
        timestamp: Timestamp,
        headers: Option<OwnedHeaders>,
    ) -> OwnedMessage {
        Message {
            topic: topic.into(),
            partition,
            offset,
            key,
            value,
            timestamp,
            headers,
            error: None,
        }
    }

    /// Creates a message representing an error event.
    pub fn from_error(topic: impl Into<String>, partition: i32, offset: i64, error: KafkaError) -> Self {
        Message {
            error: Some(error),
            ..OwnedMessage::new(topic, partition, offset, None, None, Timestamp::NotAvailable, None)
        }
    }

    /// Returns the raw key bytes.
    pub fn key_bytes(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    /// Returns the raw value bytes.
    pub fn payload(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Returns the value decoded as UTF-8, if present and valid.
    pub fn payload_view(&self) -> Option<Result<&str, std::str::Utf8Error>> {
        self.payload().map(std::str::from_utf8)
    }

    /// Moves key and value out, leaving null slots behind.
    pub(crate) fn take_slots(&mut self) -> (Payload, Payload) {
        (self.key.take(), self.value.take())
    }
}

impl<K, V> Message<K, V> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn headers(&self) -> Option<&OwnedHeaders> {
        self.headers.as_ref()
    }

    /// The error slot, `None` for genuine data messages.
    pub fn error(&self) -> Option<&KafkaError> {
        self.error.as_ref()
    }

    /// Replaces the key slot, possibly changing its type.
    pub fn set_key<K2>(self, key: K2) -> Message<K2, V> {
        Message {
            topic: self.topic,
            partition: self.partition,
            offset: self.offset,
            key,
            value: self.value,
            timestamp: self.timestamp,
            headers: self.headers,
            error: self.error,
        }
    }

    /// Replaces the value slot, possibly changing its type.
    pub fn set_value<V2>(self, value: V2) -> Message<K, V2> {
        Message {
            topic: self.topic,
            partition: self.partition,
            offset: self.offset,
            key: self.key,
            value,
            timestamp: self.timestamp,
            headers: self.headers,
            error: self.error,
        }
    }

    pub fn into_key(self) -> K {
        self.key
    }

    pub fn into_value(self) -> V {
        self.value
    }

    /// Splits the message into its key and value.
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }

    pub(crate) fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    pub(crate) fn set_partition(&mut self, partition: i32) {
        self.partition = partition;
    }

    pub(crate) fn set_error(&mut self, error: Option<KafkaError>) {
        self.error = error;
    }
}

/// A record as handed to a native producer: key and payload already in
/// their wire representation.
#[derive(TypedBuilder)]
pub struct BaseRecord {
    /// Required destination topic.
    #[builder(setter(into))]
    pub topic: String,
    /// Optional destination partition.
    #[builder(default = PARTITION_UA)]
    pub partition: i32,
    /// Optional payload.
    #[builder(default)]
    pub payload: Payload,
    /// Optional key.
    #[builder(default)]
    pub key: Payload,
    /// Optional timestamp, `0` meaning "now".
    ///
    /// Note that Kafka represents timestamps as the number of milliseconds
    /// since the Unix epoch.
    #[builder(default)]
    pub timestamp: i64,
    /// Optional message headers.
    #[builder(default, setter(strip_option))]
    pub headers: Option<OwnedHeaders>,
    /// Completion callback served when the delivery report is drained.
    #[builder(default, setter(strip_option))]
    pub on_delivery: Option<DeliveryCallback>,
}

impl fmt::Debug for BaseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRecord")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("payload", &self.payload)
            .field("key", &self.key)
            .field("timestamp", &self.timestamp)
            .field("headers", &self.headers)
            .field("on_delivery", &self.on_delivery.is_some())
            .finish()
    }
}

/// Selects how a consumer commit is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Block until the commit completes.
    Sync,
    /// Return immediately, the result is reported to the commit callback.
    Async,
}

/// One element of a topic partition list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartitionListElem {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A list of topic, partition and offset triples, as reported by commits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPartitionList {
    list: Vec<TopicPartitionListElem>,
}

impl TopicPartitionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_partition_offset(&mut self, topic: &str, partition: i32, offset: i64) {
        self.list.push(TopicPartitionListElem {
            topic: topic.to_string(),
            partition,
            offset,
        });
    }

    pub fn find_partition(&self, topic: &str, partition: i32) -> Option<&TopicPartitionListElem> {
        self.list
            .iter()
            .find(|e| e.topic == topic && e.partition == partition)
    }

    pub fn elements(&self) -> &[TopicPartitionListElem] {
        &self.list
    }

    pub fn count(&self) -> usize {
        self.list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_change_type_in_place() {
        let raw = OwnedMessage::new(
            "t",
            1,
            42,
            Some(b"abc".to_vec()),
            Some(b"7".to_vec()),
            Timestamp::CreateTime(10),
            Some(OwnedHeaders::new().insert("h", Some("v"))),
        );
        let typed = raw.set_key("abc".to_string()).set_value(7_u32);

        assert_eq!(typed.key(), "abc");
        assert_eq!(*typed.value(), 7);
        assert_eq!(typed.topic(), "t");
        assert_eq!(typed.partition(), 1);
        assert_eq!(typed.offset(), 42);
        assert_eq!(typed.timestamp().to_millis(), Some(10));
        assert!(typed.error().is_none());
        assert_eq!(
            typed
                .headers()
                .and_then(|h| h.get_last("h"))
                .and_then(|h| h.value.as_deref()),
            Some(b"v".as_slice())
        );
    }

    #[test]
    fn error_messages() {
        let msg = OwnedMessage::from_error("t", 0, 5, KafkaError::PartitionEOF(0));
        assert!(matches!(msg.error(), Some(KafkaError::PartitionEOF(0))));
        assert_eq!(msg.payload(), None);
    }

    #[test]
    fn headers_keep_order_and_nulls() {
        let headers: OwnedHeaders = [("a", Some("1")), ("b", None), ("a", Some("2"))]
            .into_iter()
            .collect();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get_last("a").and_then(|h| h.value.as_deref()), Some(b"2".as_slice()));
        assert_eq!(headers.get_last("b").map(|h| h.value.is_none()), Some(true));
    }
}
