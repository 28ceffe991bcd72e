use std::{error::Error as StdError, fmt, sync::Arc};

pub type Result<T, E = KafkaError> = std::prelude::v1::Result<T, E>;

/// Error produced inside a user codec hook.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Native error codes surfaced by this layer.
///
/// Names follow librdkafka's `rd_kafka_resp_err_t`; the discriminants are the
/// native numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(i32)]
pub enum ErrorCode {
    /// Broker disconnected before response was received.
    BrokerTransportFailure = -195,
    /// Generic failure.
    Fail = -196,
    /// Produced message timed out.
    MessageTimedOut = -192,
    /// Reached the end of the partition.
    PartitionEOF = -191,
    /// Unknown partition.
    UnknownPartition = -190,
    /// Invalid argument.
    InvalidArgument = -186,
    /// Operation timed out.
    OperationTimedOut = -185,
    /// Outbound queue is full.
    QueueFull = -184,
    /// No offset to commit.
    NoOffset = -168,
    /// Fatal error, check the client's fatal error state.
    Fatal = -150,
    /// Unknown topic or partition.
    UnknownTopicOrPartition = 3,
    /// Message batch larger than the configured segment size.
    MessageSizeTooLarge = 10,
    /// Request timed out.
    RequestTimedOut = 7,
    /// Not enough in-sync replicas.
    NotEnoughReplicas = 19,
}

impl ErrorCode {
    /// Returns `true` for codes generated by the client itself rather than
    /// returned by a broker.
    pub fn is_local(&self) -> bool {
        (*self as i32) < 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            ErrorCode::BrokerTransportFailure => "broker transport failure",
            ErrorCode::Fail => "local: failure",
            ErrorCode::MessageTimedOut => "local: message timed out",
            ErrorCode::PartitionEOF => "broker: no more messages",
            ErrorCode::UnknownPartition => "local: unknown partition",
            ErrorCode::InvalidArgument => "local: invalid argument or configuration",
            ErrorCode::OperationTimedOut => "local: timed out",
            ErrorCode::QueueFull => "local: queue full",
            ErrorCode::NoOffset => "local: no offset stored",
            ErrorCode::Fatal => "local: fatal error",
            ErrorCode::UnknownTopicOrPartition => "broker: unknown topic or partition",
            ErrorCode::MessageSizeTooLarge => "broker: message size too large",
            ErrorCode::RequestTimedOut => "broker: request timed out",
            ErrorCode::NotEnoughReplicas => "broker: not enough in-sync replicas",
        };
        write!(f, "{description} ({})", *self as i32)
    }
}

/// The error returned by a serializer or deserializer.
///
/// The hook's own error is kept untouched and exposed through
/// [`std::error::Error::source`].
#[derive(Clone)]
pub struct CodecError(Arc<dyn StdError + Send + Sync>);

impl CodecError {
    pub fn new(err: BoxError) -> Self {
        Self(Arc::from(err))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(message.into())
    }

    /// Returns the error raised by the hook.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for CodecError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<BoxError> for CodecError {
    fn from(value: BoxError) -> Self {
        Self::new(value)
    }
}

/// Represents all possible Kafka errors.
///
/// If applicable, check the underlying [`ErrorCode`] to get details.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum KafkaError {
    /// Batch consumption was requested on a consumer with deserializers.
    #[error("batch consumption does not support the use of deserializers")]
    BatchWithDeserializers,
    /// The client was closed.
    #[error("client has been closed")]
    ClientClosed,
    /// Client creation failed.
    #[error("client creation error: {0}")]
    ClientCreation(String),
    /// Consumer commit failed.
    #[error("consumer commit error: {0}")]
    ConsumerCommit(ErrorCode),
    /// Flushing failed
    #[error("flush error: {0}")]
    Flush(ErrorCode),
    /// Global error.
    #[error("global error: {0}")]
    Global(ErrorCode),
    /// An argument was rejected before reaching the native client.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Key deserializer failed.
    #[error("key deserialization error: {0}")]
    KeyDeserialization(#[source] CodecError),
    /// Key serializer failed.
    #[error("key serialization error: {0}")]
    KeySerialization(#[source] CodecError),
    /// Message consumption failed.
    #[error("message consumption error: {0}")]
    MessageConsumption(ErrorCode),
    /// Message production error.
    #[error("message production error: {0}")]
    MessageProduction(ErrorCode),
    /// Mock cluster error
    #[error("mock cluster error: {0}")]
    MockCluster(ErrorCode),
    /// End of partition reached.
    #[error("partition EOF: {0}")]
    PartitionEOF(i32),
    /// Subscription creation failed.
    #[error("subscription error: {0}")]
    Subscription(ErrorCode),
    /// Value deserializer failed.
    #[error("value deserialization error: {0}")]
    ValueDeserialization(#[source] CodecError),
    /// Value serializer failed.
    #[error("value serialization error: {0}")]
    ValueSerialization(#[source] CodecError),
}

impl KafkaError {
    /// Returns the native error code, if the error carries one.
    pub fn rdkafka_error_code(&self) -> Option<ErrorCode> {
        match self {
            KafkaError::ConsumerCommit(code)
            | KafkaError::Flush(code)
            | KafkaError::Global(code)
            | KafkaError::MessageConsumption(code)
            | KafkaError::MessageProduction(code)
            | KafkaError::MockCluster(code)
            | KafkaError::Subscription(code) => Some(*code),
            KafkaError::PartitionEOF(_) => Some(ErrorCode::PartitionEOF),
            _ => None,
        }
    }

    /// Returns `true` if the error is caused by a user codec hook.
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            KafkaError::KeySerialization(_)
                | KafkaError::ValueSerialization(_)
                | KafkaError::KeyDeserialization(_)
                | KafkaError::ValueDeserialization(_)
        )
    }

    /// Returns `true` if the client cannot be used anymore.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KafkaError::ClientClosed)
            || self.rdkafka_error_code() == Some(ErrorCode::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn codec_error_keeps_source() {
        let err = KafkaError::ValueSerialization(CodecError::msg("not a number"));
        let source = err.source().expect("codec errors have a source");
        assert_eq!(source.to_string(), "not a number");
        assert!(err.is_codec_error());
        assert_eq!(err.rdkafka_error_code(), None);
    }

    #[test]
    fn error_codes() {
        assert!(ErrorCode::QueueFull.is_local());
        assert!(!ErrorCode::UnknownTopicOrPartition.is_local());
        assert_eq!(
            KafkaError::MessageProduction(ErrorCode::QueueFull).rdkafka_error_code(),
            Some(ErrorCode::QueueFull)
        );
        assert_eq!(
            KafkaError::PartitionEOF(2).rdkafka_error_code(),
            Some(ErrorCode::PartitionEOF)
        );
        assert!(KafkaError::ClientClosed.is_fatal());
    }
}
