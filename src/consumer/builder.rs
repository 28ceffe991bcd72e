use super::{Consumer, ConsumerContext, DefaultConsumerContext, NativeConsumer};
use crate::{codec::Deserializer, config::ClientConfig, error::Result, log::debug};
use std::{marker::PhantomData, sync::Arc};

/// Builds a [`Consumer`] from a configuration, a context and optional
/// instance-scoped deserializers.
pub struct ConsumerBuilder<K, V, C = DefaultConsumerContext> {
    config: ClientConfig,
    context: C,
    key_deserializer: Option<Arc<dyn Deserializer<K>>>,
    value_deserializer: Option<Arc<dyn Deserializer<V>>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Consumer<K, V, ()> {
    pub fn builder() -> ConsumerBuilder<K, V> {
        ConsumerBuilder {
            config: ClientConfig::default(),
            context: DefaultConsumerContext::default(),
            key_deserializer: None,
            value_deserializer: None,
            _marker: PhantomData,
        }
    }
}

impl<K, V, C> ConsumerBuilder<K, V, C> {
    /// Sets the configuration handed to the native consumer.
    #[must_use]
    pub fn config<Q, R, I>(mut self, config: I) -> Self
    where
        Q: Into<String>,
        R: Into<String>,
        I: IntoIterator<Item = (Q, R)>,
    {
        self.config.extend(config);
        self
    }

    #[must_use]
    pub fn context<C2>(self, context: C2) -> ConsumerBuilder<K, V, C2>
    where
        C2: ConsumerContext,
    {
        let ConsumerBuilder {
            config,
            key_deserializer,
            value_deserializer,
            _marker,
            ..
        } = self;
        ConsumerBuilder {
            config,
            context,
            key_deserializer,
            value_deserializer,
            _marker,
        }
    }

    /// Sets the key deserializer. Consumers with a deserializer cannot
    /// batch-consume.
    #[must_use]
    pub fn key_deserializer<D>(mut self, deserializer: D) -> Self
    where
        D: Deserializer<K> + 'static,
    {
        self.key_deserializer = Some(Arc::new(deserializer));
        self
    }

    /// Sets the value deserializer. Consumers with a deserializer cannot
    /// batch-consume.
    #[must_use]
    pub fn value_deserializer<D>(mut self, deserializer: D) -> Self
    where
        D: Deserializer<V> + 'static,
    {
        self.value_deserializer = Some(Arc::new(deserializer));
        self
    }

    /// Creates the native consumer `N` and wraps it.
    pub fn try_build<N>(self) -> Result<Consumer<K, V, N>>
    where
        N: NativeConsumer<Context = C>,
    {
        let ConsumerBuilder {
            config,
            context,
            key_deserializer,
            value_deserializer,
            ..
        } = self;
        debug!(
            "creating consumer (key deserializer: {}, value deserializer: {})",
            key_deserializer.is_some(),
            value_deserializer.is_some()
        );
        let native = N::from_config(config, context)?;
        Ok(Consumer::from_parts(native, key_deserializer, value_deserializer))
    }

    /// Wraps an existing native consumer, ignoring the builder's
    /// configuration and context.
    pub fn build_with<N>(self, native: N) -> Consumer<K, V, N>
    where
        N: NativeConsumer,
    {
        Consumer::from_parts(native, self.key_deserializer, self.value_deserializer)
    }
}
