use super::{DefaultProducerContext, NativeProducer, Producer, ProducerContext};
use crate::{codec::Serializer, config::ClientConfig, error::Result, log::debug};
use std::{marker::PhantomData, sync::Arc};

/// Builds a [`Producer`] from a configuration, a context and optional
/// instance-scoped serializers.
pub struct ProducerBuilder<K, V, C = DefaultProducerContext> {
    config: ClientConfig,
    context: C,
    key_serializer: Option<Arc<dyn Serializer<K>>>,
    value_serializer: Option<Arc<dyn Serializer<V>>>,
    _marker: PhantomData<fn(&K, &V)>,
}

impl<K, V> Producer<K, V, ()> {
    pub fn builder() -> ProducerBuilder<K, V> {
        ProducerBuilder {
            config: ClientConfig::default(),
            context: DefaultProducerContext::default(),
            key_serializer: None,
            value_serializer: None,
            _marker: PhantomData,
        }
    }
}

impl<K, V, C> ProducerBuilder<K, V, C> {
    /// Sets the configuration handed to the native producer.
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

    /// Replaces the context receiving client callbacks and fallback
    /// delivery reports.
    #[must_use]
    pub fn context<C2>(self, context: C2) -> ProducerBuilder<K, V, C2>
    where
        C2: ProducerContext,
    {
        let ProducerBuilder {
            config,
            key_serializer,
            value_serializer,
            _marker,
            ..
        } = self;
        ProducerBuilder {
            config,
            context,
            key_serializer,
            value_serializer,
            _marker,
        }
    }

    #[must_use]
    pub fn key_serializer<S>(mut self, serializer: S) -> Self
    where
        S: Serializer<K> + 'static,
    {
        self.key_serializer = Some(Arc::new(serializer));
        self
    }

    #[must_use]
    pub fn value_serializer<S>(mut self, serializer: S) -> Self
    where
        S: Serializer<V> + 'static,
    {
        self.value_serializer = Some(Arc::new(serializer));
        self
    }

    /// Creates the native producer `N` and wraps it.
    pub fn try_build<N>(self) -> Result<Producer<K, V, N>>
    where
        N: NativeProducer<Context = C>,
    {
        let ProducerBuilder {
            config,
            context,
            key_serializer,
            value_serializer,
            ..
        } = self;
        debug!(
            "creating producer (key serializer: {}, value serializer: {})",
            key_serializer.is_some(),
            value_serializer.is_some()
        );
        let native = N::from_config(config, context)?;
        Ok(Producer::from_parts(native, key_serializer, value_serializer))
    }

    /// Wraps an existing native producer, ignoring the builder's
    /// configuration and context.
    pub fn build_with<N>(self, native: N) -> Producer<K, V, N>
    where
        N: NativeProducer,
    {
        Producer::from_parts(native, self.key_serializer, self.value_serializer)
    }
}
