use std::{borrow::Borrow, collections::HashMap, hash::Hash, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Generic Kafka client configuration.
///
/// The map is handed as-is to the native client; the shims never interpret
/// its keys.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        transparent,
        bound(
            serialize = "K: Eq + Hash + Serialize, V: Serialize",
            deserialize = "K: Eq + Hash + Deserialize<'de>, V: Deserialize<'de>"
        )
    )
)]
pub struct ClientConfig<K = String, V = String> {
    inner: HashMap<K, V>,
}

impl<K, V> ClientConfig<K, V> {
    /// Gets the value of a parameter in the configuration.
    ///
    /// Returns the current value set for `key`, or `None` if no value for `key`
    /// exists.
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Eq + Hash + Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(k)
    }

    /// Sets a parameter in the configuration.
    ///
    /// If there is an existing value for `key` in the configuration, it is
    /// overridden with the new `value`.
    pub fn set<Q, R>(&mut self, key: Q, value: R) -> &mut Self
    where
        Q: Into<K>,
        R: Into<V>,
        K: Eq + Hash,
    {
        self.inner.insert(key.into(), value.into());
        self
    }

    /// Removes a parameter from the configuration, returning its value.
    pub fn remove<Q>(&mut self, k: &Q) -> Option<V>
    where
        K: Eq + Hash + Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.remove(k)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }
}

impl ClientConfig {
    /// Parses the value of `key`, returning `default` when the key is unset.
    ///
    /// Used by native implementations reading their own properties.
    pub(crate) fn parse_or<T>(&self, key: &str, default: T) -> Result<T, String>
    where
        T: FromStr,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| format!("invalid value for configuration property \"{key}\": {raw}")),
        }
    }
}

impl<K, V> Default for ClientConfig<K, V> {
    fn default() -> Self {
        Self {
            inner: Default::default(),
        }
    }
}

impl<K, V, Q, R> FromIterator<(Q, R)> for ClientConfig<K, V>
where
    K: Eq + Hash,
    Q: Into<K>,
    R: Into<V>,
{
    fn from_iter<I>(iter: I) -> ClientConfig<K, V>
    where
        I: IntoIterator<Item = (Q, R)>,
    {
        let mut config = ClientConfig::default();
        config.extend(iter);
        config
    }
}

impl<K, V, Q, R> Extend<(Q, R)> for ClientConfig<K, V>
where
    K: Eq + Hash,
    Q: Into<K>,
    R: Into<V>,
{
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (Q, R)>,
    {
        self.inner
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())))
    }
}
