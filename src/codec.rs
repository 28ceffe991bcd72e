//! Pluggable key and value codecs.
//!
//! A [`Serializer`] turns an application value into the wire slot of a
//! record, a [`Deserializer`] does the reverse for fetched messages. Both
//! receive the topic name as context. Hooks are pure functions and are fully
//! responsible for null handling: the shims call them even when the value or
//! payload is null.
//!
//! When no hook resolves for a call, values travel untransformed and must
//! already have a wire representation, see [`ToPayload`] and [`FromPayload`].

pub use crate::error::BoxError;

use crate::error::CodecError;
use std::{any::type_name, fmt, marker::PhantomData};

/// The wire representation of a key or value, `None` standing for null.
pub type Payload = Option<Vec<u8>>;

/// Converts values of type `T` to their wire representation.
pub trait Serializer<T: ?Sized>: Send + Sync {
    fn serialize(&self, topic: &str, value: Option<&T>) -> Result<Payload, BoxError>;
}

/// Converts wire payloads into values of type `T`.
pub trait Deserializer<T>: Send + Sync {
    fn deserialize(&self, topic: &str, payload: Option<&[u8]>) -> Result<T, BoxError>;
}

impl<T: ?Sized, S: Serializer<T> + ?Sized> Serializer<T> for std::sync::Arc<S> {
    fn serialize(&self, topic: &str, value: Option<&T>) -> Result<Payload, BoxError> {
        (**self).serialize(topic, value)
    }
}

impl<T, D: Deserializer<T> + ?Sized> Deserializer<T> for std::sync::Arc<D> {
    fn deserialize(&self, topic: &str, payload: Option<&[u8]>) -> Result<T, BoxError> {
        (**self).deserialize(topic, payload)
    }
}

/// A [`Serializer`] backed by a closure. See [`serializer_fn`].
pub struct FnSerializer<T: ?Sized, F> {
    f: F,
    _marker: PhantomData<fn(&T)>,
}

/// Wraps `f(topic, value)` into a [`Serializer`].
pub fn serializer_fn<T, F>(f: F) -> FnSerializer<T, F>
where
    T: ?Sized,
    F: Fn(&str, Option<&T>) -> Result<Payload, BoxError> + Send + Sync,
{
    FnSerializer {
        f,
        _marker: PhantomData,
    }
}

impl<T, F> Serializer<T> for FnSerializer<T, F>
where
    T: ?Sized,
    F: Fn(&str, Option<&T>) -> Result<Payload, BoxError> + Send + Sync,
{
    fn serialize(&self, topic: &str, value: Option<&T>) -> Result<Payload, BoxError> {
        (self.f)(topic, value)
    }
}

/// A [`Deserializer`] backed by a closure. See [`deserializer_fn`].
pub struct FnDeserializer<T, F> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

/// Wraps `f(topic, payload)` into a [`Deserializer`].
pub fn deserializer_fn<T, F>(f: F) -> FnDeserializer<T, F>
where
    F: Fn(&str, Option<&[u8]>) -> Result<T, BoxError> + Send + Sync,
{
    FnDeserializer {
        f,
        _marker: PhantomData,
    }
}

impl<T, F> Deserializer<T> for FnDeserializer<T, F>
where
    F: Fn(&str, Option<&[u8]>) -> Result<T, BoxError> + Send + Sync,
{
    fn deserialize(&self, topic: &str, payload: Option<&[u8]>) -> Result<T, BoxError> {
        (self.f)(topic, payload)
    }
}

fn missing_codec<T: ?Sized>(direction: &str) -> CodecError {
    CodecError::msg(format!(
        "values of type `{}` have no wire representation, configure a {direction}",
        type_name::<T>()
    ))
}

/// Wire representation used when no serializer is configured.
///
/// The default implementation refuses the value. Byte and string types
/// override it; application types can opt in with an empty impl and rely on a
/// serializer being configured.
pub trait ToPayload {
    fn to_payload(&self) -> Result<Payload, CodecError> {
        Err(missing_codec::<Self>("serializer"))
    }
}

/// Value construction used when no deserializer is configured.
///
/// Only the raw [`Payload`] is accepted by default.
pub trait FromPayload: Sized {
    fn from_payload(payload: Payload) -> Result<Self, CodecError> {
        drop(payload);
        Err(missing_codec::<Self>("deserializer"))
    }
}

impl ToPayload for Payload {
    fn to_payload(&self) -> Result<Payload, CodecError> {
        Ok(self.clone())
    }
}

impl FromPayload for Payload {
    fn from_payload(payload: Payload) -> Result<Self, CodecError> {
        Ok(payload)
    }
}

impl ToPayload for [u8] {
    fn to_payload(&self) -> Result<Payload, CodecError> {
        Ok(Some(self.to_vec()))
    }
}

impl ToPayload for Vec<u8> {
    fn to_payload(&self) -> Result<Payload, CodecError> {
        Ok(Some(self.clone()))
    }
}

impl<const N: usize> ToPayload for [u8; N] {
    fn to_payload(&self) -> Result<Payload, CodecError> {
        Ok(Some(self.to_vec()))
    }
}

impl ToPayload for str {
    fn to_payload(&self) -> Result<Payload, CodecError> {
        Ok(Some(self.as_bytes().to_vec()))
    }
}

impl ToPayload for String {
    fn to_payload(&self) -> Result<Payload, CodecError> {
        self.as_str().to_payload()
    }
}

impl<T: ToPayload + ?Sized> ToPayload for &T {
    fn to_payload(&self) -> Result<Payload, CodecError> {
        (**self).to_payload()
    }
}

impl FromPayload for String {}

macro_rules! impl_codec_fallback_for {
    ($($ty:ty),*) => {
        $(
            impl ToPayload for $ty {}
            impl FromPayload for $ty {}
        )*
    };
}

impl_codec_fallback_for!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    Option<String>
);

/// Resolves a call-scoped hook against the instance-scoped one.
///
/// The override, when present, shadows the instance hook for this call only.
pub(crate) fn resolve<'a, H: ?Sized>(
    call_scoped: Option<&'a H>,
    instance: Option<&'a H>,
) -> Option<&'a H> {
    call_scoped.or(instance)
}

/// UTF-8 string serializer. Null values stay null.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl<T: AsRef<str> + ?Sized> Serializer<T> for StringSerializer {
    fn serialize(&self, _: &str, value: Option<&T>) -> Result<Payload, BoxError> {
        Ok(value.map(|v| v.as_ref().as_bytes().to_vec()))
    }
}

/// UTF-8 string deserializer. Null payloads become `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDeserializer;

impl Deserializer<Option<String>> for StringDeserializer {
    fn deserialize(&self, _: &str, payload: Option<&[u8]>) -> Result<Option<String>, BoxError> {
        payload
            .map(|p| String::from_utf8(p.to_vec()).map_err(BoxError::from))
            .transpose()
    }
}

/// JSON serializer backed by `serde_json`. Null values become JSON `null`
/// unless `null_as_tombstone` is set.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    pub null_as_tombstone: bool,
}

#[cfg(feature = "serde")]
impl<T: serde::Serialize + ?Sized> Serializer<T> for JsonSerializer {
    fn serialize(&self, _: &str, value: Option<&T>) -> Result<Payload, BoxError> {
        match value {
            Some(v) => Ok(Some(serde_json::to_vec(v)?)),
            None if self.null_as_tombstone => Ok(None),
            None => Ok(Some(b"null".to_vec())),
        }
    }
}

/// JSON deserializer backed by `serde_json`. Null payloads decode as JSON
/// `null`, so `T` must accept it (e.g. an `Option`).
#[cfg(feature = "serde")]
pub struct JsonDeserializer<T> {
    _marker: PhantomData<fn() -> T>,
}

#[cfg(feature = "serde")]
impl<T> JsonDeserializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<T> Default for JsonDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "serde")]
impl<T> fmt::Debug for JsonDeserializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonDeserializer<{}>", type_name::<T>())
    }
}

#[cfg(feature = "serde")]
impl<T: serde::de::DeserializeOwned> Deserializer<T> for JsonDeserializer<T> {
    fn deserialize(&self, _: &str, payload: Option<&[u8]>) -> Result<T, BoxError> {
        Ok(serde_json::from_slice(payload.unwrap_or(b"null"))?)
    }
}

impl<T: ?Sized, F> fmt::Debug for FnSerializer<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnSerializer<{}>", type_name::<T>())
    }
}

impl<T, F> fmt::Debug for FnDeserializer<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnDeserializer<{}>", type_name::<T>())
    }
}
