//! Decoding of successful response bodies.

use std::io;
use std::marker::PhantomData;

use callbridge_types::CallError;
use serde::de::DeserializeOwned;

/// Turns the raw bytes of a 2xx body into the declared body type.
///
/// Decode failures surface as [`CallError::Io`] with kind `InvalidData`.
pub trait Converter<T>: Send + Sync {
    fn convert(&self, body: &[u8]) -> Result<T, CallError>;
}

/// UTF-8 text bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl Converter<String> for StringConverter {
    fn convert(&self, body: &[u8]) -> Result<String, CallError> {
        String::from_utf8(body.to_vec())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err).into())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytesConverter;

impl Converter<Vec<u8>> for BytesConverter {
    fn convert(&self, body: &[u8]) -> Result<Vec<u8>, CallError> {
        Ok(body.to_vec())
    }
}

/// JSON bodies, via `serde_json`.
pub struct JsonConverter<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> JsonConverter<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T> Default for JsonConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonConverter<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonConverter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonConverter")
    }
}

impl<T: DeserializeOwned> Converter<T> for JsonConverter<T> {
    fn convert(&self, body: &[u8]) -> Result<T, CallError> {
        serde_json::from_slice(body).map_err(|err| io::Error::from(err).into())
    }
}
