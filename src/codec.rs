//! Serialization boundary used to parse response bodies and persist cached values.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Turns values into bytes and back.
///
/// Decoding must tolerate unknown fields so that older clients keep working
/// against newer servers.
pub trait Codec: Send + Sync {
    /// Serializes `value`.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserializes a value from `bytes`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(Error::codec)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            tracing::error!(
                error = %e,
                raw_response = %String::from_utf8_lossy(bytes),
                "Failed to deserialize"
            );
            Error::codec(e)
        })
    }
}
