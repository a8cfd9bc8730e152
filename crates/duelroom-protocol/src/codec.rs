//! Codec trait and the JSON implementation.
//!
//! The server encodes every outbound [`ServerEvent`](crate::ServerEvent)
//! exactly once through a [`Codec`] and fans the resulting frame out to all
//! recipients, so the codec sits on the broadcast hot path.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`). Browsers speak JSON, so
/// this is the only codec the server ships with.
///
/// ```rust
/// use duelroom_protocol::{Codec, JsonCodec, ServerEvent};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&ServerEvent::Pong { timestamp: Some(5_u64.into()) }).unwrap();
/// let back: ServerEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(back, ServerEvent::Pong { timestamp: Some(5_u64.into()) });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
