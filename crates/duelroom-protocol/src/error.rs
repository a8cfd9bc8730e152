//! Error types for the protocol layer.
//!
//! Every way an inbound frame can be rejected before it reaches a handler
//! ends up here. The server reports all of them to the sender as
//! `MalformedMessage` (code 400).

/// Errors that can occur while encoding or parsing protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame is not valid JSON or does not match the event's shape
    /// (missing required field, wrong field type).
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The `type` discriminator names an event this server doesn't know.
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    /// The frame parsed but violates a field rule (empty chat message,
    /// bad room code, missing `type`).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
