//! Error types for the protocol layer.
//!
//! Each crate in Paizer defines its own error enum, so a `ProtocolError`
//! always means the bytes were fine at the transport level but could not
//! be turned into (or out of) a relay message.

/// Errors that can occur while encoding or decoding relay messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, wrong field types, or a
    /// truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The unit parsed but breaks protocol rules, e.g. a first frame that
    /// is not a join, or a join without a display name.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
