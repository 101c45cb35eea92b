//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding notification data.
///
/// Each crate in Cadence defines its own error enum. When you see a
/// `ProtocolError`, the problem is in serialization, not in the cycle
/// state machine.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a
    /// `type` tag that names no known notification.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
