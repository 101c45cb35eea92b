//! Codec trait and implementations for serializing notification data.
//!
//! The coordinator emits plain Rust values. A transport collaborator
//! (WebSocket gateway, message bus, log shipper) needs bytes. A "codec"
//! sits between the two so the cycle logic never cares about the format.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec is stored inside long-lived
/// Tokio tasks (the notification feed) that may run on any worker thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable, so notifications can be inspected in browser DevTools
/// or piped straight into a log. Behind the `json` feature (default on).
///
/// ## Example
///
/// ```rust
/// use cadence_protocol::{Codec, Envelope, JsonCodec, Notification, Phase};
///
/// let codec = JsonCodec;
/// let envelope = Envelope {
///     seq: 1,
///     timestamp: 5000,
///     notification: Notification::PhaseChanged {
///         new_phase: Phase::Intermission,
///         timestamp: 5000,
///     },
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Envelope, MatchId, MatchRecord, Notification, SessionId};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_notification_type_fails() {
        let raw = br#"{"seq":1,"timestamp":0,"notification":{"type":"Teleported"}}"#;
        let result: Result<Envelope, _> = JsonCodec.decode(raw);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_match_started_carries_participants() {
        let record = MatchRecord::new(
            MatchId { epoch: 1, seq: 3 },
            1_000,
            vec![SessionId::new("s1-aa"), SessionId::new("s2-bb")],
        );
        let envelope = Envelope {
            seq: 7,
            timestamp: 1_000,
            notification: Notification::MatchStarted {
                match_record: record,
                timestamp: 1_000,
            },
        };

        let bytes = JsonCodec.encode(&envelope).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.contains(r#""type":"MatchStarted""#));
        assert!(text.contains(r#""participants":["s1-aa","s2-bb"]"#));
    }
}
