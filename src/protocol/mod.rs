//! Protocol definitions for the admin backend
//!
//! Every channel speaks human-readable JSON text frames wrapped in an
//! [`Envelope`]. This module owns the codec: decoding raw frames, encoding
//! outgoing envelopes, and unwrapping payloads that the backend ships as
//! JSON embedded in a string.

mod message;

pub use message::{kind, Envelope};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid payload for '{kind}': {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProtocolError {
    pub fn invalid_payload(kind: &str, reason: impl ToString) -> Self {
        ProtocolError::InvalidPayload {
            kind: kind.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Upper bound on a single inbound frame (10 MB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Encode an envelope as a compact JSON text frame
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode a text frame into an envelope.
///
/// Fails with [`ProtocolError::MalformedFrame`] when the frame is not JSON,
/// not an object, or has no string `type`.
pub fn decode(frame: &str) -> Result<Envelope, ProtocolError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: frame.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let value: Value =
        serde_json::from_str(frame).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
    if !value.is_object() {
        return Err(ProtocolError::MalformedFrame(
            "expected a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
}

/// Decode a binary frame; the payload must still be UTF-8 JSON
pub fn decode_bytes(frame: &[u8]) -> Result<Envelope, ProtocolError> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| ProtocolError::MalformedFrame(format!("not UTF-8: {}", e)))?;
    decode(text)
}

/// Interpret a payload that may be either structured JSON or a string
/// holding JSON text.
///
/// The backend relays some responses verbatim from game servers, so
/// `gmList` and `tableConfig` arrive as strings that must be parsed again.
pub fn json_payload<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    match value {
        Value::String(text) => serde_json::from_str(text),
        other => T::deserialize(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(
            decode("not json"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        assert!(matches!(
            decode(r#"{"data":"x"}"#),
            Err(ProtocolError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode(r#"{"type":7}"#),
            Err(ProtocolError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode(r#"["servers"]"#),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_bytes_rejects_invalid_utf8() {
        assert!(matches!(
            decode_bytes(&[0xff, 0xfe]),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_json_payload_accepts_embedded_string() {
        let embedded = json!(r#"[1,2,3]"#);
        let structured = json!([1, 2, 3]);
        let a: Vec<u32> = json_payload(&embedded).unwrap();
        let b: Vec<u32> = json_payload(&structured).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_console_message() {
        let env = Envelope::new(kind::MESSAGE)
            .with_target("game.1001.1")
            .with_data("print(1)");
        let text = encode(&env).unwrap();
        let back = decode(&text).unwrap();
        assert_eq!(back, env);
    }
}
