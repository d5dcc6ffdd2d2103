use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value;

use crate::signaling::{
    envelope::{Envelope, KNOWN_TYPES},
    proto_error::ProtoError,
};

/// Default cap on an inbound text envelope.
pub const MAX_ENVELOPE_BYTES: usize = 64 * 1024;

/// Decode one inbound text message.
///
/// Checks run in order: size guard (before any parsing), JSON well-formed,
/// top-level object, recognised `type`, then typed decoding.
///
/// # Errors
/// The first [`ProtoError`] hit.
pub fn decode_envelope(text: &str, max_bytes: usize) -> Result<Envelope, ProtoError> {
    if text.len() > max_bytes {
        return Err(ProtoError::TooLarge {
            len: text.len(),
            max: max_bytes,
        });
    }
    let value: Value = serde_json::from_str(text).map_err(|e| ProtoError::Malformed(e.to_string()))?;
    let Some(obj) = value.as_object() else {
        return Err(ProtoError::NotAnObject);
    };
    let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
    if !KNOWN_TYPES.contains(&kind) {
        return Err(ProtoError::UnknownType(kind.to_owned()));
    }
    serde_json::from_value(value).map_err(|e| ProtoError::Malformed(e.to_string()))
}

#[must_use]
pub fn encode_file_data(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// # Errors
/// [`ProtoError::InvalidBase64`] if `data` is not standard base64.
pub fn decode_file_data(data: &str) -> Result<Vec<u8>, ProtoError> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| ProtoError::InvalidBase64(e.to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn decodes_a_message() {
        let env = decode_envelope(
            r#"{"type":"message","from":"bob","text":"hi","timestamp":"2026-01-01T10:00:00"}"#,
            MAX_ENVELOPE_BYTES,
        )
        .unwrap();
        assert_eq!(
            env,
            Envelope::Message {
                from: "bob".into(),
                text: "hi".into(),
                timestamp: "2026-01-01T10:00:00".into(),
            }
        );
    }

    #[test]
    fn size_guard_runs_before_parsing() {
        let big = "x".repeat(MAX_ENVELOPE_BYTES + 1);
        assert_eq!(
            decode_envelope(&big, MAX_ENVELOPE_BYTES),
            Err(ProtoError::TooLarge {
                len: MAX_ENVELOPE_BYTES + 1,
                max: MAX_ENVELOPE_BYTES
            })
        );

        let padding = " ".repeat(MAX_ENVELOPE_BYTES - 30);
        let at_limit = format!(r#"{{"type":"typing","from":"bob"}}{padding}"#);
        assert!(at_limit.len() <= MAX_ENVELOPE_BYTES);
        assert!(decode_envelope(&at_limit, MAX_ENVELOPE_BYTES).is_ok());
    }

    #[test]
    fn rejects_non_objects_and_garbage() {
        assert_eq!(decode_envelope("[1,2,3]", 1024), Err(ProtoError::NotAnObject));
        assert_eq!(decode_envelope("\"message\"", 1024), Err(ProtoError::NotAnObject));
        assert!(matches!(decode_envelope("{not json", 1024), Err(ProtoError::Malformed(_))));
    }

    #[test]
    fn unknown_or_missing_type_is_reported() {
        assert_eq!(
            decode_envelope(r#"{"type":"presence","from":"bob"}"#, 1024),
            Err(ProtoError::UnknownType("presence".into()))
        );
        assert_eq!(
            decode_envelope(r#"{"from":"bob"}"#, 1024),
            Err(ProtoError::UnknownType(String::new()))
        );
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        assert!(matches!(
            decode_envelope(r#"{"type":"message","from":"bob","text":42}"#, 1024),
            Err(ProtoError::Malformed(_))
        ));
    }

    #[test]
    fn file_bytes_survive_base64() {
        let raw = [0u8, 1, 2, 250, 255];
        let text = encode_file_data(&raw);
        assert_eq!(text, "AAEC+v8=");
        assert_eq!(decode_file_data(&text).unwrap(), raw);
        assert!(matches!(decode_file_data("@@@"), Err(ProtoError::InvalidBase64(_))));
    }
}
