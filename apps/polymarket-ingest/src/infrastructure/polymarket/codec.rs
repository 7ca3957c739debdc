//! Market Channel Codec
//!
//! Encodes outbound control frames and splits inbound text frames into
//! plain-text keep-alive tokens and JSON payloads.

use chrono::Utc;

use crate::application::ports::Credentials;
use crate::domain::book::InstrumentId;
use crate::domain::streaming::{ControlToken, Frame};
use crate::infrastructure::polymarket::messages::{
    AuthRequest, PING_TOKEN, PONG_TOKEN, SubscribeRequest,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but neither an array nor an object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Binary frames are not part of the market channel.
    #[error("unexpected binary frame ({0} bytes)")]
    UnexpectedBinary(usize),
}

/// Text codec for the market channel.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a keep-alive token and not a JSON
    /// array or object.
    pub fn decode(&self, text: &str) -> Result<Frame, CodecError> {
        let trimmed = text.trim();

        if trimmed.eq_ignore_ascii_case(PING_TOKEN) {
            return Ok(Frame::Control(ControlToken::Ping));
        }
        if trimmed.eq_ignore_ascii_case(PONG_TOKEN) {
            return Ok(Frame::Control(ControlToken::Pong));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        if value.is_array() || value.is_object() {
            Ok(Frame::Payload(value))
        } else {
            Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {}",
                preview(trimmed)
            )))
        }
    }

    /// Encode the subscribe frame for the full instrument list.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_subscribe(&self, instruments: &[InstrumentId]) -> Result<String, CodecError> {
        let request = SubscribeRequest::market(
            instruments
                .iter()
                .map(|id| id.as_str().to_string())
                .collect(),
        );
        Ok(serde_json::to_string(&request)?)
    }

    /// Encode the auth frame, stamped with the current Unix time.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_auth(&self, credentials: &Credentials) -> Result<String, CodecError> {
        let request = AuthRequest {
            msg_type: "auth".to_string(),
            api_key: credentials.api_key().to_string(),
            secret: credentials.secret().to_string(),
            passphrase: credentials.passphrase().to_string(),
            timestamp: Utc::now().timestamp().to_string(),
        };
        Ok(serde_json::to_string(&request)?)
    }
}

fn preview(text: &str) -> &str {
    let end = text
        .char_indices()
        .nth(50)
        .map_or(text.len(), |(index, _)| index);
    &text[..end]
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case("PING", ControlToken::Ping)]
    #[test_case("PONG", ControlToken::Pong)]
    #[test_case(" pong\n", ControlToken::Pong)]
    fn keep_alive_tokens(text: &str, expected: ControlToken) {
        let frame = FrameCodec::new().decode(text).unwrap();
        assert_eq!(frame, Frame::Control(expected));
    }

    #[test]
    fn decodes_array_and_object_payloads() {
        let codec = FrameCodec::new();
        let frame = codec.decode(r#"[{"event_type":"book"}]"#).unwrap();
        assert_eq!(frame, Frame::Payload(json!([{"event_type": "book"}])));

        let frame = codec.decode(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(frame, Frame::Payload(json!({"type": "pong"})));
    }

    #[test]
    fn rejects_garbage_and_scalars() {
        let codec = FrameCodec::new();
        assert!(matches!(codec.decode("{not json"), Err(CodecError::Json(_))));
        assert!(matches!(codec.decode("42"), Err(CodecError::InvalidFormat(_))));
    }

    #[test]
    fn subscribe_frame_lists_every_instrument() {
        let frame = FrameCodec::new()
            .encode_subscribe(&[InstrumentId::from("A"), InstrumentId::from("C")])
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"assets_ids": ["A", "C"], "type": "market"}));
    }

    #[test]
    fn auth_frame_carries_keyed_fields() {
        let creds = Credentials::new("k".to_string(), "s".to_string(), "p".to_string());
        let frame = FrameCodec::new().encode_auth(&creds).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["type"], "auth");
        assert_eq!(value["apiKey"], "k");
        assert_eq!(value["secret"], "s");
        assert_eq!(value["passphrase"], "p");
        assert!(value["timestamp"].as_str().unwrap().parse::<i64>().is_ok());
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(80);
        assert_eq!(preview(&long).chars().count(), 50);
        assert_eq!(preview("short"), "short");
    }
}
