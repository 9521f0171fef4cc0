//! JSON codec for display-agent protocol messages.
//!
//! Wire format: one JSON object per WebSocket text frame, discriminated by a
//! string `"type"` field.
//!
//! Decoding happens in two steps.  The frame is first parsed into a generic
//! JSON value so that the discriminant can be read; only then is the value
//! converted into the typed payload for that discriminant.  This lets the
//! decoder tell three situations apart:
//!
//! - the frame is not a JSON object with a `"type"` string → [`ProtocolError`];
//! - the `"type"` is known but its fields are wrong → [`ProtocolError::Malformed`];
//! - the `"type"` is simply not one the agent handles → `Ok(InboundMessage::Unknown)`.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{
    message_type, InboundMessage, LoginWebCommand, OpenScreenCommand, OutboundMessage,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The object has no string `"type"` field.
    #[error("frame has no string \"type\" field")]
    MissingType,

    /// The discriminant is known but the payload fields do not match it.
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// An outbound message could not be serialized.
    #[error("failed to encode {kind} message: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one inbound text frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the frame is not a JSON object carrying a
/// string `"type"`, or when a known message type has malformed fields.  An
/// unrecognised `"type"` is not an error.
///
/// # Examples
///
/// ```rust
/// use display_core::protocol::{decode_inbound, InboundMessage};
///
/// let msg = decode_inbound(r#"{"type":"OPEN_SCREEN","displayId":1,"url":"https://a"}"#).unwrap();
/// assert!(matches!(msg, InboundMessage::OpenScreen(_)));
/// ```
pub fn decode_inbound(frame: &str) -> Result<InboundMessage, ProtocolError> {
    let value: Value = serde_json::from_str(frame).map_err(ProtocolError::InvalidJson)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_owned();

    match kind.as_str() {
        message_type::OPEN_SCREEN => serde_json::from_value::<OpenScreenCommand>(value)
            .map(InboundMessage::OpenScreen)
            .map_err(|source| ProtocolError::Malformed {
                kind: message_type::OPEN_SCREEN,
                source,
            }),
        message_type::LOGIN_WEB => serde_json::from_value::<LoginWebCommand>(value)
            .map(InboundMessage::LoginWeb)
            .map_err(|source| ProtocolError::Malformed {
                kind: message_type::LOGIN_WEB,
                source,
            }),
        _ => Ok(InboundMessage::Unknown { kind }),
    }
}

/// Encodes an outbound message as a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_outbound(msg: &OutboundMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|source| ProtocolError::Encode {
        kind: msg.kind(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
