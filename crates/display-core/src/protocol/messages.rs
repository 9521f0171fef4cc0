//! All display-agent protocol message types.
//!
//! Every frame on the control connection is one JSON object whose `"type"`
//! field names the message.  There is no version field.
//!
//! | Direction | `type`               | Fields                                   |
//! |-----------|----------------------|------------------------------------------|
//! | out       | `REGISTER`           | `deviceId`, `deviceName`, `displays`     |
//! | out       | `OPEN_SCREEN_RETURN` | `remoteDisplayUrlMap`                    |
//! | in        | `OPEN_SCREEN`        | `displayId`, `url`                       |
//! | in        | `LOGIN_WEB`          | `displayId`, `acc`, `password`           |
//!
//! Outbound and inbound messages are separate enums so that it is a
//! compile-time error to send a server-only message, and so that an
//! outbound-only shape arriving inbound decodes as [`InboundMessage::Unknown`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::display::{Display, DisplayId};

// ── Message type discriminants ────────────────────────────────────────────────

/// Values of the `"type"` field.
pub mod message_type {
    pub const REGISTER: &str = "REGISTER";
    pub const OPEN_SCREEN_RETURN: &str = "OPEN_SCREEN_RETURN";
    pub const OPEN_SCREEN: &str = "OPEN_SCREEN";
    pub const LOGIN_WEB: &str = "LOGIN_WEB";
}

// ── Agent → server ────────────────────────────────────────────────────────────

/// REGISTER: sent once on every successful connect.
///
/// `displays` is the topology queried at connect time, not a snapshot taken
/// when the process started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMessage {
    pub device_id: String,
    pub device_name: String,
    pub displays: Vec<Display>,
}

/// OPEN_SCREEN_RETURN: full display → URL mapping, sent after every registry
/// mutation.
///
/// This is a complete snapshot, never a delta.  A display missing from the
/// map is not showing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    pub remote_display_url_map: BTreeMap<DisplayId, String>,
}

/// Messages the agent sends to the control server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "REGISTER")]
    Register(RegisterMessage),
    #[serde(rename = "OPEN_SCREEN_RETURN")]
    OpenScreenReturn(StateReport),
}

impl OutboundMessage {
    /// Returns the wire discriminant of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Register(_) => message_type::REGISTER,
            OutboundMessage::OpenScreenReturn(_) => message_type::OPEN_SCREEN_RETURN,
        }
    }
}

// ── Server → agent ────────────────────────────────────────────────────────────

/// OPEN_SCREEN: show `url` full-screen on `display_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenScreenCommand {
    pub display_id: DisplayId,
    pub url: String,
}

/// LOGIN_WEB: fill and submit the login form currently shown on `display_id`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginWebCommand {
    pub display_id: DisplayId,
    /// Account name to type into the form.
    pub acc: String,
    pub password: String,
}

// The password never appears in logs.
impl fmt::Debug for LoginWebCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginWebCommand")
            .field("display_id", &self.display_id)
            .field("acc", &self.acc)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Messages the control server sends to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    OpenScreen(OpenScreenCommand),
    LoginWeb(LoginWebCommand),
    /// A well-formed frame whose `"type"` the agent does not handle.
    Unknown { kind: String },
}

impl InboundMessage {
    /// Returns the wire discriminant the message arrived with.
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::OpenScreen(_) => message_type::OPEN_SCREEN,
            InboundMessage::LoginWeb(_) => message_type::LOGIN_WEB,
            InboundMessage::Unknown { kind } => kind,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_web_debug_redacts_password() {
        // Arrange
        let cmd = LoginWebCommand {
            display_id: DisplayId(1),
            acc: "lobby".to_string(),
            password: "hunter2".to_string(),
        };

        // Act
        let rendered = format!("{cmd:?}");

        // Assert
        assert!(rendered.contains("lobby"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_outbound_kind_matches_wire_discriminant() {
        let register = OutboundMessage::Register(RegisterMessage {
            device_id: "id".into(),
            device_name: "name".into(),
            displays: vec![],
        });
        let report = OutboundMessage::OpenScreenReturn(StateReport::default());
        assert_eq!(register.kind(), "REGISTER");
        assert_eq!(report.kind(), "OPEN_SCREEN_RETURN");
    }

    #[test]
    fn test_unknown_inbound_kind_is_preserved() {
        let msg = InboundMessage::Unknown {
            kind: "TEST".to_string(),
        };
        assert_eq!(msg.kind(), "TEST");
    }
}
