//! Inbound frame dispatch.
//!
//! Decodes one text frame and routes it to a [`CommandHandler`].  Nothing
//! that arrives on the wire can close the connection: malformed JSON and
//! unknown message types are logged and dropped.

use display_core::protocol::messages::{LoginWebCommand, OpenScreenCommand};
use display_core::{decode_inbound, InboundMessage};
use tracing::{info, warn};

/// Receives decoded server commands.
pub trait CommandHandler {
    fn open_screen(&mut self, command: OpenScreenCommand);
    fn login_web(&mut self, command: LoginWebCommand);
}

/// What [`dispatch_frame`] did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    OpenScreen,
    LoginWeb,
    /// Well-formed, but of a type the agent does not handle.
    Ignored { kind: String },
    /// Not a valid message.
    Dropped,
}

/// Decodes `frame` and invokes the matching handler method.
pub fn dispatch_frame<H>(frame: &str, handler: &mut H) -> DispatchOutcome
where
    H: CommandHandler + ?Sized,
{
    match decode_inbound(frame) {
        Ok(InboundMessage::OpenScreen(cmd)) => {
            handler.open_screen(cmd);
            DispatchOutcome::OpenScreen
        }
        Ok(InboundMessage::LoginWeb(cmd)) => {
            handler.login_web(cmd);
            DispatchOutcome::LoginWeb
        }
        Ok(InboundMessage::Unknown { kind }) => {
            info!("ignoring message of unknown type {kind:?}");
            DispatchOutcome::Ignored { kind }
        }
        Err(e) => {
            warn!("dropping undecodable frame: {e}");
            DispatchOutcome::Dropped
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
