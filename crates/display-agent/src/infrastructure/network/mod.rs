//! Network infrastructure: the control-server connection.
//!
//! Architecture:
//! - [`ConnectionManager`] lives inside the agent and is only touched from
//!   the event loop.  It owns the session state machine
//!   (`Disconnected → Connecting → Connected → Disconnected …`) and the
//!   outbound queue of the current link.
//! - Each connection attempt runs as one *link task* ([`run_link`]).  The
//!   task dials through a [`Connector`], then pumps frames both ways until
//!   either side closes.  It reports what happened as
//!   [`AgentEvent::Connected`], [`AgentEvent::FrameReceived`] and
//!   [`AgentEvent::Disconnected`], all tagged with its [`LinkId`].
//! - After a disconnect the manager arms a single timer that posts
//!   [`AgentEvent::ReconnectDue`].  The next attempt is only started when
//!   the agent handles that event, so at most one link exists at a time.
//!
//! Reconnect is unbounded with a fixed delay; there is no backoff.

pub mod mock;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use display_core::{encode_outbound, OutboundMessage, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::events::{AgentEvent, EventSender, LinkId};

/// Default control-server endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3000";

/// Delay between a disconnect and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Errors that can occur in the agent network layer.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The WebSocket handshake with the control server failed.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    /// An error occurred on an established connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// A send was attempted while no link is connected.
    #[error("not connected to the control server")]
    NotConnected,

    /// An outbound message could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The link task is gone.
    #[error("connection closed")]
    Closed,
}

/// A connected, message-oriented duplex channel.
#[async_trait]
pub trait Transport: Send {
    /// Sends one text frame.
    async fn send(&mut self, frame: String) -> Result<(), ConnectionError>;

    /// Receives the next text frame, or `None` once the peer has closed.
    async fn recv(&mut self) -> Option<Result<String, ConnectionError>>;
}

/// Dials the control server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, ConnectionError>;
}

/// Session state of the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Configuration for the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// `ws://host:port` of the control server.
    pub endpoint: String,
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

struct Session {
    state: SessionState,
    link: Option<LinkId>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

/// Owns the control connection's lifecycle.
pub struct ConnectionManager {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    events: EventSender,
    session: Session,
    next_link: u64,
    attempts: u64,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>, events: EventSender) -> Self {
        Self {
            config,
            connector,
            events,
            session: Session {
                state: SessionState::Disconnected,
                link: None,
                outbound: None,
            },
            next_link: 1,
            attempts: 0,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Number of connection attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Starts a connection attempt.  Does nothing unless disconnected.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&mut self) {
        if self.session.state != SessionState::Disconnected {
            debug!("connect ignored in state {:?}", self.session.state);
            return;
        }

        let link = LinkId(self.next_link);
        self.next_link += 1;
        self.attempts += 1;
        self.session.state = SessionState::Connecting;
        self.session.link = Some(link);
        self.session.outbound = None;

        info!("connecting to {} ({link})", self.config.endpoint);
        tokio::spawn(run_link(
            link,
            self.config.endpoint.clone(),
            Arc::clone(&self.connector),
            self.events.clone(),
        ));
    }

    /// Returns `true` if `link` is the link the session is currently using.
    pub fn is_current(&self, link: LinkId) -> bool {
        self.session.link == Some(link)
    }

    /// Handles [`AgentEvent::Connected`].  Returns `false` for a stale link.
    pub fn on_connected(&mut self, link: LinkId, outbound: mpsc::UnboundedSender<String>) -> bool {
        if !self.is_current(link) || self.session.state != SessionState::Connecting {
            debug!("ignoring connect notification from stale {link}");
            return false;
        }
        self.session.state = SessionState::Connected;
        self.session.outbound = Some(outbound);
        info!("connected to {} ({link})", self.config.endpoint);
        true
    }

    /// Handles [`AgentEvent::Disconnected`] and arms the reconnect timer.
    /// Returns `false` for a stale link.
    pub fn on_disconnected(&mut self, link: LinkId, reason: &str) -> bool {
        if !self.is_current(link) || self.session.state == SessionState::Disconnected {
            debug!("ignoring disconnect notification from stale {link}");
            return false;
        }
        self.session.state = SessionState::Disconnected;
        self.session.outbound = None;

        let delay = self.config.reconnect_delay;
        warn!("{link} lost: {reason}; reconnecting in {delay:?}");
        let events = self.events.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = events.send(AgentEvent::ReconnectDue);
        });
        true
    }

    /// Handles [`AgentEvent::ReconnectDue`].
    pub fn on_reconnect_due(&mut self) {
        self.connect();
    }

    /// Encodes and queues `msg` on the current link.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] while no link is connected,
    /// [`ConnectionError::Protocol`] if encoding fails, or
    /// [`ConnectionError::Closed`] if the link task has already exited.
    pub fn send(&self, msg: &OutboundMessage) -> Result<(), ConnectionError> {
        let outbound = match (&self.session.state, &self.session.outbound) {
            (SessionState::Connected, Some(tx)) => tx,
            _ => return Err(ConnectionError::NotConnected),
        };
        let frame = encode_outbound(msg)?;
        outbound.send(frame).map_err(|_| ConnectionError::Closed)?;
        debug!("queued {} frame", msg.kind());
        Ok(())
    }

    /// Drops the current link, if any, without scheduling a reconnect.
    pub fn close(&mut self) {
        self.session.state = SessionState::Disconnected;
        self.session.link = None;
        self.session.outbound = None;
    }
}

/// Drives one connection attempt from dial to close.
///
/// Always ends with exactly one [`AgentEvent::Disconnected`] for `link`,
/// whether the dial failed or an established connection ended.  The
/// transport is dropped before that event is sent.
pub async fn run_link(
    link: LinkId,
    endpoint: String,
    connector: Arc<dyn Connector>,
    events: EventSender,
) {
    let mut transport = match connector.connect(&endpoint).await {
        Ok(transport) => transport,
        Err(e) => {
            let _ = events.send(AgentEvent::Disconnected {
                link,
                reason: e.to_string(),
            });
            return;
        }
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    if events
        .send(AgentEvent::Connected {
            link,
            outbound: out_tx,
        })
        .is_err()
    {
        return;
    }

    let reason = loop {
        tokio::select! {
            queued = out_rx.recv() => match queued {
                Some(frame) => {
                    if let Err(e) = transport.send(frame).await {
                        break e.to_string();
                    }
                }
                // The agent dropped our sender: this link was replaced or closed.
                None => break "closed locally".to_string(),
            },
            received = transport.recv() => match received {
                Some(Ok(frame)) => {
                    if events.send(AgentEvent::FrameReceived { link, frame }).is_err() {
                        break "agent stopped".to_string();
                    }
                }
                Some(Err(e)) => break e.to_string(),
                None => break ConnectionError::Closed.to_string(),
            },
        }
    };

    drop(transport);
    let _ = events.send(AgentEvent::Disconnected { link, reason });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
