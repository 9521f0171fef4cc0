//! In-memory connector for testing the connection lifecycle.
//!
//! # Why a mock connector?
//!
//! Reconnect behaviour is all about timing (three seconds between attempts,
//! never two links at once), and a real socket cannot be made to refuse or
//! drop on cue.  `MockConnector` hands out in-memory transports instead.
//! Each accepted dial produces a [`MockServer`] handle that plays the control
//! server: it can push frames to the agent, read what the agent sent, and
//! close the link.
//!
//! The connector records the (Tokio) time of every dial and how many
//! transports are alive at once, so tests running with a paused clock can
//! assert on both.
//!
//! # Usage in tests
//!
//! ```ignore
//! let connector = Arc::new(MockConnector::new());
//! connector.refuse_next(2);
//! // ... run the agent ...
//! assert_eq!(connector.attempt_count(), 3);
//! let server = connector.server(0).unwrap();
//! server.push(r#"{"type":"OPEN_SCREEN","displayId":1,"url":"https://a"}"#);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{ConnectionError, Connector, Transport};

#[derive(Debug)]
enum ServerCommand {
    Frame(String),
    Close,
}

#[derive(Default)]
struct ConnectorState {
    refusals: usize,
    attempts: Vec<Instant>,
    servers: Vec<MockServer>,
}

/// A [`Connector`] backed by in-memory channels.
#[derive(Default)]
pub struct MockConnector {
    state: Mutex<ConnectorState>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` dials fail with [`ConnectionError::ConnectFailed`].
    pub fn refuse_next(&self, n: usize) {
        self.state.lock().unwrap().refusals += n;
    }

    /// Total dials, refused or not.
    pub fn attempt_count(&self) -> usize {
        self.state.lock().unwrap().attempts.len()
    }

    /// Tokio time of every dial, in order.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Server side of the `index`-th accepted connection.
    pub fn server(&self, index: usize) -> Option<MockServer> {
        self.state.lock().unwrap().servers.get(index).cloned()
    }

    /// Server side of the most recent accepted connection.
    pub fn latest_server(&self) -> Option<MockServer> {
        self.state.lock().unwrap().servers.last().cloned()
    }

    pub fn accepted_count(&self) -> usize {
        self.state.lock().unwrap().servers.len()
    }

    /// Transports currently alive.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of transports that were ever alive at once.
    pub fn max_live_connections(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, ConnectionError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(Instant::now());

        if state.refusals > 0 {
            state.refusals -= 1;
            return Err(ConnectionError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let (to_agent, inbound) = mpsc::unbounded_channel();
        let (outbound, from_agent) = mpsc::unbounded_channel();
        state.servers.push(MockServer {
            to_agent,
            from_agent: Arc::new(tokio::sync::Mutex::new(from_agent)),
        });

        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now_live, Ordering::SeqCst);

        Ok(Box::new(MockTransport {
            inbound,
            outbound,
            live: Arc::clone(&self.live),
            closed: false,
        }))
    }
}

/// The control-server end of one mock connection.
#[derive(Clone)]
pub struct MockServer {
    to_agent: mpsc::UnboundedSender<ServerCommand>,
    from_agent: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl MockServer {
    /// Sends a text frame to the agent.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.to_agent.send(ServerCommand::Frame(frame.into()));
    }

    /// Closes the connection from the server side.
    pub fn close(&self) {
        let _ = self.to_agent.send(ServerCommand::Close);
    }

    /// Waits for the next frame the agent sent.
    pub async fn next_frame(&self) -> Option<String> {
        self.from_agent.lock().await.recv().await
    }

    /// Returns the next frame the agent sent, if one is already queued.
    pub fn try_next_frame(&self) -> Option<String> {
        self.from_agent.try_lock().ok()?.try_recv().ok()
    }

    /// Returns every frame the agent has sent that has not been read yet.
    pub fn drain_frames(&self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_next_frame() {
            frames.push(frame);
        }
        frames
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<ServerCommand>,
    outbound: mpsc::UnboundedSender<String>,
    live: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| ConnectionError::Transport("mock server dropped".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectionError>> {
        if self.closed {
            return None;
        }
        match self.inbound.recv().await {
            Some(ServerCommand::Frame(frame)) => Some(Ok(frame)),
            Some(ServerCommand::Close) | None => {
                self.closed = true;
                None
            }
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_next_frame_waits_until_agent_sends() {
        // Arrange
        let connector = MockConnector::new();
        let mut transport = connector.connect("ws://mock").await.expect("connect");
        let server = connector.server(0).expect("server side");
        let mut next = task::spawn(server.next_frame());

        // Act / Assert
        assert_pending!(next.poll());
        transport.send("hello".to_string()).await.expect("send");
        assert!(next.is_woken());
        assert_eq!(assert_ready!(next.poll()), Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_agent_recv_waits_for_server_push() {
        let connector = MockConnector::new();
        let mut transport = connector.connect("ws://mock").await.expect("connect");
        let server = connector.server(0).expect("server side");
        let mut recv = task::spawn(transport.recv());

        assert_pending!(recv.poll());
        server.push("frame");
        assert!(recv.is_woken());
        assert!(matches!(assert_ready!(recv.poll()), Some(Ok(f)) if f == "frame"));
    }

    #[tokio::test]
    async fn test_refusals_and_live_transport_counting() {
        // Arrange
        let connector = MockConnector::new();
        connector.refuse_next(1);

        // Act
        let refused = connector.connect("ws://mock").await;
        let transport = connector.connect("ws://mock").await.expect("second dial");
        let live_while_open = connector.live_connections();
        drop(transport);

        // Assert
        assert!(matches!(refused, Err(ConnectionError::ConnectFailed { .. })));
        assert_eq!(connector.attempt_count(), 2);
        assert_eq!(connector.accepted_count(), 1);
        assert_eq!(live_while_open, 1);
        assert_eq!(connector.live_connections(), 0);
        assert_eq!(connector.max_live_connections(), 1);
    }
}
