//! Minimal DevTools protocol client for kiosk browser windows.
//!
//! Chromium-family browsers started with `--remote-debugging-port=0` pick a
//! free port and write it, together with the browser target's WebSocket
//! path, to `<user-data-dir>/DevToolsActivePort`.  The client reads that
//! file, connects to the browser target, attaches to the first page target
//! in flattened-session mode and then sends page commands on that session.
//!
//! Only three commands are needed:
//!
//! | Command                        | DevTools method     |
//! |--------------------------------|---------------------|
//! | [`DevToolsCommand::Navigate`]  | `Page.navigate`     |
//! | [`DevToolsCommand::Reload`]    | `Page.reload`       |
//! | [`DevToolsCommand::Evaluate`]  | `Runtime.evaluate`  |
//!
//! Commands for one window are executed in order by [`run_worker`], which
//! also turns slow responses into unresponsive/responsive notifications.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::application::surface::SurfaceEventSink;

/// How long a command may take before the window is reported unresponsive.
pub const UNRESPONSIVE_AFTER: Duration = Duration::from_secs(10);

/// How long to keep waiting after that before abandoning the command.
pub const ABANDON_AFTER: Duration = Duration::from_secs(50);

/// How long to wait for the browser to write its `DevToolsActivePort` file.
const PORT_FILE_WAIT: Duration = Duration::from_secs(15);
const PORT_FILE_POLL: Duration = Duration::from_millis(100);

/// Errors raised while talking to a browser's DevTools endpoint.
#[derive(Debug, Error)]
pub enum DevToolsError {
    /// The browser never published its DevTools port.
    #[error("DevTools port file {path} not available: {reason}")]
    PortFile { path: PathBuf, reason: String },

    #[error("DevTools connection failed: {0}")]
    Connect(String),

    /// The browser returned an error response or closed the socket.
    #[error("DevTools protocol error: {0}")]
    Protocol(String),

    /// The browser has no page target to attach to.
    #[error("browser has no page target")]
    NoPage,
}

/// A page-level command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevToolsCommand {
    Navigate(String),
    /// Reload the page; `ignore_cache` bypasses the HTTP cache.
    Reload { ignore_cache: bool },
    Evaluate(String),
}

impl DevToolsCommand {
    pub fn method(&self) -> &'static str {
        match self {
            DevToolsCommand::Navigate(_) => "Page.navigate",
            DevToolsCommand::Reload { .. } => "Page.reload",
            DevToolsCommand::Evaluate(_) => "Runtime.evaluate",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            DevToolsCommand::Navigate(url) => json!({ "url": url }),
            DevToolsCommand::Reload { ignore_cache } => json!({ "ignoreCache": ignore_cache }),
            DevToolsCommand::Evaluate(expression) => {
                json!({ "expression": expression, "awaitPromise": false, "userGesture": true })
            }
        }
    }
}

/// Parses a `DevToolsActivePort` file: port on the first line, browser
/// target path on the second.
pub fn parse_active_port(contents: &str) -> Option<(u16, String)> {
    let mut lines = contents.lines();
    let port = lines.next()?.trim().parse().ok()?;
    let path = lines.next()?.trim();
    if !path.starts_with('/') {
        return None;
    }
    Some((port, path.to_string()))
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct PageSession {
    ws: WsStream,
    session_id: String,
}

/// DevTools client for one browser instance.
pub struct DevToolsClient {
    port_file: PathBuf,
    session: Option<PageSession>,
    next_id: u64,
}

impl DevToolsClient {
    pub fn new(user_data_dir: &Path) -> Self {
        Self {
            port_file: user_data_dir.join("DevToolsActivePort"),
            session: None,
            next_id: 1,
        }
    }

    /// Runs `command` on the page, connecting first if needed.
    ///
    /// Any failure drops the session so the next command reconnects.
    pub async fn execute(&mut self, command: &DevToolsCommand) -> Result<(), DevToolsError> {
        let result = self.execute_inner(command).await;
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Opens the page session if there is none yet.
    ///
    /// Waits up to `PORT_FILE_WAIT` for a starting browser to publish its
    /// port.  A failure leaves the client without a session.
    pub async fn connect(&mut self) -> Result<(), DevToolsError> {
        if self.session.is_none() {
            self.session = Some(self.open_session().await?);
        }
        Ok(())
    }

    /// Forgets the current session.
    pub fn reset(&mut self) {
        self.session = None;
    }

    async fn execute_inner(&mut self, command: &DevToolsCommand) -> Result<(), DevToolsError> {
        self.connect().await?;
        let id = self.allocate_id();
        let Some(session) = self.session.as_mut() else {
            return Err(DevToolsError::Protocol("session lost".to_string()));
        };
        let frame = json!({
            "id": id,
            "sessionId": session.session_id,
            "method": command.method(),
            "params": command.params(),
        });
        call(&mut session.ws, id, frame).await?;
        debug!("DevTools {} ok", command.method());
        Ok(())
    }

    async fn open_session(&mut self) -> Result<PageSession, DevToolsError> {
        let (port, path) = self.wait_for_port_file().await?;
        let url = format!("ws://127.0.0.1:{port}{path}");
        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| DevToolsError::Connect(e.to_string()))?;

        let id = self.allocate_id();
        let targets = call(&mut ws, id, json!({ "id": id, "method": "Target.getTargets" })).await?;
        let target_id = targets["targetInfos"]
            .as_array()
            .and_then(|infos| {
                infos
                    .iter()
                    .find(|t| t["type"] == "page")
                    .and_then(|t| t["targetId"].as_str())
            })
            .ok_or(DevToolsError::NoPage)?
            .to_string();

        let id = self.allocate_id();
        let attached = call(
            &mut ws,
            id,
            json!({
                "id": id,
                "method": "Target.attachToTarget",
                "params": { "targetId": target_id, "flatten": true },
            }),
        )
        .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .ok_or_else(|| DevToolsError::Protocol("attachToTarget returned no sessionId".into()))?
            .to_string();

        debug!("DevTools attached to page {target_id}");
        Ok(PageSession { ws, session_id })
    }

    async fn wait_for_port_file(&self) -> Result<(u16, String), DevToolsError> {
        let deadline = time::Instant::now() + PORT_FILE_WAIT;
        loop {
            let last_error = match tokio::fs::read_to_string(&self.port_file).await {
                Ok(contents) => match parse_active_port(&contents) {
                    Some(found) => return Ok(found),
                    None => "malformed contents".to_string(),
                },
                Err(e) => e.to_string(),
            };
            if time::Instant::now() >= deadline {
                return Err(DevToolsError::PortFile {
                    path: self.port_file.clone(),
                    reason: last_error,
                });
            }
            time::sleep(PORT_FILE_POLL).await;
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Sends `frame` and waits for the response carrying `id`, skipping events.
async fn call(ws: &mut WsStream, id: u64, frame: Value) -> Result<Value, DevToolsError> {
    ws.send(WsMessage::Text(frame.to_string()))
        .await
        .map_err(|e| DevToolsError::Protocol(e.to_string()))?;

    while let Some(msg) = ws.next().await {
        let text = match msg.map_err(|e| DevToolsError::Protocol(e.to_string()))? {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if value["id"].as_u64() != Some(id) {
            continue;
        }
        if let Some(error) = value.get("error") {
            let message = error["message"].as_str().unwrap_or("unknown error");
            return Err(DevToolsError::Protocol(message.to_string()));
        }
        return Ok(value.get("result").cloned().unwrap_or(Value::Null));
    }
    Err(DevToolsError::Protocol("DevTools socket closed".to_string()))
}

/// Executes queued commands for one window until the queue closes.
///
/// The session is opened before a command's timer starts, so a browser that
/// is slow to start is not mistaken for a hung page.  A command that takes
/// longer than [`UNRESPONSIVE_AFTER`] marks the window unresponsive; the next
/// command that completes marks it responsive again.
/// A command still pending after a further [`ABANDON_AFTER`] is dropped and
/// the session reset.
pub async fn run_worker(
    mut client: DevToolsClient,
    mut commands: mpsc::UnboundedReceiver<DevToolsCommand>,
    sink: SurfaceEventSink,
) {
    let mut hung = false;
    while let Some(command) = commands.recv().await {
        if let Err(e) = client.connect().await {
            warn!("{} on {}: {e}", command.method(), sink.key());
            continue;
        }

        let result = {
            let pending = client.execute(&command);
            tokio::pin!(pending);
            match time::timeout(UNRESPONSIVE_AFTER, &mut pending).await {
                Ok(result) => Some(result),
                Err(_) => {
                    if !hung {
                        hung = true;
                        sink.unresponsive();
                    }
                    time::timeout(ABANDON_AFTER, &mut pending).await.ok()
                }
            }
        };

        match result {
            Some(Ok(())) => {
                if hung {
                    hung = false;
                    sink.responsive();
                }
            }
            Some(Err(e)) => warn!("{} on {}: {e}", command.method(), sink.key()),
            None => {
                warn!("{} on {} abandoned", command.method(), sink.key());
                client.reset();
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{event_channel, SurfaceId, SurfaceKey};
    use display_core::DisplayId;

    #[test]
    fn test_parse_active_port_reads_port_and_path() {
        // Arrange
        let contents = "40411\n/devtools/browser/2b6c1f0e-7d1e-4c55-a1d2-1f8e3b9a0c77\n";

        // Act
        let parsed = parse_active_port(contents);

        // Assert
        assert_eq!(
            parsed,
            Some((
                40411,
                "/devtools/browser/2b6c1f0e-7d1e-4c55-a1d2-1f8e3b9a0c77".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_active_port_rejects_partial_file() {
        assert_eq!(parse_active_port(""), None);
        assert_eq!(parse_active_port("40411\n"), None);
        assert_eq!(parse_active_port("port\n/devtools/browser/x"), None);
    }

    #[test]
    fn test_reload_requests_cache_bypass() {
        let cmd = DevToolsCommand::Reload { ignore_cache: true };
        assert_eq!(cmd.method(), "Page.reload");
        assert_eq!(cmd.params(), json!({ "ignoreCache": true }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_browser_start_is_not_reported_unresponsive() {
        // Arrange: the browser never publishes its port file.
        let profile = std::env::temp_dir()
            .join(format!("display-agent-devtools-absent-{}", std::process::id()));
        let (tx, mut rx) = event_channel();
        let sink = SurfaceEventSink::new(SurfaceKey::new(DisplayId(1), SurfaceId(1)), tx);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(DevToolsClient::new(&profile), commands_rx, sink));

        // Act
        commands_tx
            .send(DevToolsCommand::Navigate("https://a.example".into()))
            .expect("queue");
        drop(commands_tx);
        worker.await.expect("worker");

        // Assert
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_navigate_params_carry_url() {
        let cmd = DevToolsCommand::Navigate("https://a.example/?q=1".into());
        assert_eq!(cmd.params()["url"], "https://a.example/?q=1");
    }
}
