//! WebSocket transport for the control connection.
//!
//! Wraps a `tokio-tungstenite` client stream as a [`Transport`].  Only text
//! frames carry protocol messages.  Binary frames that happen to be valid
//! UTF-8 are accepted as text; WebSocket-level ping/pong is answered by
//! tungstenite itself and never reaches the agent.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use super::{ConnectionError, Connector, Transport};

/// [`Connector`] that dials `ws://` endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, ConnectionError> {
        let (stream, response) =
            connect_async(endpoint)
                .await
                .map_err(|e| ConnectionError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
        debug!("WebSocket handshake with {endpoint} completed ({})", response.status());
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

/// An established client WebSocket.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), ConnectionError> {
        self.stream
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectionError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(ConnectionError::Transport(e.to_string()))),
            };

            match msg {
                WsMessage::Text(text) => return Some(Ok(text)),
                WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!("ignoring non-UTF-8 binary frame"),
                },
                WsMessage::Close(frame) => {
                    debug!("server sent Close: {frame:?}");
                    // Flushes the queued close reply so the handshake completes.
                    match self.stream.close(None).await {
                        Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
                        Err(e) => debug!("close handshake not completed: {e}"),
                    }
                    return None;
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn local_server() -> (String, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        (format!("ws://{addr}"), listener)
    }

    #[tokio::test]
    async fn test_text_frames_are_received() {
        // Arrange
        let (url, listener) = local_server().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
            ws.send(WsMessage::Text(r#"{"type":"PING"}"#.to_string()))
                .await
                .expect("send");
            ws
        });

        // Act
        let mut transport = WebSocketConnector.connect(&url).await.expect("connect");
        let frame = transport.recv().await;

        // Assert
        assert!(matches!(frame, Some(Ok(text)) if text == r#"{"type":"PING"}"#));
        drop(server.await.expect("server task"));
    }

    #[tokio::test]
    async fn test_server_close_is_answered_before_link_ends() {
        // Arrange
        let (url, listener) = local_server().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
            ws.send(WsMessage::Close(None)).await.expect("send close");
            ws.next().await
        });
        let mut transport = WebSocketConnector.connect(&url).await.expect("connect");

        // Act
        let ended = transport.recv().await;

        // Assert: the server sees the close reply while the transport is
        // still alive, not a dropped socket.
        assert!(ended.is_none());
        let reply = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("close reply within timeout")
            .expect("server task");
        assert!(matches!(reply, Some(Ok(WsMessage::Close(_)))));
        drop(transport);
    }
}
