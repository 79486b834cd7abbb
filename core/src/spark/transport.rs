use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::{Result, RouletteError};

/// Opens text-frame connections to the chat service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// An open, ordered, bidirectional text-frame connection
#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame; `None` once the peer closed the connection.
    async fn recv_text(&mut self) -> Option<Result<String>>;

    /// Best-effort close. Safe to call more than once.
    async fn close(&mut self);
}

/// WebSocket transport over rustls
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| RouletteError::Transport(format!("WebSocket connect failed: {e}")))?;
        debug!(target: "ws_transport", status = %response.status(), "WebSocket connected");
        Ok(Box::new(WsConnection {
            stream,
            closed: false,
        }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| RouletteError::Transport(format!("WebSocket send failed: {e}")))
    }

    async fn recv_text(&mut self) -> Option<Result<String>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(m) => m,
                Err(e) => {
                    return Some(Err(RouletteError::Transport(format!(
                        "WebSocket receive failed: {e}"
                    ))))
                }
            };
            match msg {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(bytes) => {
                    return Some(String::from_utf8(bytes).map_err(|e| {
                        RouletteError::Protocol(format!("binary frame is not UTF-8: {e}"))
                    }))
                }
                Message::Close(frame) => {
                    debug!(target: "ws_transport", ?frame, "Peer closed WebSocket");
                    self.closed = true;
                    return None;
                }
                // pongs are answered by tungstenite on read
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            warn!(target: "ws_transport", error = %e, "WebSocket close failed");
        }
    }
}
