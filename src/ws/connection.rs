//! WebSocket transport
//!
//! Feeds are generic over `Transport` so that read loops can be driven by the
//! tokio-tungstenite client in production and by in-memory channels in tests.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

/// Connect timeout for a single attempt
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur with WebSocket connections
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Timeout")]
    Timeout,
    #[error("Not connected")]
    NotConnected,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Message-oriented duplex connection
pub trait Transport: Send {
    /// Next data payload; `Ok(None)` once the peer closed
    fn recv(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    fn send_text(&mut self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Send a protocol close frame and shut the connection
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens transports
pub trait Connector: Send + Sync + 'static {
    type Conn: Transport + 'static;

    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Conn>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connected,
    Disconnected,
}

/// tokio-tungstenite client connection
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    state: ConnectionState,
}

impl WebSocketConnection {
    /// Connect to a ws:// or wss:// endpoint
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| WebSocketError::Timeout)?
            .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;

        // Disable Nagle's algorithm on plain TCP
        if let MaybeTlsStream::Plain(tcp) = ws_stream.get_ref() {
            tcp.set_nodelay(true)
                .map_err(|e| WebSocketError::ConnectionFailed(e.to_string()))?;
        }

        Ok(Self {
            stream: ws_stream,
            state: ConnectionState::Connected,
        })
    }

    async fn send(&mut self, msg: Message) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(WebSocketError::NotConnected);
        }
        self.stream
            .send(msg)
            .await
            .map_err(|e| WebSocketError::SendFailed(e.to_string()))
    }
}

impl Transport for WebSocketConnection {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        if self.state != ConnectionState::Connected {
            return Err(WebSocketError::NotConnected);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => return Ok(Some(Bytes::from(text))),
                    Message::Binary(data) => return Ok(Some(data)),
                    Message::Close(_) => {
                        self.state = ConnectionState::Disconnected;
                        return Ok(None);
                    }
                    // Pongs are queued by tungstenite itself
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                },
                Some(Err(e)) => return Err(WebSocketError::ReceiveFailed(e.to_string())),
                None => {
                    self.state = ConnectionState::Disconnected;
                    return Ok(None);
                }
            }
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(Message::text(text)).await
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Disconnected;
            self.stream
                .close(None)
                .await
                .map_err(|e| WebSocketError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }
}

/// Connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    type Conn = WebSocketConnection;

    async fn connect(&self, url: &str) -> Result<WebSocketConnection> {
        WebSocketConnection::connect(url).await
    }
}
