//! WebSocket clients for real-time market data

pub mod connection;
pub mod feed;
pub mod subscription;

pub use connection::{
    Connector, Transport, TungsteniteConnector, WebSocketConnection, WebSocketError,
};
pub use feed::{run_feed, FeedContext, FeedExit, ReconnectPolicy};
pub use subscription::{AckOutcome, HandshakeError, HandshakeState, SubscriptionHandshake};
