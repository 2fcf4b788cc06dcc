//! Cross-exchange quote broker
//!
//! Core library for normalizing exchange ticks, reconciling delta order books,
//! triangulating prices to USD and detecting arbitrage between exchanges.

pub mod core;
pub mod engine;
pub mod exchanges;
pub mod hot_path;
pub mod infrastructure;
pub mod ws;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use infrastructure::config::{ApiConfig, BrokerConfig, Config, CurrencyConfig};

use thiserror::Error;

/// Main error type for the broker
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] ws::WebSocketError),

    #[error("Connection to {exchange} failed: {message}")]
    Connection { exchange: String, message: String },

    #[error("Subscription handshake failed: {0}")]
    Handshake(#[from] ws::HandshakeError),

    #[error("Product catalog error: {0}")]
    Catalog(#[from] core::CatalogError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Quote rejected: {0}")]
    Quote(#[from] hot_path::QuoteError),

    #[error("Engine stopped")]
    EngineStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BrokerError>;
