//! Exchange abstraction
//!
//! Each exchange owns its wire format and private state (order book,
//! channel-id map) behind `QuoteAdapter`. `ExchangeClient` is the closed set
//! of adapters, dispatched statically.

use crate::core::{ProductRegistry, Quote};
use crate::exchanges::{BinanceAdapter, BitfinexAdapter, CoinbaseAdapter, Exchange, KrakenAdapter};
use crate::hot_path::BookError;
use crate::ws::HandshakeError;
use crate::BrokerConfig;
use std::fmt;
use std::sync::Arc;

/// Exchange-specific error information
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{exchange}] {kind}: {message}")]
pub struct ExchangeError {
    pub exchange: Exchange,
    pub kind: ErrorKind,
    pub message: String,
}

impl ExchangeError {
    pub fn new(exchange: Exchange, kind: ErrorKind, message: impl fmt::Display) -> Self {
        Self {
            exchange,
            kind,
            message: message.to_string(),
        }
    }
}

/// Error classification for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Could not open the connection
    Connection,
    /// Read failed or peer closed; ends that feed
    Read,
    /// One message could not be decoded; feed continues
    Decode,
    /// Subscribe request could not be sent
    Subscription,
    /// Channel-id handshake failed or timed out
    Handshake,
    /// Quote rejected by the aggregation engine
    Quote,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Read => "read",
            ErrorKind::Decode => "decode",
            ErrorKind::Subscription => "subscription",
            ErrorKind::Handshake => "handshake",
            ErrorKind::Quote => "quote",
        };
        f.write_str(s)
    }
}

/// Wire decoding errors
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected message: {0}")]
    Unexpected(String),

    #[error("invalid number {0:?}")]
    Number(String),

    #[error(transparent)]
    Book(#[from] BookError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("exchange reported: {0}")]
    Remote(String),
}

impl DecodeError {
    /// Errors that end the feed instead of skipping one message
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::Handshake(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Handshake(_) => ErrorKind::Handshake,
            _ => ErrorKind::Decode,
        }
    }
}

/// Per-exchange feed behavior
pub trait QuoteAdapter: Send + 'static {
    /// Get exchange identifier
    fn exchange(&self) -> Exchange;

    /// Get exchange name (for logging/metrics)
    fn name(&self) -> &'static str {
        self.exchange().name()
    }

    /// WebSocket endpoint
    fn url(&self) -> &str;

    /// Connection attempts are retried with backoff instead of failing startup
    fn flaky_handshake(&self) -> bool {
        false
    }

    /// Text frames to send right after connecting
    ///
    /// Resets any per-connection state (books, channel ids).
    fn subscribe_requests(&mut self) -> Vec<String>;

    /// False while a subscription handshake is still in progress
    fn is_listening(&self) -> bool {
        true
    }

    /// Decode one payload into zero or more quotes
    fn handle_message(&mut self, payload: &[u8]) -> Result<Vec<Quote>, DecodeError>;
}

/// Closed set of exchange adapters
pub enum ExchangeClient {
    Binance(BinanceAdapter),
    Coinbase(CoinbaseAdapter),
    Kraken(KrakenAdapter),
    Bitfinex(BitfinexAdapter),
}

impl ExchangeClient {
    /// Build the adapter for `exchange`
    pub fn new(
        exchange: Exchange,
        url: impl Into<String>,
        registry: Arc<ProductRegistry>,
        config: &BrokerConfig,
    ) -> Self {
        let url = url.into();
        match exchange {
            Exchange::Binance => ExchangeClient::Binance(BinanceAdapter::new(url, registry)),
            Exchange::Coinbase => ExchangeClient::Coinbase(CoinbaseAdapter::new(
                url,
                registry,
                config.book_depth,
                config.snapshot_levels,
            )),
            Exchange::Kraken => ExchangeClient::Kraken(KrakenAdapter::new(url, registry)),
            Exchange::Bitfinex => ExchangeClient::Bitfinex(BitfinexAdapter::new(url, registry)),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $client:ident => $body:expr) => {
        match $self {
            ExchangeClient::Binance($client) => $body,
            ExchangeClient::Coinbase($client) => $body,
            ExchangeClient::Kraken($client) => $body,
            ExchangeClient::Bitfinex($client) => $body,
        }
    };
}

impl QuoteAdapter for ExchangeClient {
    #[inline]
    fn exchange(&self) -> Exchange {
        dispatch!(self, c => c.exchange())
    }

    fn url(&self) -> &str {
        dispatch!(self, c => c.url())
    }

    fn flaky_handshake(&self) -> bool {
        dispatch!(self, c => c.flaky_handshake())
    }

    fn subscribe_requests(&mut self) -> Vec<String> {
        dispatch!(self, c => c.subscribe_requests())
    }

    #[inline]
    fn is_listening(&self) -> bool {
        dispatch!(self, c => c.is_listening())
    }

    #[inline]
    fn handle_message(&mut self, payload: &[u8]) -> Result<Vec<Quote>, DecodeError> {
        dispatch!(self, c => c.handle_message(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_registry;

    #[test]
    fn test_client_dispatch() {
        let registry = Arc::new(mock_registry());
        let config = BrokerConfig::default();
        for exchange in Exchange::ALL {
            let client =
                ExchangeClient::new(exchange, "wss://example.invalid", registry.clone(), &config);
            assert_eq!(client.exchange(), exchange);
            assert_eq!(client.name(), exchange.name());
            assert_eq!(client.url(), "wss://example.invalid");
        }
    }

    #[test]
    fn test_only_binance_is_flaky() {
        let registry = Arc::new(mock_registry());
        let config = BrokerConfig::default();
        let flaky: Vec<Exchange> = Exchange::ALL
            .into_iter()
            .filter(|ex| {
                ExchangeClient::new(*ex, "wss://x", registry.clone(), &config).flaky_handshake()
            })
            .collect();
        assert_eq!(flaky, vec![Exchange::Binance]);
    }

    #[test]
    fn test_error_classification() {
        let err = DecodeError::Handshake(HandshakeError::Rejected("pair".to_string()));
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Handshake);

        let err = DecodeError::Unexpected("x".to_string());
        assert!(!err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_exchange_error_display() {
        let err = ExchangeError::new(Exchange::Kraken, ErrorKind::Read, "connection reset");
        assert_eq!(err.to_string(), "[kraken] read: connection reset");
    }
}
