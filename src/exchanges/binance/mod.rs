//! Binance spot WebSocket adapter
//!
//! Reads the all-market ticker array stream (`!ticker@arr`). No subscription
//! is needed; symbols that are not in the product registry are skipped.

use crate::core::{ProductRegistry, Quote};
use crate::exchanges::traits::{DecodeError, QuoteAdapter};
use crate::exchanges::Exchange;
use serde::Deserialize;
use std::sync::Arc;

/// One entry of the `!ticker@arr` payload
///
/// ```json
/// {"e":"24hrTicker","E":123456789,"s":"BNBBTC","b":"0.0024","B":"10","a":"0.0026","A":"100",...}
/// ```
#[derive(Debug, Deserialize)]
pub struct TickerEntry {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b", default)]
    pub bid: String,
    #[serde(rename = "a", default)]
    pub ask: String,
}

/// Binance all-market ticker adapter
pub struct BinanceAdapter {
    url: String,
    registry: Arc<ProductRegistry>,
}

impl BinanceAdapter {
    /// Binance all-market ticker stream
    pub const WS_URL: &'static str = "wss://stream.binance.com:9443/ws/!ticker@arr";

    pub fn new(url: impl Into<String>, registry: Arc<ProductRegistry>) -> Self {
        Self {
            url: url.into(),
            registry,
        }
    }
}

impl QuoteAdapter for BinanceAdapter {
    #[inline]
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn url(&self) -> &str {
        &self.url
    }

    /// Binance handshakes fail intermittently under load
    fn flaky_handshake(&self) -> bool {
        true
    }

    fn subscribe_requests(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn handle_message(&mut self, payload: &[u8]) -> Result<Vec<Quote>, DecodeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let entries: Vec<TickerEntry> = serde_json::from_slice(payload)?;
        let quotes = entries
            .into_iter()
            .filter_map(|entry| {
                let product = self.registry.lookup(Exchange::Binance, &entry.symbol)?;
                Some(Quote::from_product(product, entry.bid, entry.ask))
            })
            .collect();
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_registry;

    fn adapter() -> BinanceAdapter {
        BinanceAdapter::new(BinanceAdapter::WS_URL, Arc::new(mock_registry()))
    }

    #[test]
    fn test_ticker_array() {
        let mut adapter = adapter();
        let msg = br#"[
            {"e":"24hrTicker","E":1,"s":"MOCKUSD","b":"1000000.00","B":"1","a":"1000001.00","A":"123"},
            {"e":"24hrTicker","E":1,"s":"DOGEBTC","b":"0.1","B":"1","a":"0.2","A":"1"}
        ]"#;

        let quotes = adapter.handle_message(msg).unwrap();
        assert_eq!(quotes.len(), 1);
        let quote = &quotes[0];
        assert_eq!(quote.exchange, Exchange::Binance);
        assert_eq!(quote.pair, "MOCK-USD");
        assert_eq!(quote.ex_pair, "MOCK-USD");
        assert_eq!(quote.bid, "1000000.00");
        assert_eq!(quote.ask, "1000001.00");
    }

    #[test]
    fn test_no_subscription_needed() {
        let mut adapter = adapter();
        assert!(adapter.subscribe_requests().is_empty());
        assert!(adapter.is_listening());
        assert!(adapter.flaky_handshake());
    }

    #[test]
    fn test_empty_payload_ignored() {
        let mut adapter = adapter();
        assert!(adapter.handle_message(b"").unwrap().is_empty());
        assert!(adapter.handle_message(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let mut adapter = adapter();
        let err = adapter.handle_message(b"{\"result\":null,\"id\":1}").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert!(!err.is_fatal());
    }
}
