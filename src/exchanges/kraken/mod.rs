//! Kraken WebSocket adapter
//!
//! Subscribes to the `spread` channel by wsname (`XBT/USD`). Every tick
//! already carries the best bid and ask, so no book is kept.

pub mod types;

use crate::core::{ProductRegistry, Quote};
use crate::exchanges::traits::{DecodeError, QuoteAdapter};
use crate::exchanges::Exchange;
use std::sync::Arc;
use types::{FeedMessage, SubscribeRequest, Subscription};

/// Kraken spread adapter
pub struct KrakenAdapter {
    url: String,
    registry: Arc<ProductRegistry>,
}

impl KrakenAdapter {
    pub const WS_URL: &'static str = "wss://ws.kraken.com";

    pub fn new(url: impl Into<String>, registry: Arc<ProductRegistry>) -> Self {
        Self {
            url: url.into(),
            registry,
        }
    }
}

impl QuoteAdapter for KrakenAdapter {
    #[inline]
    fn exchange(&self) -> Exchange {
        Exchange::Kraken
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscribe_requests(&mut self) -> Vec<String> {
        let pairs = self.registry.native_pairs(Exchange::Kraken);
        if pairs.is_empty() {
            return Vec::new();
        }
        let request = SubscribeRequest {
            event: "subscribe",
            pair: &pairs,
            subscription: Subscription { name: "spread" },
        };
        serde_json::to_string(&request).into_iter().collect()
    }

    fn handle_message(&mut self, payload: &[u8]) -> Result<Vec<Quote>, DecodeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<FeedMessage>(payload)? {
            FeedMessage::Event(event) => {
                if event.status.as_deref() == Some("error") {
                    return Err(DecodeError::Remote(format!(
                        "{} {}: {}",
                        event.event,
                        event.pair.unwrap_or_default(),
                        event.error_message.unwrap_or_default()
                    )));
                }
                Ok(Vec::new())
            }
            FeedMessage::Spread(tick) => {
                if tick.channel_name() != "spread" {
                    return Ok(Vec::new());
                }
                let Some(product) = self.registry.lookup(Exchange::Kraken, tick.pair()) else {
                    return Ok(Vec::new());
                };
                let (bid, ask) = tick.best().ok_or_else(|| {
                    let pair = tick.pair();
                    DecodeError::Unexpected(format!("spread tick without prices for {}", pair))
                })?;
                Ok(vec![Quote::from_product(product, bid, ask)])
            }
        }
    }
}
