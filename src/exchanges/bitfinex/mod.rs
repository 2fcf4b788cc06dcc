//! Bitfinex WebSocket adapter
//!
//! One `ticker` subscription per pair. Bitfinex answers each with a numeric
//! channel id and references only that id afterwards, so the feed runs
//! through a `SubscriptionHandshake` before ticks are read.

pub mod types;

use crate::core::{ProductRegistry, Quote};
use crate::exchanges::traits::{DecodeError, QuoteAdapter};
use crate::exchanges::Exchange;
use crate::ws::{AckOutcome, HandshakeError, SubscriptionHandshake};
use std::sync::Arc;
use types::{ChannelMessage, EventMessage, FeedMessage, SubscribeRequest};

/// Bitfinex ticker adapter
pub struct BitfinexAdapter {
    url: String,
    registry: Arc<ProductRegistry>,
    handshake: SubscriptionHandshake,
}

impl BitfinexAdapter {
    pub const WS_URL: &'static str = "wss://api-pub.bitfinex.com/ws/2";

    pub fn new(url: impl Into<String>, registry: Arc<ProductRegistry>) -> Self {
        Self {
            url: url.into(),
            registry,
            handshake: SubscriptionHandshake::new(),
        }
    }

    fn on_event(&mut self, event: EventMessage) -> Result<Vec<Quote>, DecodeError> {
        match event.event.as_str() {
            "subscribed" => {
                let (Some(chan_id), Some(pair)) = (event.chan_id, event.pair.as_deref()) else {
                    return Err(DecodeError::Unexpected(
                        "subscribed event without chanId or pair".to_string(),
                    ));
                };
                match self.handshake.acknowledge(chan_id, pair)? {
                    AckOutcome::Completed => {
                        tracing::info!(
                            target: "feed",
                            exchange = "bitfinex",
                            "Subscription handshake complete"
                        );
                    }
                    AckOutcome::Pending { remaining } => {
                        tracing::debug!(
                            target: "feed",
                            exchange = "bitfinex",
                            chan_id,
                            pair,
                            remaining,
                            "Channel acknowledged"
                        );
                    }
                    AckOutcome::Ignored => {}
                }
                Ok(Vec::new())
            }
            "error" => {
                let message = format!(
                    "{} (code {})",
                    event.msg.unwrap_or_default(),
                    event.code.unwrap_or_default()
                );
                if self.handshake.is_listening() {
                    Err(DecodeError::Remote(message))
                } else {
                    Err(HandshakeError::Rejected(message).into())
                }
            }
            // info, conf, pong
            _ => Ok(Vec::new()),
        }
    }

    fn on_channel(&self, message: ChannelMessage) -> Result<Vec<Quote>, DecodeError> {
        // Ticks racing the acknowledgments are dropped until every pair is bound
        if message.is_heartbeat() || !self.handshake.is_listening() {
            return Ok(Vec::new());
        }

        let Some(pair) = self.handshake.resolve(message.chan_id()) else {
            return Ok(Vec::new());
        };
        let Some(product) = self.registry.lookup(Exchange::Bitfinex, pair) else {
            return Ok(Vec::new());
        };
        let (bid, ask) = message.best().ok_or_else(|| {
            DecodeError::Unexpected(format!("ticker payload for channel {}", message.chan_id()))
        })?;
        Ok(vec![Quote::from_product(product, bid, ask)])
    }
}

impl QuoteAdapter for BitfinexAdapter {
    #[inline]
    fn exchange(&self) -> Exchange {
        Exchange::Bitfinex
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscribe_requests(&mut self) -> Vec<String> {
        let pairs = self.registry.native_pairs(Exchange::Bitfinex);
        self.handshake.begin(pairs.iter().cloned());

        pairs
            .iter()
            .filter_map(|pair| {
                serde_json::to_string(&SubscribeRequest {
                    event: "subscribe",
                    channel: "ticker",
                    symbol: format!("t{}", pair),
                })
                .ok()
            })
            .collect()
    }

    #[inline]
    fn is_listening(&self) -> bool {
        self.handshake.is_listening()
    }

    fn handle_message(&mut self, payload: &[u8]) -> Result<Vec<Quote>, DecodeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<FeedMessage>(payload)? {
            FeedMessage::Event(event) => self.on_event(event),
            FeedMessage::Channel(message) => self.on_channel(message),
        }
    }
}
