//! Coinbase WebSocket adapter
//!
//! Subscribes to the `level2` channel and rebuilds the top of book from a
//! snapshot plus incremental updates. A quote is emitted only when the best
//! bid or best ask moves, at most one per message.

pub mod types;

use crate::core::{ProductRegistry, Quote};
use crate::exchanges::traits::{DecodeError, QuoteAdapter};
use crate::exchanges::Exchange;
use crate::hot_path::{BestPrices, BookSide, LevelChange, OrderBookReconciler, SpreadNode};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use types::{Channel, FeedMessage, LevelTwoUpdate, Snapshot, SubscribeRequest};

/// Coinbase level2 adapter
pub struct CoinbaseAdapter {
    url: String,
    registry: Arc<ProductRegistry>,
    book: OrderBookReconciler,
    depth: usize,
    seed_levels: usize,
}

impl CoinbaseAdapter {
    pub const WS_URL: &'static str = "wss://ws-feed.exchange.coinbase.com";

    pub fn new(
        url: impl Into<String>,
        registry: Arc<ProductRegistry>,
        depth: usize,
        seed_levels: usize,
    ) -> Self {
        Self {
            url: url.into(),
            registry,
            book: OrderBookReconciler::new(depth, seed_levels),
            depth,
            seed_levels,
        }
    }

    fn on_snapshot(&mut self, snapshot: Snapshot) -> Result<Vec<Quote>, DecodeError> {
        let Some(product) = self.registry.lookup(Exchange::Coinbase, &snapshot.product_id) else {
            return Ok(Vec::new());
        };

        let bids = parse_levels(&snapshot.bids, self.seed_levels)?;
        let asks = parse_levels(&snapshot.asks, self.seed_levels)?;

        let best = self.book.apply_snapshot(&snapshot.product_id, &bids, &asks);
        Ok(best.map(|b| to_quote(product, b)).into_iter().collect())
    }

    fn on_update(&mut self, update: LevelTwoUpdate) -> Result<Vec<Quote>, DecodeError> {
        let Some(product) = self.registry.lookup(Exchange::Coinbase, &update.product_id) else {
            return Ok(Vec::new());
        };

        let changes = update
            .changes
            .iter()
            .map(|(side, price, size)| {
                let side = match side.as_str() {
                    "buy" => BookSide::Bid,
                    "sell" => BookSide::Ask,
                    other => return Err(DecodeError::Unexpected(format!("order side {:?}", other))),
                };
                Ok(LevelChange {
                    side,
                    price: parse_decimal(price)?,
                    size: parse_decimal(size)?,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let best = self.book.apply_delta(&update.product_id, &changes)?;
        Ok(best.map(|b| to_quote(product, b)).into_iter().collect())
    }
}

impl QuoteAdapter for CoinbaseAdapter {
    #[inline]
    fn exchange(&self) -> Exchange {
        Exchange::Coinbase
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscribe_requests(&mut self) -> Vec<String> {
        self.book = OrderBookReconciler::new(self.depth, self.seed_levels);

        let pairs = self.registry.native_pairs(Exchange::Coinbase);
        if pairs.is_empty() {
            return Vec::new();
        }
        let request = SubscribeRequest {
            kind: "subscribe",
            product_ids: &pairs,
            channels: [Channel {
                name: "level2",
                product_ids: &pairs,
            }],
        };
        serde_json::to_string(&request).into_iter().collect()
    }

    fn handle_message(&mut self, payload: &[u8]) -> Result<Vec<Quote>, DecodeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<FeedMessage>(payload)? {
            FeedMessage::Snapshot(snapshot) => self.on_snapshot(snapshot),
            FeedMessage::Update(update) => self.on_update(update),
            FeedMessage::Error { message, reason } => {
                Err(DecodeError::Remote(format!("{} {}", message, reason).trim().to_string()))
            }
            FeedMessage::Other => Ok(Vec::new()),
        }
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, DecodeError> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| DecodeError::Number(raw.to_string()))
}

fn parse_levels(levels: &[(String, String)], limit: usize) -> Result<Vec<SpreadNode>, DecodeError> {
    levels
        .iter()
        .take(limit)
        .map(|(price, size)| Ok(SpreadNode::new(parse_decimal(price)?, parse_decimal(size)?)))
        .collect()
}

fn to_quote(product: &crate::core::Product, best: BestPrices) -> Quote {
    Quote::from_product(product, best.bid.to_string(), best.ask.to_string())
}
