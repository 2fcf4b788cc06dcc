//! Order book reconciliation for snapshot + delta feeds
//!
//! Keeps a bid and an ask `SpreadStack` per pair. A delta message only yields
//! a top of book when the best bid or best ask actually moved.

use crate::hot_path::spread_stack::{BookSide, SpreadNode, SpreadStack};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One level update from a delta message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub side: BookSide,
    pub price: Decimal,
    pub size: Decimal,
}

/// Best bid and ask prices of a reconciled book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestPrices {
    pub bid: Decimal,
    pub ask: Decimal,
}

#[derive(Debug, Clone)]
struct PairBook {
    bids: SpreadStack,
    asks: SpreadStack,
}

impl PairBook {
    fn side_mut(&mut self, side: BookSide) -> &mut SpreadStack {
        match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        }
    }

    fn best(&self) -> Option<BestPrices> {
        Some(BestPrices {
            bid: self.bids.best()?.price,
            ask: self.asks.best()?.price,
        })
    }
}

/// Per-pair book state for one exchange connection
#[derive(Debug, Clone)]
pub struct OrderBookReconciler {
    depth: usize,
    seed_levels: usize,
    books: HashMap<String, PairBook>,
}

impl OrderBookReconciler {
    /// Create a reconciler holding `depth` levels per side, seeding `seed_levels` from snapshots
    pub fn new(depth: usize, seed_levels: usize) -> Self {
        Self {
            depth,
            seed_levels,
            books: HashMap::new(),
        }
    }

    /// Replace the book for `pair` with the first levels of a snapshot
    pub fn apply_snapshot(
        &mut self,
        pair: &str,
        bids: &[SpreadNode],
        asks: &[SpreadNode],
    ) -> Option<BestPrices> {
        let mut book = PairBook {
            bids: SpreadStack::new(self.depth, BookSide::Bid),
            asks: SpreadStack::new(self.depth, BookSide::Ask),
        };
        for node in bids.iter().take(self.seed_levels) {
            book.bids.push(*node);
        }
        for node in asks.iter().take(self.seed_levels) {
            book.asks.push(*node);
        }

        let best = book.best();
        self.books.insert(pair.to_string(), book);
        best
    }

    /// Apply one delta message
    ///
    /// Returns the new best prices only if either side's best moved.
    /// A side left empty is treated as a transient desync and yields nothing.
    pub fn apply_delta(
        &mut self,
        pair: &str,
        changes: &[LevelChange],
    ) -> Result<Option<BestPrices>, BookError> {
        let book = self
            .books
            .get_mut(pair)
            .ok_or_else(|| BookError::MissingSnapshot(pair.to_string()))?;

        let before = book.best();

        for change in changes {
            let stack = book.side_mut(change.side);
            if change.size.is_zero() {
                stack.pop(change.price);
            } else if change.size.is_sign_positive() && stack.accepts(change.price) {
                stack.push(SpreadNode::new(change.price, change.size));
            }
        }

        let after = match book.best() {
            Some(best) => best,
            None => {
                tracing::debug!(pair, "Order book side empty after delta");
                return Ok(None);
            }
        };

        if before == Some(after) {
            return Ok(None);
        }
        Ok(Some(after))
    }

    /// Current best prices for `pair`
    pub fn best(&self, pair: &str) -> Option<BestPrices> {
        self.books.get(pair)?.best()
    }

    /// Depth held on each side of `pair`
    pub fn depth_of(&self, pair: &str) -> Option<(usize, usize)> {
        self.books.get(pair).map(|b| (b.bids.len(), b.asks.len()))
    }
}

/// Order book errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    #[error("delta for {0} before snapshot")]
    MissingSnapshot(String),
}
