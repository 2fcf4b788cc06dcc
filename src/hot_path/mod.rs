//! Hot path operations - no I/O, no panics
//!
//! This module contains the per-message state machines:
//! - Spread stacks and order book reconciliation
//! - Cross-exchange aggregation
//! - Arbitrage detection

pub mod arbitrage;
pub mod broker;
pub mod order_book;
pub mod spread_stack;

pub use arbitrage::{ArbMarket, ArbitrageDetector};
pub use broker::{Broker, Insertion, Market, MarketSide, QuoteError, TopOfBook};
pub use order_book::{BestPrices, BookError, LevelChange, OrderBookReconciler};
pub use spread_stack::{BookSide, SpreadNode, SpreadStack};
