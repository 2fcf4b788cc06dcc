//! Normalized best bid/ask tick

use crate::core::Product;
use crate::exchanges::Exchange;
use serde::Serialize;

/// Normalized tick produced by an exchange adapter
///
/// Prices keep the exchange's own text so that no precision is lost before
/// the aggregation step decides how to interpret them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub exchange: Exchange,
    pub ex_pair: String,
    pub pair: String,
    pub base: String,
    pub quote: String,
    pub bid: String,
    pub ask: String,
}

impl Quote {
    /// Build a quote for a registered product
    pub fn from_product(product: &Product, bid: impl Into<String>, ask: impl Into<String>) -> Self {
        Self {
            exchange: product.exchange,
            ex_pair: product.ex_pair.clone(),
            pair: product.pair.clone(),
            base: product.base.clone(),
            quote: product.quote.clone(),
            bid: bid.into(),
            ask: ask.into(),
        }
    }

    /// Both sides carry a price
    #[inline]
    pub fn is_complete(&self) -> bool {
        !self.bid.trim().is_empty() && !self.ask.trim().is_empty()
    }
}
