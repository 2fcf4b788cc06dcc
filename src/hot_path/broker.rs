//! Aggregation engine
//!
//! Single owner of every cross-exchange `Market` and of the rate tables.
//! Lives inside the engine actor; nothing else mutates it.

use crate::core::{Quote, RateTables};
use crate::exchanges::Exchange;
use crate::hot_path::arbitrage::{ArbMarket, ArbitrageDetector};
use crate::CurrencyConfig;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// One exchange's price on one side of a market
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSide {
    pub exchange: Exchange,
    /// Price in the pair's own quote currency
    pub price: f64,
    /// Price converted to USD
    pub triangulated: f64,
    pub ex_pair: String,
    pub pair: String,
}

/// Best triangulated bid and ask of a market
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopOfBook {
    pub best_bid: f64,
    pub best_ask: f64,
}

/// Cross-exchange view of one base asset
///
/// Bids sorted highest first, asks lowest first, at most one entry per
/// exchange per side.
#[derive(Debug, Clone, Default)]
pub struct Market {
    bids: Vec<MarketSide>,
    asks: Vec<MarketSide>,
}

impl Market {
    #[inline]
    pub fn bids(&self) -> &[MarketSide] {
        &self.bids
    }

    #[inline]
    pub fn asks(&self) -> &[MarketSide] {
        &self.asks
    }

    #[inline]
    pub fn best_bid(&self) -> Option<&MarketSide> {
        self.bids.first()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<&MarketSide> {
        self.asks.first()
    }

    /// Top of book, if both sides have entries
    pub fn top(&self) -> Option<TopOfBook> {
        Some(TopOfBook {
            best_bid: self.bids.first()?.triangulated,
            best_ask: self.asks.first()?.triangulated,
        })
    }

    fn sort(&mut self) {
        self.bids
            .sort_by(|a, b| b.triangulated.total_cmp(&a.triangulated));
        self.asks
            .sort_by(|a, b| a.triangulated.total_cmp(&b.triangulated));
    }
}

/// Result of a successful insert
#[derive(Debug, Clone, PartialEq)]
pub struct Insertion {
    pub base: String,
    /// Top of book before the quote was applied
    pub previous: Option<TopOfBook>,
}

/// Quote aggregation across exchanges
pub struct Broker {
    rates: RateTables,
    eligible: HashSet<String>,
    markets: HashMap<String, Market>,
}

impl Broker {
    pub fn new(currencies: &CurrencyConfig, eligible: HashSet<String>) -> Self {
        Self {
            rates: RateTables::new(currencies),
            eligible,
            markets: HashMap::new(),
        }
    }

    /// Apply a quote to its base asset's market
    ///
    /// Returns `Ok(None)` for bases outside the eligible set. Empty or
    /// unparseable prices are rejected before any state changes.
    pub fn insert(&mut self, quote: &Quote) -> Result<Option<Insertion>, QuoteError> {
        if !self.eligible.contains(&quote.base) {
            return Ok(None);
        }

        let bid = parse_price(quote, &quote.bid)?;
        let ask = parse_price(quote, &quote.ask)?;

        self.rates.observe(quote, ask);

        let bid_usd = self.rates.triangulate(bid, &quote.quote);
        let ask_usd = self.rates.triangulate(ask, &quote.quote);

        let market = self.markets.entry(quote.base.clone()).or_default();
        let previous = market.top();

        upsert(&mut market.bids, quote, bid, bid_usd);
        upsert(&mut market.asks, quote, ask, ask_usd);
        market.sort();

        tracing::trace!(
            target: "broker",
            base = %quote.base,
            exchange = %quote.exchange,
            bid_usd,
            ask_usd,
            "Quote applied"
        );

        Ok(Some(Insertion {
            base: quote.base.clone(),
            previous,
        }))
    }

    #[inline]
    pub fn market(&self, base: &str) -> Option<&Market> {
        self.markets.get(base)
    }

    #[inline]
    pub fn rates(&self) -> &RateTables {
        &self.rates
    }

    /// Every currently profitable market, sorted by base
    pub fn snapshot(&self, detector: &ArbitrageDetector) -> Vec<ArbMarket> {
        let mut arbs: Vec<ArbMarket> = self
            .markets
            .iter()
            .filter_map(|(base, market)| detector.compute(base, market))
            .collect();
        arbs.sort_by(|a, b| a.base.cmp(&b.base));
        arbs
    }
}

/// Update this exchange's entry in place, or append a new one
///
/// An entry whose conversion is unknown (zero) drops out of the side.
fn upsert(side: &mut Vec<MarketSide>, quote: &Quote, price: f64, triangulated: f64) {
    let usable = triangulated.is_finite() && triangulated > 0.0;
    let existing = side.iter().position(|s| s.exchange == quote.exchange);

    match (existing, usable) {
        (Some(idx), true) => {
            let entry = &mut side[idx];
            entry.price = price;
            entry.triangulated = triangulated;
            if entry.pair != quote.pair {
                entry.pair.clone_from(&quote.pair);
                entry.ex_pair.clone_from(&quote.ex_pair);
            }
        }
        (Some(idx), false) => {
            side.remove(idx);
        }
        (None, true) => side.push(MarketSide {
            exchange: quote.exchange,
            price,
            triangulated,
            ex_pair: quote.ex_pair.clone(),
            pair: quote.pair.clone(),
        }),
        (None, false) => {}
    }
}

fn parse_price(quote: &Quote, raw: &str) -> Result<f64, QuoteError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QuoteError::EmptyPrice {
            exchange: quote.exchange,
            pair: quote.pair.clone(),
        });
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(QuoteError::InvalidPrice {
            exchange: quote.exchange,
            pair: quote.pair.clone(),
            value: raw.to_string(),
        }),
    }
}

/// Rejected quote
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuoteError {
    #[error("{exchange} {pair}: empty price")]
    EmptyPrice { exchange: Exchange, pair: String },

    #[error("{exchange} {pair}: invalid price {value:?}")]
    InvalidPrice {
        exchange: Exchange,
        pair: String,
        value: String,
    },
}
