//! Arbitrage detection
//!
//! Buy at the lowest ask, sell at the highest bid:
//! spread = (best bid - best ask) / best ask * 100, positive when profitable.

use crate::hot_path::broker::{Market, MarketSide, TopOfBook};
use serde::Serialize;

/// Cross-exchange opportunity for one base asset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbMarket {
    pub base: String,
    /// Spread in percent
    pub spread: f64,
    /// Acquisition leg (best ask)
    pub low: MarketSide,
    /// Disposal leg (best bid)
    pub high: MarketSide,
}

/// Spread threshold check on aggregation updates
#[derive(Debug, Clone, Copy)]
pub struct ArbitrageDetector {
    min_spread_pct: f64,
}

impl ArbitrageDetector {
    pub fn new(min_spread_pct: f64) -> Self {
        Self { min_spread_pct }
    }

    #[inline]
    pub fn min_spread(&self) -> f64 {
        self.min_spread_pct
    }

    /// Spread in percent between a bid and an ask
    ///
    /// `None` when the ask is not a positive finite price.
    #[inline]
    pub fn spread(best_bid: f64, best_ask: f64) -> Option<f64> {
        if !best_ask.is_finite() || best_ask <= 0.0 || !best_bid.is_finite() {
            return None;
        }
        Some((best_bid - best_ask) / best_ask * 100.0)
    }

    /// Decide whether an update to `market` should notify subscribers
    ///
    /// Requires two entries per side and a moved top of book. A market with
    /// no previous top counts as moved.
    pub fn evaluate(
        &self,
        base: &str,
        previous: Option<TopOfBook>,
        market: &Market,
    ) -> Option<ArbMarket> {
        if market.bids().len() < 2 || market.asks().len() < 2 {
            return None;
        }
        let top = market.top()?;
        if previous == Some(top) {
            return None;
        }
        self.compute(base, market)
    }

    /// Current opportunity in `market`, if above the threshold
    pub fn compute(&self, base: &str, market: &Market) -> Option<ArbMarket> {
        if market.bids().len() < 2 || market.asks().len() < 2 {
            return None;
        }
        let high = market.best_bid()?;
        let low = market.best_ask()?;
        let spread = Self::spread(high.triangulated, low.triangulated)?;

        if spread <= self.min_spread_pct {
            return None;
        }

        Some(ArbMarket {
            base: base.to_string(),
            spread,
            low: low.clone(),
            high: high.clone(),
        })
    }
}

impl Default for ArbitrageDetector {
    fn default() -> Self {
        Self::new(0.01)
    }
}
