//! Product registry
//!
//! Normalizes each exchange's native pair spelling (`XBT/USD`, `BTCUSD`,
//! `BTC-USD`) to a canonical identity. Built once at startup, read-only after.

use crate::exchanges::Exchange;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Identity record for a single market on a single exchange
///
/// `ex_*` fields are the exchange's own spelling, the rest are canonical.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Product {
    pub exchange: Exchange,
    pub ex_pair: String,
    pub pair: String,
    pub base: String,
    pub quote: String,
    #[serde(default)]
    pub ex_base: String,
    #[serde(default)]
    pub ex_quote: String,
}

impl Product {
    /// Build a product from canonical and exchange asset codes
    pub fn new(exchange: Exchange, ex_base: &str, ex_quote: &str, base: &str, quote: &str) -> Self {
        Self {
            exchange,
            ex_pair: format!("{}-{}", ex_base, ex_quote),
            pair: format!("{}-{}", base, quote),
            base: base.to_string(),
            quote: quote.to_string(),
            ex_base: ex_base.to_string(),
            ex_quote: ex_quote.to_string(),
        }
    }

    /// Pair spelling used on the exchange's websocket feed
    #[inline]
    pub fn native_pair(&self) -> String {
        self.exchange.native_pair(&self.ex_pair)
    }
}

/// Exchange -> (native pair -> Product) plus the arbitrage-eligible base set
#[derive(Debug, Clone, Default)]
pub struct ProductRegistry {
    by_exchange: HashMap<Exchange, HashMap<String, Product>>,
    eligible: HashSet<String>,
}

impl ProductRegistry {
    /// Build registry from storage records
    ///
    /// Later duplicates of the same (exchange, native pair) replace earlier ones.
    pub fn new(products: Vec<Product>, eligible: HashSet<String>) -> Self {
        let mut by_exchange: HashMap<Exchange, HashMap<String, Product>> = HashMap::new();
        for product in products {
            let native = product.native_pair();
            by_exchange
                .entry(product.exchange)
                .or_default()
                .insert(native, product);
        }

        tracing::info!(
            exchanges = by_exchange.len(),
            eligible = eligible.len(),
            "Product registry built"
        );

        Self {
            by_exchange,
            eligible,
        }
    }

    /// Build registry deriving the eligible set from the products themselves
    pub fn with_derived_eligibility(products: Vec<Product>) -> Self {
        let eligible = derive_eligible_bases(&products);
        Self::new(products, eligible)
    }

    /// Look up a product by the exchange's native pair spelling
    #[inline]
    pub fn lookup(&self, exchange: Exchange, native_pair: &str) -> Option<&Product> {
        self.by_exchange.get(&exchange)?.get(native_pair)
    }

    /// Native pair spellings tracked on an exchange, sorted for stable subscribe order
    pub fn native_pairs(&self, exchange: Exchange) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .by_exchange
            .get(&exchange)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        pairs.sort();
        pairs
    }

    /// Canonical bases quoted on at least two markets
    #[inline]
    pub fn eligible_bases(&self) -> &HashSet<String> {
        &self.eligible
    }

    #[inline]
    pub fn is_eligible(&self, base: &str) -> bool {
        self.eligible.contains(base)
    }

    /// Number of products across all exchanges
    pub fn len(&self) -> usize {
        self.by_exchange.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bases listed on two or more distinct exchanges
pub fn derive_eligible_bases(products: &[Product]) -> HashSet<String> {
    let mut venues: HashMap<&str, HashSet<Exchange>> = HashMap::new();
    for product in products {
        venues
            .entry(product.base.as_str())
            .or_default()
            .insert(product.exchange);
    }
    venues
        .into_iter()
        .filter(|(_, exchanges)| exchanges.len() >= 2)
        .map(|(base, _)| base.to_string())
        .collect()
}
