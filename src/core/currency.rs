//! Price triangulation to USD
//!
//! Static fiat table from configuration plus crypto rates observed from live
//! quotes. Owned by the aggregation engine; not shared.

use crate::core::Quote;
use crate::CurrencyConfig;
use std::collections::{HashMap, HashSet};

/// Fiat and observed crypto conversion rates
#[derive(Debug, Clone)]
pub struct RateTables {
    fiat: HashMap<String, f64>,
    bridges: HashSet<String>,
    stablecoins: HashSet<String>,
    rate_stablecoin: String,
    observed: HashMap<String, f64>,
}

impl RateTables {
    pub fn new(config: &CurrencyConfig) -> Self {
        Self {
            fiat: config
                .fiat_usd_rates
                .iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), *v))
                .collect(),
            bridges: config
                .bridge_assets
                .iter()
                .map(|s| s.to_ascii_uppercase())
                .collect(),
            stablecoins: config
                .stablecoins
                .iter()
                .map(|s| s.to_ascii_uppercase())
                .collect(),
            rate_stablecoin: config.rate_stablecoin.to_ascii_uppercase(),
            observed: HashMap::new(),
        }
    }

    /// Convert a price quoted in `quote_ccy` to USD
    ///
    /// Returns 0.0 when no conversion path is known yet.
    pub fn triangulate(&self, price: f64, quote_ccy: &str) -> f64 {
        if let Some(rate) = self.fiat.get(quote_ccy) {
            return price * rate;
        }
        if self.bridges.contains(quote_ccy) {
            return match self.observed.get(quote_ccy) {
                Some(rate) => price * rate,
                None => 0.0,
            };
        }
        if self.stablecoins.contains(quote_ccy) {
            return price;
        }
        0.0
    }

    /// Refresh the observed rate if `quote` is a conversion pair
    ///
    /// A bridge asset quoted in fiat or in the rate stablecoin records its ask
    /// (converted through the fiat table) as the latest USD rate.
    pub fn observe(&mut self, quote: &Quote, ask: f64) {
        if !self.bridges.contains(quote.base.as_str()) {
            return;
        }

        let multiplier = if let Some(rate) = self.fiat.get(quote.quote.as_str()) {
            *rate
        } else if quote.quote == self.rate_stablecoin {
            1.0
        } else {
            return;
        };

        let rate = ask * multiplier;
        if rate.is_finite() && rate > 0.0 {
            self.observed.insert(quote.base.clone(), rate);
        }
    }

    /// Latest observed USD rate for a bridge asset
    #[inline]
    pub fn observed_rate(&self, asset: &str) -> Option<f64> {
        self.observed.get(asset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Product;
    use crate::exchanges::Exchange;

    fn quote(base: &str, quote_ccy: &str, ask: &str) -> Quote {
        let product = Product::new(Exchange::Coinbase, base, quote_ccy, base, quote_ccy);
        Quote::from_product(&product, ask, ask)
    }

    #[test]
    fn test_fiat_multiplies_static_rate() {
        let rates = RateTables::new(&CurrencyConfig::default());
        assert_eq!(rates.triangulate(100.0, "USD"), 100.0);
        assert!((rates.triangulate(100.0, "EUR") - 109.0).abs() < 1e-9);
    }

    #[test]
    fn test_stablecoin_is_unchanged() {
        let rates = RateTables::new(&CurrencyConfig::default());
        assert_eq!(rates.triangulate(8114.8, "USDT"), 8114.8);
        assert_eq!(rates.triangulate(8114.8, "USDC"), 8114.8);
    }

    #[test]
    fn test_unknown_currency_is_zero() {
        let rates = RateTables::new(&CurrencyConfig::default());
        assert_eq!(rates.triangulate(42.0, "XYZ"), 0.0);
    }

    #[test]
    fn test_bridge_needs_observed_rate() {
        let mut rates = RateTables::new(&CurrencyConfig::default());
        assert_eq!(rates.triangulate(0.03, "BTC"), 0.0);

        let btc_usd = quote("BTC", "USD", "8000");
        rates.observe(&btc_usd, 8000.0);
        assert_eq!(rates.observed_rate("BTC"), Some(8000.0));
        assert!((rates.triangulate(0.03, "BTC") - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_observe_through_fiat_and_stablecoin() {
        let mut rates = RateTables::new(&CurrencyConfig::default());

        rates.observe(&quote("ETH", "EUR", "200"), 200.0);
        assert!((rates.observed_rate("ETH").unwrap() - 218.0).abs() < 1e-9);

        rates.observe(&quote("ETH", "USDT", "210"), 210.0);
        assert_eq!(rates.observed_rate("ETH"), Some(210.0));

        // Other stablecoins are valued 1:1 but do not refresh rates
        rates.observe(&quote("ETH", "USDC", "300"), 300.0);
        assert_eq!(rates.observed_rate("ETH"), Some(210.0));
    }

    #[test]
    fn test_observe_ignores_non_bridge_and_zero() {
        let mut rates = RateTables::new(&CurrencyConfig::default());
        rates.observe(&quote("XRP", "USD", "0.3"), 0.3);
        assert_eq!(rates.observed_rate("XRP"), None);

        rates.observe(&quote("BTC", "USD", "0"), 0.0);
        assert_eq!(rates.observed_rate("BTC"), None);
    }

    #[test]
    fn test_synthetic_currency_set() {
        let config = CurrencyConfig {
            fiat_usd_rates: [("ZZZ".to_string(), 2.0)].into_iter().collect(),
            bridge_assets: vec!["MOCK".to_string()],
            stablecoins: vec!["PEG".to_string()],
            rate_stablecoin: "PEG".to_string(),
        };
        let mut rates = RateTables::new(&config);

        assert_eq!(rates.triangulate(5.0, "ZZZ"), 10.0);
        assert_eq!(rates.triangulate(5.0, "USD"), 0.0);
        assert_eq!(rates.triangulate(5.0, "PEG"), 5.0);

        rates.observe(&quote("MOCK", "PEG", "3"), 3.0);
        assert_eq!(rates.triangulate(2.0, "MOCK"), 6.0);
    }
}
