//! Configuration management for the quote broker
//!
//! Loads configuration from config.toml at startup.
//! Exchange names, currency tables and queue sizes all live here so nothing
//! downstream depends on process-wide constants.

use crate::exchanges::Exchange;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Broker Configuration
///
/// Loaded from config.toml at startup. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Aggregation and arbitrage settings
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Currency conversion tables
    #[serde(default)]
    pub currencies: CurrencyConfig,

    /// Connection retry policy for flaky handshakes
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Per-exchange endpoints
    #[serde(default)]
    pub exchanges: ExchangesConfig,

    /// Product catalog source
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// API server settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Aggregation engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Minimum spread in percent for an ArbMarket to be emitted
    #[serde(default = "default_min_spread")]
    pub min_spread_pct: f64,

    /// Capacity of the shared quote queue
    #[serde(default = "default_quote_queue")]
    pub quote_queue_capacity: usize,

    /// Capacity of the shared error queue
    #[serde(default = "default_error_queue")]
    pub error_queue_capacity: usize,

    /// Capacity of the quote/arb broadcast streams
    #[serde(default = "default_broadcast")]
    pub broadcast_capacity: usize,

    /// Levels held per side by the order book reconciler
    #[serde(default = "default_book_depth")]
    pub book_depth: usize,

    /// Snapshot levels seeded into each side
    #[serde(default = "default_snapshot_levels")]
    pub snapshot_levels: usize,

    /// Seconds to wait for a subscription handshake to complete
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Seconds to wait for read loops to finish on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

/// Currency tables passed into the aggregation engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CurrencyConfig {
    /// Static fiat -> USD multipliers
    #[serde(default = "default_fiat_rates")]
    pub fiat_usd_rates: HashMap<String, f64>,

    /// Crypto assets whose observed USD rate converts other markets
    #[serde(default = "default_bridge_assets")]
    pub bridge_assets: Vec<String>,

    /// USD-pegged stablecoins, valued 1:1
    #[serde(default = "default_stablecoins")]
    pub stablecoins: Vec<String>,

    /// Stablecoin whose quotes also refresh bridge rates
    #[serde(default = "default_rate_stablecoin")]
    pub rate_stablecoin: String,
}

/// Backoff policy for connection retries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Give up after this many failed attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Exchange endpoints, one table per venue
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangesConfig {
    #[serde(default = "default_binance")]
    pub binance: ExchangeConfig,
    #[serde(default = "default_coinbase")]
    pub coinbase: ExchangeConfig,
    #[serde(default = "default_kraken")]
    pub kraken: ExchangeConfig,
    #[serde(default = "default_bitfinex")]
    pub bitfinex: ExchangeConfig,
}

/// Single exchange endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
}

/// Product catalog source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// JSON file with products and optional eligible bases
    #[serde(default = "default_products_path")]
    pub products_path: PathBuf,

    /// Fetch the mapping from CryptoCompare instead of the file
    #[serde(default)]
    pub remote: bool,

    #[serde(default = "default_catalog_url")]
    pub remote_url: String,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,

    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Log output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,

    /// EnvFilter directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON on the console as well as in files
    #[serde(default)]
    pub json: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            min_spread_pct: default_min_spread(),
            quote_queue_capacity: default_quote_queue(),
            error_queue_capacity: default_error_queue(),
            broadcast_capacity: default_broadcast(),
            book_depth: default_book_depth(),
            snapshot_levels: default_snapshot_levels(),
            handshake_timeout_secs: default_handshake_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            fiat_usd_rates: default_fiat_rates(),
            bridge_assets: default_bridge_assets(),
            stablecoins: default_stablecoins(),
            rate_stablecoin: default_rate_stablecoin(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ExchangesConfig {
    fn default() -> Self {
        Self {
            binance: default_binance(),
            coinbase: default_coinbase(),
            kraken: default_kraken(),
            bitfinex: default_bitfinex(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            products_path: default_products_path(),
            remote: false,
            remote_url: default_catalog_url(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_min_spread() -> f64 {
    0.01
}

fn default_quote_queue() -> usize {
    4096
}

fn default_error_queue() -> usize {
    256
}

fn default_broadcast() -> usize {
    1024
}

fn default_book_depth() -> usize {
    40
}

fn default_snapshot_levels() -> usize {
    20
}

fn default_handshake_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_fiat_rates() -> HashMap<String, f64> {
    [
        ("USD", 1.0),
        ("EUR", 1.09),
        ("GBP", 1.27),
        ("CAD", 0.74),
        ("JPY", 0.0067),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_bridge_assets() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string()]
}

fn default_stablecoins() -> Vec<String> {
    ["USDT", "USDC", "TUSD", "PAX", "DAI"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_rate_stablecoin() -> String {
    "USDT".to_string()
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_binance() -> ExchangeConfig {
    ExchangeConfig {
        enabled: true,
        url: "wss://stream.binance.com:9443/ws/!ticker@arr".to_string(),
    }
}

fn default_coinbase() -> ExchangeConfig {
    ExchangeConfig {
        enabled: true,
        url: "wss://ws-feed.exchange.coinbase.com".to_string(),
    }
}

fn default_kraken() -> ExchangeConfig {
    ExchangeConfig {
        enabled: true,
        url: "wss://ws.kraken.com".to_string(),
    }
}

fn default_bitfinex() -> ExchangeConfig {
    ExchangeConfig {
        enabled: true,
        url: "wss://api-pub.bitfinex.com/ws/2".to_string(),
    }
}

fn default_products_path() -> PathBuf {
    PathBuf::from("products.json")
}

fn default_catalog_url() -> String {
    "https://min-api.cryptocompare.com/data/pair/mapping/exchange".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from config.toml file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed or fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        let config = match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::from_toml(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Config::default()
            }
            Err(e) => return Err(ConfigError::IoError(e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.broker.min_spread_pct.is_finite() || self.broker.min_spread_pct < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "broker.min_spread_pct must be a non-negative number, got {}",
                self.broker.min_spread_pct
            )));
        }

        let capacities = [
            ("broker.quote_queue_capacity", self.broker.quote_queue_capacity),
            ("broker.error_queue_capacity", self.broker.error_queue_capacity),
            ("broker.broadcast_capacity", self.broker.broadcast_capacity),
            ("broker.book_depth", self.broker.book_depth),
            ("broker.snapshot_levels", self.broker.snapshot_levels),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        for (currency, rate) in &self.currencies.fiat_usd_rates {
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "currencies.fiat_usd_rates.{} must be positive",
                    currency
                )));
            }
        }

        for exchange in Exchange::ALL {
            let endpoint = self.exchanges.get(exchange);
            let parsed = url::Url::parse(&endpoint.url).map_err(|e| {
                ConfigError::Invalid(format!("exchanges.{}.url: {}", exchange, e))
            })?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ConfigError::Invalid(format!(
                    "exchanges.{}.url must use ws:// or wss://",
                    exchange
                )));
            }
        }

        if self.catalog.remote {
            url::Url::parse(&self.catalog.remote_url)
                .map_err(|e| ConfigError::Invalid(format!("catalog.remote_url: {}", e)))?;
        }

        Ok(())
    }

    /// Socket address for the API server
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl BrokerConfig {
    #[inline]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    #[inline]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl ExchangesConfig {
    /// Endpoint for one exchange
    pub fn get(&self, exchange: Exchange) -> &ExchangeConfig {
        match exchange {
            Exchange::Binance => &self.binance,
            Exchange::Coinbase => &self.coinbase,
            Exchange::Kraken => &self.kraken,
            Exchange::Bitfinex => &self.bitfinex,
        }
    }

    pub fn get_mut(&mut self, exchange: Exchange) -> &mut ExchangeConfig {
        match exchange {
            Exchange::Binance => &mut self.binance,
            Exchange::Coinbase => &mut self.coinbase,
            Exchange::Kraken => &mut self.kraken,
            Exchange::Bitfinex => &mut self.bitfinex,
        }
    }

    /// Enabled exchanges in declaration order
    pub fn enabled(&self) -> Vec<Exchange> {
        Exchange::ALL
            .into_iter()
            .filter(|ex| self.get(*ex).enabled)
            .collect()
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
    /// Value out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) | ConfigError::Invalid(_) => None,
        }
    }
}

impl From<ConfigError> for crate::BrokerError {
    fn from(e: ConfigError) -> Self {
        crate::BrokerError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.broker.min_spread_pct, 0.01);
        assert_eq!(config.broker.book_depth, 40);
        assert_eq!(config.broker.snapshot_levels, 20);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.currencies.rate_stablecoin, "USDT");
        assert_eq!(config.currencies.fiat_usd_rates.get("USD"), Some(&1.0));
        assert_eq!(config.exchanges.enabled().len(), 4);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [broker]
            min_spread_pct = 0.5

            [exchanges.kraken]
            enabled = false
            url = "wss://ws.kraken.com"

            [currencies]
            stablecoins = ["USDX"]
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.min_spread_pct, 0.5);
        assert_eq!(config.broker.quote_queue_capacity, 4096);
        assert_eq!(config.currencies.stablecoins, vec!["USDX".to_string()]);
        assert_eq!(config.currencies.bridge_assets.len(), 2);
        assert!(!config.exchanges.get(Exchange::Kraken).enabled);
        assert_eq!(config.exchanges.enabled().len(), 3);
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = Config::from_toml("[broker\nmin_spread_pct = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.broker.min_spread_pct = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.broker.book_depth = 0;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.exchanges.coinbase.url = "https://ws-feed.exchange.coinbase.com".to_string();
        assert_err!(config.validate());

        let mut config = Config::default();
        config.exchanges.bitfinex.url = "not a url".to_string();
        assert_err!(config.validate());
    }
}
