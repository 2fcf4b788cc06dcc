//! Product Catalog (Cold Path)
//!
//! Loads the product list and arbitrage-eligible bases from storage.
//! Called once at startup, before any exchange connection opens.

use crate::core::product::{derive_eligible_bases, Product, ProductRegistry};
use crate::exchanges::Exchange;
use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Persistent product storage
pub trait ProductStorage: Send + Sync {
    /// Every known product across all exchanges
    fn fetch_all_products(&self) -> impl Future<Output = Result<Vec<Product>, CatalogError>> + Send;

    /// Canonical bases quoted on at least two markets
    fn fetch_arbitrage_eligible_bases(
        &self,
    ) -> impl Future<Output = Result<HashSet<String>, CatalogError>> + Send;
}

impl ProductRegistry {
    /// Build the registry from storage
    pub async fn load<S: ProductStorage>(storage: &S) -> Result<Self, CatalogError> {
        let products = storage.fetch_all_products().await?;
        if products.is_empty() {
            return Err(CatalogError::Empty);
        }
        let eligible = storage.fetch_arbitrage_eligible_bases().await?;
        Ok(Self::new(products, eligible))
    }
}

// === JSON file catalog ===

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    products: Vec<Product>,
    #[serde(default)]
    eligible_bases: Option<HashSet<String>>,
}

/// Products stored in a local JSON file
///
/// Shape: `{"products": [...], "eligible_bases": ["BTC", ...]}`. When
/// `eligible_bases` is missing it is derived from the product list. The
/// file is read once; later calls reuse the parsed contents.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
    file: OnceCell<CatalogFile>,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn file(&self) -> Result<&CatalogFile, CatalogError> {
        self.file
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let contents = tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
                    .await
                    .map_err(|e| CatalogError::Io(std::io::Error::other(e)))??;
                let file: CatalogFile = serde_json::from_str(&contents)?;
                tracing::info!(
                    path = %self.path.display(),
                    products = file.products.len(),
                    "Loaded product catalog"
                );
                Ok::<_, CatalogError>(file)
            })
            .await
    }
}

impl ProductStorage for JsonFileCatalog {
    async fn fetch_all_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.file().await?.products.clone())
    }

    async fn fetch_arbitrage_eligible_bases(&self) -> Result<HashSet<String>, CatalogError> {
        let file = self.file().await?;
        Ok(match &file.eligible_bases {
            Some(bases) => bases.clone(),
            None => derive_eligible_bases(&file.products),
        })
    }
}

// === CryptoCompare catalog ===

/// Pair mapping fetched from CryptoCompare
///
/// API: GET https://min-api.cryptocompare.com/data/pair/mapping/exchange?e=Kraken
///
/// Each exchange's mapping is fetched once per catalog.
pub struct CryptoCompareCatalog {
    client: reqwest::Client,
    base_url: String,
    exchanges: Vec<Exchange>,
    products: OnceCell<Vec<Product>>,
}

impl CryptoCompareCatalog {
    pub fn new(base_url: impl Into<String>, exchanges: Vec<Exchange>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("quote-broker/0.1")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
            exchanges,
            products: OnceCell::new(),
        }
    }

    async fn products(&self) -> Result<&Vec<Product>, CatalogError> {
        self.products
            .get_or_try_init(|| async {
                let mut products = Vec::new();
                for exchange in &self.exchanges {
                    products.extend(self.fetch_exchange(*exchange).await?);
                }
                Ok::<_, CatalogError>(products)
            })
            .await
    }

    async fn fetch_exchange(&self, exchange: Exchange) -> Result<Vec<Product>, CatalogError> {
        tracing::info!(exchange = %exchange, "Fetching pair mapping from {}", self.base_url);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("e", exchange.display_name())])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::Http(response.status().as_u16()));
        }

        let mapping: MappingResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        let products: Vec<Product> = mapping
            .data
            .into_iter()
            .map(|entry| entry.into_product(exchange))
            .collect();

        tracing::info!(exchange = %exchange, products = products.len(), "Received pair mapping");
        Ok(products)
    }
}

impl ProductStorage for CryptoCompareCatalog {
    async fn fetch_all_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.products().await?.clone())
    }

    async fn fetch_arbitrage_eligible_bases(&self) -> Result<HashSet<String>, CatalogError> {
        Ok(derive_eligible_bases(self.products().await?))
    }
}

#[derive(Debug, Deserialize)]
struct MappingResponse {
    #[serde(rename = "Data", default)]
    data: Vec<MappingEntry>,
}

// {"exchange":"Kraken","exchange_fsym":"XXBT","exchange_tsym":"ZUSD","fsym":"BTC","tsym":"USD"}
#[derive(Debug, Deserialize)]
struct MappingEntry {
    exchange_fsym: String,
    exchange_tsym: String,
    fsym: String,
    tsym: String,
}

impl MappingEntry {
    fn into_product(self, exchange: Exchange) -> Product {
        let (ex_base, ex_quote) = match exchange {
            Exchange::Kraken => (
                strip_kraken_prefix(&self.exchange_fsym, &['X']),
                strip_kraken_prefix(&self.exchange_tsym, &['X', 'Z']),
            ),
            _ => (self.exchange_fsym.as_str(), self.exchange_tsym.as_str()),
        };
        Product::new(exchange, ex_base, ex_quote, &self.fsym, &self.tsym)
    }
}

/// Kraken's legacy asset codes carry an X (crypto) or Z (fiat) prefix on 4-letter codes
fn strip_kraken_prefix<'a>(code: &'a str, prefixes: &[char]) -> &'a str {
    if code.len() == 4 {
        if let Some(first) = code.chars().next() {
            if prefixes.contains(&first) {
                return &code[1..];
            }
        }
    }
    code
}

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No products found")]
    Empty,
}
