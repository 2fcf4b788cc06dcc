//! Core domain types
//!
//! This module contains the identity and value types shared by every component:
//! - Product / ProductRegistry: exchange pair spelling -> canonical pair
//! - Quote: normalized best bid/ask tick
//! - RateTables: fiat and observed crypto conversion to USD
//! - Catalog: product storage adapters (startup only)

pub mod catalog;
pub mod currency;
pub mod product;
pub mod quote;

pub use catalog::{CatalogError, CryptoCompareCatalog, JsonFileCatalog, ProductStorage};
pub use currency::RateTables;
pub use product::{Product, ProductRegistry};
pub use quote::Quote;
