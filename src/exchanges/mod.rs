//! Exchange-specific implementations

pub mod binance;
pub mod bitfinex;
pub mod coinbase;
pub mod kraken;
pub mod traits;

pub use binance::BinanceAdapter;
pub use bitfinex::BitfinexAdapter;
pub use coinbase::CoinbaseAdapter;
pub use kraken::KrakenAdapter;
pub use traits::{DecodeError, ErrorKind, ExchangeClient, ExchangeError, QuoteAdapter};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Exchange {
    Binance,
    Coinbase,
    Kraken,
    Bitfinex,
}

impl Exchange {
    pub const ALL: [Exchange; 4] = [
        Exchange::Binance,
        Exchange::Coinbase,
        Exchange::Kraken,
        Exchange::Bitfinex,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Coinbase => "coinbase",
            Exchange::Kraken => "kraken",
            Exchange::Bitfinex => "bitfinex",
        }
    }

    /// Capitalized name used by third-party catalogs
    pub fn display_name(&self) -> &'static str {
        match self {
            Exchange::Binance => "Binance",
            Exchange::Coinbase => "Coinbase",
            Exchange::Kraken => "Kraken",
            Exchange::Bitfinex => "Bitfinex",
        }
    }

    /// Dense index for per-exchange arrays
    #[inline(always)]
    pub fn index(&self) -> usize {
        match self {
            Exchange::Binance => 0,
            Exchange::Coinbase => 1,
            Exchange::Kraken => 2,
            Exchange::Bitfinex => 3,
        }
    }

    /// Exchange feed spelling of a `BASE-QUOTE` pair
    ///
    /// Kraken uses `BASE/QUOTE`, Binance and Bitfinex concatenate, Coinbase
    /// keeps the dash. Every feed reports symbols in upper case.
    pub fn native_pair(&self, ex_pair: &str) -> String {
        let upper = ex_pair.to_ascii_uppercase();
        match self {
            Exchange::Kraken => upper.replacen('-', "/", 1),
            Exchange::Binance | Exchange::Bitfinex => upper.replacen('-', "", 1),
            Exchange::Coinbase => upper,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown exchange name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown exchange: {0}")]
pub struct UnknownExchange(pub String);

impl FromStr for Exchange {
    type Err = UnknownExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Exchange::ALL
            .into_iter()
            .find(|ex| ex.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownExchange(s.to_string()))
    }
}

impl TryFrom<String> for Exchange {
    type Error = UnknownExchange;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
