//! Coinbase level2 wire types

use serde::{Deserialize, Serialize};

/// Subscribe request for the level2 channel
///
/// ```json
/// {"type":"subscribe","product_ids":["ETH-USD"],"channels":[{"name":"level2","product_ids":["ETH-USD"]}]}
/// ```
#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub product_ids: &'a [String],
    pub channels: [Channel<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct Channel<'a> {
    pub name: &'static str,
    pub product_ids: &'a [String],
}

/// Inbound feed message, tagged by `type`
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    #[serde(rename = "snapshot")]
    Snapshot(Snapshot),

    #[serde(rename = "l2update")]
    Update(LevelTwoUpdate),

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        reason: String,
    },

    /// subscriptions, heartbeat and anything else
    #[serde(other)]
    Other,
}

/// Initial book on the level2 channel
#[derive(Debug, Deserialize)]
pub struct Snapshot {
    pub product_id: String,
    /// `[price, size]`
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

/// Incremental level2 update
#[derive(Debug, Deserialize)]
pub struct LevelTwoUpdate {
    pub product_id: String,
    /// `[side, price, size]`, side is `buy` or `sell`
    pub changes: Vec<(String, String, String)>,
}
