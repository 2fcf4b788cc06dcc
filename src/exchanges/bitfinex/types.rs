//! Bitfinex v2 wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ticker subscription for one pair
///
/// ```json
/// {"event":"subscribe","channel":"ticker","symbol":"tETHUSD"}
/// ```
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub event: &'static str,
    pub channel: &'static str,
    pub symbol: String,
}

/// Inbound message: an event object or a channel array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FeedMessage {
    Event(EventMessage),
    Channel(ChannelMessage),
}

/// `{"event":"subscribed","channel":"ticker","chanId":32034,"symbol":"tBTCUSD","pair":"BTCUSD"}`
#[derive(Debug, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(rename = "chanId", default)]
    pub chan_id: Option<u64>,
    #[serde(default)]
    pub pair: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

/// `[chanId, payload]`: payload is `"hb"` or the ticker array
///
/// `[31662,[226.96,242.36,226.97,706.67,19.28,0.0928,226.94,290306.02,229.48,199.9]]`
#[derive(Debug, Deserialize)]
pub struct ChannelMessage(pub u64, pub Value);

impl ChannelMessage {
    #[inline]
    pub fn chan_id(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.1.as_str() == Some("hb")
    }

    /// BID and ASK fields of a ticker payload, as the exchange printed them
    pub fn best(&self) -> Option<(String, String)> {
        let fields = self.1.as_array()?;
        let bid = fields.first()?.as_number()?;
        let ask = fields.get(2)?.as_number()?;
        Some((bid.to_string(), ask.to_string()))
    }
}
