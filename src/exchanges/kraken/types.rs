//! Kraken wire types

use serde::{Deserialize, Serialize};

/// Subscribe request
///
/// ```json
/// {"event":"subscribe","pair":["XBT/USD","XBT/EUR"],"subscription":{"name":"spread"}}
/// ```
#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    pub event: &'static str,
    pub pair: &'a [String],
    pub subscription: Subscription,
}

#[derive(Debug, Serialize)]
pub struct Subscription {
    pub name: &'static str,
}

/// Inbound message: an event object or a channel array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FeedMessage {
    Event(EventMessage),
    Spread(SpreadTick),
}

/// heartbeat, systemStatus, subscriptionStatus
#[derive(Debug, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub pair: Option<String>,
}

/// `[channelID, [bid, ask, timestamp, bidVolume, askVolume], "spread", "XBT/USD"]`
#[derive(Debug, Deserialize)]
pub struct SpreadTick(pub u64, pub Vec<String>, pub String, pub String);

impl SpreadTick {
    #[inline]
    pub fn channel_name(&self) -> &str {
        &self.2
    }

    #[inline]
    pub fn pair(&self) -> &str {
        &self.3
    }

    /// Best bid and ask text
    pub fn best(&self) -> Option<(&str, &str)> {
        match self.1.as_slice() {
            [bid, ask, ..] => Some((bid.as_str(), ask.as_str())),
            _ => None,
        }
    }
}
