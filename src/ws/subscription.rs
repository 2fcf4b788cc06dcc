//! Subscription handshake for channel-id feeds
//!
//! Some exchanges answer each subscribe request with an opaque numeric channel
//! id and reference only that id afterwards. The handshake collects one
//! acknowledgment per requested pair before the feed starts reading ticks.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Subscribe requests sent, waiting for acknowledgments
    Subscribing,
    /// All pairs acknowledged, ticks flow
    Listening,
}

/// Result of feeding one acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Still waiting for `remaining` pairs
    Pending { remaining: usize },
    /// This acknowledgment completed the handshake
    Completed,
    /// Already listening; acknowledgment recorded but changes nothing
    Ignored,
}

/// Channel id -> pair correlation for one connection
#[derive(Debug, Clone)]
pub struct SubscriptionHandshake {
    state: HandshakeState,
    requested: HashSet<String>,
    acknowledged: HashSet<String>,
    channels: HashMap<u64, String>,
}

impl SubscriptionHandshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Listening,
            requested: HashSet::new(),
            acknowledged: HashSet::new(),
            channels: HashMap::new(),
        }
    }

    /// Enter SUBSCRIBING for `pairs`, dropping previous bindings
    ///
    /// An empty pair list has nothing to wait for and listens immediately.
    pub fn begin<I, S>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested = pairs.into_iter().map(Into::into).collect();
        self.acknowledged.clear();
        self.channels.clear();
        self.state = if self.requested.is_empty() {
            HandshakeState::Listening
        } else {
            HandshakeState::Subscribing
        };
    }

    /// Bind `chan_id` to `pair`
    ///
    /// Each distinct requested pair counts once; re-acknowledging a pair
    /// rebinds its channel id without advancing the count.
    pub fn acknowledge(&mut self, chan_id: u64, pair: &str) -> Result<AckOutcome, HandshakeError> {
        if !self.requested.contains(pair) {
            return Err(HandshakeError::UnknownPair(pair.to_string()));
        }

        self.channels.retain(|_, bound| bound != pair);
        self.channels.insert(chan_id, pair.to_string());

        if self.state == HandshakeState::Listening {
            return Ok(AckOutcome::Ignored);
        }

        self.acknowledged.insert(pair.to_string());
        let remaining = self.requested.len() - self.acknowledged.len();
        if remaining == 0 {
            self.state = HandshakeState::Listening;
            Ok(AckOutcome::Completed)
        } else {
            Ok(AckOutcome::Pending { remaining })
        }
    }

    /// Pair bound to `chan_id`
    #[inline]
    pub fn resolve(&self, chan_id: u64) -> Option<&str> {
        self.channels.get(&chan_id).map(String::as_str)
    }

    #[inline]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    #[inline]
    pub fn is_listening(&self) -> bool {
        self.state == HandshakeState::Listening
    }

    /// Pairs still waiting for an acknowledgment
    pub fn pending(&self) -> usize {
        self.requested.len() - self.acknowledged.len()
    }
}

impl Default for SubscriptionHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Handshake failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("acknowledgment for unrequested pair {0}")]
    UnknownPair(String),

    #[error("subscription rejected: {0}")]
    Rejected(String),

    #[error("handshake not completed within {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completes_after_all_pairs() {
        let mut hs = SubscriptionHandshake::new();
        hs.begin(["BTCUSD", "ETHUSD", "MOCKUSD"]);
        assert_eq!(hs.state(), HandshakeState::Subscribing);

        assert_eq!(
            hs.acknowledge(12, "ETHUSD").unwrap(),
            AckOutcome::Pending { remaining: 2 }
        );
        assert_eq!(
            hs.acknowledge(7, "MOCKUSD").unwrap(),
            AckOutcome::Pending { remaining: 1 }
        );
        assert!(!hs.is_listening());
        assert_eq!(hs.acknowledge(3, "BTCUSD").unwrap(), AckOutcome::Completed);
        assert!(hs.is_listening());

        assert_eq!(hs.resolve(3), Some("BTCUSD"));
        assert_eq!(hs.resolve(12), Some("ETHUSD"));
        assert_eq!(hs.resolve(7), Some("MOCKUSD"));
        assert_eq!(hs.resolve(99), None);
    }

    #[test]
    fn test_duplicate_ack_does_not_complete_early() {
        let mut hs = SubscriptionHandshake::new();
        hs.begin(["BTCUSD", "ETHUSD"]);

        hs.acknowledge(1, "BTCUSD").unwrap();
        assert_eq!(
            hs.acknowledge(2, "BTCUSD").unwrap(),
            AckOutcome::Pending { remaining: 1 }
        );
        // Rebound to the newest id
        assert_eq!(hs.resolve(1), None);
        assert_eq!(hs.resolve(2), Some("BTCUSD"));
        assert_eq!(hs.pending(), 1);
    }

    #[test]
    fn test_transitions_exactly_once() {
        let mut hs = SubscriptionHandshake::new();
        hs.begin(["BTCUSD"]);
        assert_eq!(hs.acknowledge(1, "BTCUSD").unwrap(), AckOutcome::Completed);
        assert_eq!(hs.acknowledge(5, "BTCUSD").unwrap(), AckOutcome::Ignored);
        assert_eq!(hs.resolve(5), Some("BTCUSD"));
    }

    #[test]
    fn test_unknown_pair_rejected() {
        let mut hs = SubscriptionHandshake::new();
        hs.begin(["BTCUSD"]);
        assert_eq!(
            hs.acknowledge(1, "DOGEUSD"),
            Err(HandshakeError::UnknownPair("DOGEUSD".to_string()))
        );
        assert!(!hs.is_listening());
    }

    #[test]
    fn test_empty_request_listens_immediately() {
        let mut hs = SubscriptionHandshake::new();
        hs.begin(Vec::<String>::new());
        assert!(hs.is_listening());
    }

    #[test]
    fn test_begin_resets_bindings() {
        let mut hs = SubscriptionHandshake::new();
        hs.begin(["BTCUSD"]);
        hs.acknowledge(1, "BTCUSD").unwrap();
        hs.begin(["BTCUSD"]);
        assert!(!hs.is_listening());
        assert_eq!(hs.resolve(1), None);
    }
}
