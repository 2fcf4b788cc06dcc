//! Metrics collection for system monitoring
//!
//! Lock-free counters updated from the read loops and the engine actor,
//! exported as a snapshot by the API.

use crate::exchanges::Exchange;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

/// Counters for one exchange feed
#[derive(Default)]
struct FeedCounters {
    quotes: AtomicU64,
    decode_errors: AtomicU64,
    connected: AtomicBool,
    /// Unix millis of the last inbound frame
    last_message: AtomicU64,
}

/// System metrics collector
pub struct MetricsCollector {
    feeds: [FeedCounters; Exchange::ALL.len()],
    quotes_rejected: AtomicU64,
    arb_events: AtomicU64,
    subscribers: AtomicU64,
    start_time: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub exchange: Exchange,
    pub quotes: u64,
    pub decode_errors: u64,
    pub connected: bool,
    pub idle_ms: Option<u64>,
}

/// Metrics snapshot for API export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub feeds: Vec<FeedSnapshot>,
    pub total_quotes: u64,
    pub quotes_rejected: u64,
    pub arb_events: u64,
    pub subscribers: u64,
    pub quote_rate: f64, // quotes per second
    pub uptime_seconds: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            feeds: Default::default(),
            quotes_rejected: AtomicU64::new(0),
            arb_events: AtomicU64::new(0),
            subscribers: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    fn feed(&self, exchange: Exchange) -> &FeedCounters {
        &self.feeds[exchange.index()]
    }

    /// Record normalized quotes decoded from one frame
    #[inline]
    pub fn record_quotes(&self, exchange: Exchange, count: usize) {
        let feed = self.feed(exchange);
        feed.quotes.fetch_add(count as u64, Ordering::Relaxed);
        feed.last_message.store(unix_millis(), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self, exchange: Exchange) {
        self.feed(exchange).decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, exchange: Exchange, connected: bool) {
        self.feed(exchange).connected.store(connected, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_quote(&self) {
        self.quotes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_arb_event(&self) {
        self.arb_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_joined(&self) {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_left(&self) {
        // Saturating: never wrap below zero
        let _ = self
            .subscribers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Any exchange currently connected
    pub fn is_connected(&self) -> bool {
        self.feeds.iter().any(|f| f.connected.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = unix_millis();
        let feeds: Vec<FeedSnapshot> = Exchange::ALL
            .iter()
            .map(|&exchange| {
                let counters = self.feed(exchange);
                let last = counters.last_message.load(Ordering::Relaxed);
                FeedSnapshot {
                    exchange,
                    quotes: counters.quotes.load(Ordering::Relaxed),
                    decode_errors: counters.decode_errors.load(Ordering::Relaxed),
                    connected: counters.connected.load(Ordering::Relaxed),
                    idle_ms: (last != 0).then(|| now.saturating_sub(last)),
                }
            })
            .collect();

        let total_quotes: u64 = feeds.iter().map(|f| f.quotes).sum();
        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            total_quotes as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            feeds,
            total_quotes,
            quotes_rejected: self.quotes_rejected.load(Ordering::Relaxed),
            arb_events: self.arb_events.load(Ordering::Relaxed),
            subscribers: self.subscribers.load(Ordering::Relaxed),
            quote_rate: rate,
            uptime_seconds: uptime,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
