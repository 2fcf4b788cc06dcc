//! Test fixtures: a MOCK-USD product listed on every exchange and an
//! in-memory transport for driving read loops without a network.

use crate::core::{Product, ProductRegistry, Quote};
use crate::exchanges::Exchange;
use crate::hot_path::Broker;
use crate::infrastructure::config::CurrencyConfig;
use crate::ws::{Connector, Transport, WebSocketError};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// MOCK-USD on all four exchanges, MOCK eligible
pub fn mock_registry() -> ProductRegistry {
    let products = Exchange::ALL
        .iter()
        .map(|&ex| Product::new(ex, "MOCK", "USD", "MOCK", "USD"))
        .collect();
    ProductRegistry::new(products, HashSet::from(["MOCK".to_string()]))
}

/// MOCK-USD tick
pub fn mock_quote(exchange: Exchange, bid: &str, ask: &str) -> Quote {
    quote_for(exchange, "MOCK", "USD", bid, ask)
}

pub fn quote_for(exchange: Exchange, base: &str, quote: &str, bid: &str, ask: &str) -> Quote {
    let product = Product::new(exchange, base, quote, base, quote);
    Quote::from_product(&product, bid, ask)
}

/// Broker with MOCK, BTC and ETH eligible and the default currency tables
pub fn mock_broker() -> Broker {
    let eligible = ["MOCK", "BTC", "ETH"].iter().map(|s| s.to_string()).collect();
    Broker::new(&CurrencyConfig::default(), eligible)
}

type Inbound = Result<Bytes, WebSocketError>;

/// Transport fed by a `MockPeer`
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// Remote end of a `MockTransport`
pub struct MockPeer {
    tx: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

pub fn mock_transport() -> (MockTransport, MockPeer) {
    let (tx, inbound) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockTransport {
            inbound,
            sent: sent.clone(),
            closed: closed.clone(),
        },
        MockPeer {
            tx: Mutex::new(Some(tx)),
            sent,
            closed,
        },
    )
}

impl MockPeer {
    pub fn push(&self, text: &str) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(Ok(Bytes::copy_from_slice(text.as_bytes())));
        }
    }

    pub fn fail(&self, message: &str) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(Err(WebSocketError::ReceiveFailed(message.to_string())));
        }
    }

    /// Close from the remote side
    pub fn disconnect(&self) {
        self.tx.lock().take();
    }

    /// Frames the local side sent
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for MockTransport {
    async fn recv(&mut self) -> Result<Option<Bytes>, WebSocketError> {
        match self.inbound.recv().await {
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), WebSocketError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WebSocketError::NotConnected);
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), WebSocketError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Connector handing out scripted transports per URL
///
/// URLs with nothing scripted refuse the connection.
#[derive(Default)]
pub struct MockConnector {
    scripts: Mutex<HashMap<String, VecDeque<Option<MockTransport>>>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, url: &str, transport: MockTransport) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(Some(transport));
    }

    pub fn refuse(&self, url: &str) {
        self.scripts.lock().entry(url.to_string()).or_default().push_back(None);
    }

    pub fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().get(url).copied().unwrap_or(0)
    }
}

impl Connector for MockConnector {
    type Conn = MockTransport;

    async fn connect(&self, url: &str) -> Result<MockTransport, WebSocketError> {
        *self.attempts.lock().entry(url.to_string()).or_default() += 1;
        let next = self.scripts.lock().get_mut(url).and_then(VecDeque::pop_front);
        next.flatten()
            .ok_or_else(|| WebSocketError::ConnectionFailed(format!("{} refused", url)))
    }
}
