//! Core Application Engine
//!
//! Connects every enabled exchange, runs one read loop per connection and
//! owns the aggregation state in a single actor task. Read loops, the API
//! and anything else talk to the actor through queues only.

use crate::core::{ProductRegistry, Quote};
use crate::exchanges::{ExchangeClient, ExchangeError, QuoteAdapter};
use crate::hot_path::{ArbMarket, ArbitrageDetector, Broker};
use crate::infrastructure::config::Config;
use crate::infrastructure::metrics::MetricsCollector;
use crate::infrastructure::shutdown::{ShutdownLatch, ShutdownSignal};
use crate::ws::{run_feed, Connector, FeedContext, ReconnectPolicy, Transport};
use crate::{BrokerError, Result};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Requests answered by the actor
enum Query {
    Snapshot(oneshot::Sender<Vec<ArbMarket>>),
}

/// Cloneable access to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    quotes: broadcast::Sender<Quote>,
    arbs: broadcast::Sender<ArbMarket>,
    queries: mpsc::Sender<Query>,
    metrics: Arc<MetricsCollector>,
}

impl EngineHandle {
    /// Every normalized quote, as decoded
    pub fn subscribe_quotes(&self) -> broadcast::Receiver<Quote> {
        self.quotes.subscribe()
    }

    /// Arbitrage events above the configured spread
    pub fn subscribe_arbs(&self) -> broadcast::Receiver<ArbMarket> {
        self.arbs.subscribe()
    }

    /// All currently profitable markets, computed by the actor
    pub async fn snapshot(&self) -> Result<Vec<ArbMarket>> {
        let (tx, rx) = oneshot::channel();
        self.queries
            .send(Query::Snapshot(tx))
            .await
            .map_err(|_| BrokerError::EngineStopped)?;
        rx.await.map_err(|_| BrokerError::EngineStopped)
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }
}

/// Main engine managing feeds and aggregation
pub struct AppEngine<C: Connector> {
    config: Config,
    registry: Arc<ProductRegistry>,
    connector: C,
    shutdown: ShutdownSignal,
    handle: EngineHandle,
    queries: mpsc::Receiver<Query>,
}

impl<C: Connector> AppEngine<C> {
    pub fn new(
        config: Config,
        registry: Arc<ProductRegistry>,
        connector: C,
        metrics: Arc<MetricsCollector>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let capacity = config.broker.broadcast_capacity.max(1);
        let (quotes, _) = broadcast::channel(capacity);
        let (arbs, _) = broadcast::channel(capacity);
        let (query_tx, queries) = mpsc::channel(64);

        Self {
            config,
            registry,
            connector,
            shutdown,
            handle: EngineHandle {
                quotes,
                arbs,
                queries: query_tx,
                metrics,
            },
            queries,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Connect, start the feeds and run the actor until shutdown
    ///
    /// Exchanges connect concurrently. A connection failure on an exchange
    /// without retries aborts startup; shutdown during connect returns
    /// `Ok` after closing whatever was opened. Once running, a failing feed
    /// only ends itself.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            registry,
            connector,
            mut shutdown,
            handle,
            mut queries,
        } = self;

        let policy = ReconnectPolicy::from(&config.reconnect);
        let clients: Vec<ExchangeClient> = config
            .exchanges
            .enabled()
            .into_iter()
            .map(|exchange| {
                let url = config.exchanges.get(exchange).url.clone();
                ExchangeClient::new(exchange, url, registry.clone(), &config.broker)
            })
            .collect();

        // All exchanges connect at once; a flaky one backing off holds up no other
        let attempts = clients.iter().map(|client| {
            let connector = &connector;
            let mut signal = shutdown.clone();
            async move {
                let exchange = client.exchange();
                tracing::info!(target: "feed", %exchange, url = client.url(), "Connecting");
                policy
                    .connect(connector, client.url(), client.flaky_handshake(), &mut signal)
                    .await
            }
        });
        let results = join_all(attempts).await;

        let mut connected = Vec::new();
        let mut failure = None;
        let mut cancelled = false;
        for (client, result) in clients.into_iter().zip(results) {
            let exchange = client.exchange();
            match result {
                Ok(Some(transport)) => connected.push((client, transport)),
                Ok(None) => cancelled = true,
                Err(e) => {
                    tracing::error!(target: "feed", %exchange, error = %e, "Connection failed");
                    if failure.is_none() {
                        failure = Some(BrokerError::Connection {
                            exchange: exchange.to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        if failure.is_some() || cancelled {
            for (_, mut transport) in connected {
                let _ = transport.close().await;
            }
            return match failure {
                Some(err) => Err(err),
                None => {
                    tracing::info!(target: "broker", "Shutdown during connect");
                    Ok(())
                }
            };
        }

        let (quote_tx, mut quote_rx) = mpsc::channel(config.broker.quote_queue_capacity.max(1));
        let (error_tx, mut error_rx) = mpsc::channel(config.broker.error_queue_capacity.max(1));
        let latch = ShutdownLatch::new();
        let feeds = connected.len();

        for (client, transport) in connected {
            let ctx = FeedContext {
                quotes: quote_tx.clone(),
                errors: error_tx.clone(),
                shutdown: shutdown.clone(),
                latch: latch.guard(),
                handshake_timeout: config.broker.handshake_timeout(),
                metrics: handle.metrics.clone(),
            };
            tokio::spawn(run_feed(client, transport, ctx));
        }
        // Only the feeds hold senders now
        drop(quote_tx);
        drop(error_tx);

        tracing::info!(target: "broker", feeds, "Engine running");

        let mut actor = Actor {
            broker: Broker::new(&config.currencies, registry.eligible_bases().clone()),
            detector: ArbitrageDetector::new(config.broker.min_spread_pct),
            handle: &handle,
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "broker", "Shutdown requested");
                    break;
                }
                Some(query) = queries.recv() => actor.on_query(query),
                Some(err) = error_rx.recv() => actor.on_error(err),
                quote = quote_rx.recv() => match quote {
                    Some(quote) => actor.on_quote(quote),
                    None => {
                        tracing::warn!(target: "broker", "All feeds stopped");
                        break;
                    }
                },
            }
        }

        // Unblock feeds waiting on a full queue
        drop(quote_rx);
        drop(error_rx);

        if !latch.wait(feeds, config.broker.shutdown_timeout()).await {
            tracing::warn!(
                target: "broker",
                stopped = latch.arrived(),
                feeds,
                "Timed out waiting for feeds to close"
            );
        }
        tracing::info!(target: "broker", "Engine stopped");
        Ok(())
    }
}

/// Single writer of all aggregation state
struct Actor<'a> {
    broker: Broker,
    detector: ArbitrageDetector,
    handle: &'a EngineHandle,
}

impl Actor<'_> {
    fn on_quote(&mut self, quote: Quote) {
        match self.broker.insert(&quote) {
            Ok(Some(insertion)) => {
                let arb = self.broker.market(&insertion.base).and_then(|market| {
                    self.detector
                        .evaluate(&insertion.base, insertion.previous, market)
                });
                if let Some(arb) = arb {
                    self.handle.metrics.record_arb_event();
                    tracing::info!(
                        target: "broker",
                        base = %arb.base,
                        spread = arb.spread,
                        buy = %arb.low.exchange,
                        sell = %arb.high.exchange,
                        "Arbitrage"
                    );
                    // No receivers is not an error
                    let _ = self.handle.arbs.send(arb);
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.handle.metrics.record_rejected_quote();
                tracing::warn!(
                    target: "broker",
                    exchange = %quote.exchange,
                    pair = %quote.pair,
                    error = %e,
                    "Quote rejected"
                );
            }
        }
        let _ = self.handle.quotes.send(quote);
    }

    fn on_query(&self, query: Query) {
        match query {
            Query::Snapshot(reply) => {
                let _ = reply.send(self.broker.snapshot(&self.detector));
            }
        }
    }

    fn on_error(&self, err: ExchangeError) {
        tracing::warn!(
            target: "broker",
            exchange = %err.exchange,
            kind = %err.kind,
            "{}",
            err.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::Exchange;
    use crate::infrastructure::shutdown::Shutdown;
    use crate::test_utils::{mock_registry, mock_transport, MockConnector};
    use std::time::Duration;

    fn config(enabled: &[Exchange]) -> Config {
        let mut config = Config::default();
        for exchange in Exchange::ALL {
            let ex = config.exchanges.get_mut(exchange);
            ex.enabled = enabled.contains(&exchange);
            ex.url = format!("ws://{}", exchange.name());
        }
        config.broker.shutdown_timeout_secs = 1;
        config
    }

    fn engine(
        config: Config,
        connector: MockConnector,
        shutdown: &Shutdown,
    ) -> AppEngine<MockConnector> {
        AppEngine::new(
            config,
            Arc::new(mock_registry()),
            connector,
            Arc::new(MetricsCollector::new()),
            shutdown.signal(),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_arbitrage() {
        let (kraken, kraken_peer) = mock_transport();
        let (binance, binance_peer) = mock_transport();
        let connector = MockConnector::new();
        connector.accept("ws://kraken", kraken);
        connector.accept("ws://binance", binance);

        let shutdown = Shutdown::new();
        let engine = engine(config(&[Exchange::Binance, Exchange::Kraken]), connector, &shutdown);
        let handle = engine.handle();
        let mut arbs = handle.subscribe_arbs();
        let mut quotes = handle.subscribe_quotes();
        let task = tokio::spawn(engine.run());

        kraken_peer.push(r#"[0,["100","101","1.0","1","1"],"spread","MOCK/USD"]"#);
        assert_eq!(quotes.recv().await.unwrap().exchange, Exchange::Kraken);
        binance_peer.push(r#"[{"s":"MOCKUSD","b":"102","a":"99"}]"#);

        let arb = tokio::time::timeout(Duration::from_secs(5), arbs.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(arb.base, "MOCK");
        assert_eq!(arb.high.exchange, Exchange::Binance);
        assert_eq!(arb.low.exchange, Exchange::Binance);
        assert!((arb.spread - 3.0303).abs() < 1e-3);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(handle.metrics().snapshot().arb_events, 1);

        shutdown.trigger();
        task.await.unwrap().unwrap();
        assert!(kraken_peer.is_closed());
        assert!(binance_peer.is_closed());
        assert!(handle.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_bad_quote_does_not_stop_engine() {
        let (kraken, kraken_peer) = mock_transport();
        let (coinbase, _coinbase_peer) = mock_transport();
        let connector = MockConnector::new();
        connector.accept("ws://kraken", kraken);
        connector.accept("ws://coinbase", coinbase);

        let shutdown = Shutdown::new();
        let engine = engine(config(&[Exchange::Coinbase, Exchange::Kraken]), connector, &shutdown);
        let handle = engine.handle();
        let mut quotes = handle.subscribe_quotes();
        let task = tokio::spawn(engine.run());

        kraken_peer.push(r#"[0,["","101","1.0","1","1"],"spread","MOCK/USD"]"#);
        kraken_peer.push(r#"[0,["100","101","1.0","1","1"],"spread","MOCK/USD"]"#);
        assert_eq!(quotes.recv().await.unwrap().bid, "");
        assert_eq!(quotes.recv().await.unwrap().bid, "100");
        assert_eq!(handle.metrics().snapshot().quotes_rejected, 1);

        shutdown.trigger();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stable_exchange_connect_failure_aborts() {
        let (kraken, kraken_peer) = mock_transport();
        let connector = MockConnector::new();
        connector.accept("ws://kraken", kraken);

        let shutdown = Shutdown::new();
        let engine = engine(config(&[Exchange::Kraken, Exchange::Coinbase]), connector, &shutdown);
        let err = engine.run().await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Connection { ref exchange, .. } if exchange == "coinbase"
        ));
        assert!(kraken_peer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_exchange_is_retried() {
        let (binance, _peer) = mock_transport();
        let connector = MockConnector::new();
        connector.refuse("ws://binance");
        connector.accept("ws://binance", binance);

        let shutdown = Shutdown::new();
        let engine = engine(config(&[Exchange::Binance]), connector, &shutdown);
        let handle = engine.handle();
        let task = tokio::spawn(engine.run());

        assert!(handle.snapshot().await.unwrap().is_empty());
        shutdown.trigger();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_during_connect_retry() {
        let (kraken, kraken_peer) = mock_transport();
        let connector = MockConnector::new();
        connector.accept("ws://kraken", kraken);

        // Binance is never reachable and keeps backing off
        let mut config = config(&[Exchange::Binance, Exchange::Kraken]);
        config.reconnect.initial_backoff_ms = 5_000;
        config.reconnect.max_backoff_ms = 30_000;
        let shutdown = Shutdown::new();
        let engine = engine(config, connector, &shutdown);
        let task = tokio::spawn(engine.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(kraken_peer.is_closed());
    }

    #[tokio::test]
    async fn test_engine_ends_when_all_feeds_stop() {
        let (kraken, kraken_peer) = mock_transport();
        let connector = MockConnector::new();
        connector.accept("ws://kraken", kraken);

        let shutdown = Shutdown::new();
        let engine = engine(config(&[Exchange::Kraken]), connector, &shutdown);
        let task = tokio::spawn(engine.run());

        kraken_peer.disconnect();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
