//! Per-exchange read loop
//!
//! Sends the adapter's subscribe frames, then decodes frames until shutdown,
//! a read failure or a fatal handshake error. Quotes and errors are funnelled
//! into the engine's queues; a failure ends only this loop.

use crate::core::Quote;
use crate::exchanges::{DecodeError, ErrorKind, ExchangeClient, ExchangeError, QuoteAdapter};
use crate::infrastructure::config::ReconnectConfig;
use crate::infrastructure::metrics::MetricsCollector;
use crate::infrastructure::shutdown::{LatchGuard, ShutdownSignal};
use crate::ws::connection::{Connector, Transport, WebSocketError};
use crate::ws::HandshakeError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

/// Capped exponential backoff for connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based): doubles, capped at max
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Connect, retrying with backoff when `retry` is set
    ///
    /// Without `retry` exactly one attempt is made. Returns `Ok(None)` when
    /// shutdown fires during an attempt or a backoff sleep.
    pub async fn connect<C: Connector>(
        &self,
        connector: &C,
        url: &str,
        retry: bool,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Option<C::Conn>, WebSocketError> {
        let attempts = if retry { self.max_attempts.max(1) } else { 1 };
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(None),
                r = connector.connect(url) => r,
            };
            let err = match result {
                Ok(conn) => return Ok(Some(conn)),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= attempts {
                return Err(err);
            }
            let delay = self.delay(attempt - 1);
            tracing::warn!(
                target: "feed",
                url,
                attempt,
                ?delay,
                error = %err,
                "Connect failed, retrying"
            );
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

/// Everything a read loop shares with the engine
pub struct FeedContext {
    pub quotes: mpsc::Sender<Quote>,
    pub errors: mpsc::Sender<ExchangeError>,
    pub shutdown: ShutdownSignal,
    /// Arrives when the loop returns
    pub latch: LatchGuard,
    pub handshake_timeout: Duration,
    pub metrics: Arc<MetricsCollector>,
}

/// How the loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedExit {
    /// Shutdown signalled or the engine stopped consuming
    Cancelled,
    /// Peer closed or the socket failed
    Disconnected,
    /// Subscribe request could not be sent
    SubscribeFailed,
    Handshake(HandshakeError),
}

/// Drive one exchange connection to completion
pub async fn run_feed<T: Transport>(
    mut client: ExchangeClient,
    mut transport: T,
    ctx: FeedContext,
) -> FeedExit {
    let FeedContext {
        quotes,
        errors,
        mut shutdown,
        latch,
        handshake_timeout,
        metrics,
    } = ctx;
    let _latch = latch;
    let exchange = client.exchange();
    let report = |kind: ErrorKind, message: &dyn std::fmt::Display| {
        let err = ExchangeError::new(exchange, kind, message);
        tracing::warn!(target: "feed", %exchange, %kind, "{}", err.message);
        // The engine drains errors continuously; a full queue only loses the report
        let _ = errors.try_send(err);
    };

    metrics.set_connected(exchange, true);
    tracing::info!(target: "feed", %exchange, url = client.url(), "Feed started");

    let exit = 'feed: {
        for frame in client.subscribe_requests() {
            if let Err(e) = transport.send_text(&frame).await {
                report(ErrorKind::Subscription, &e);
                break 'feed FeedExit::SubscribeFailed;
            }
        }

        let deadline = Instant::now() + handshake_timeout;
        loop {
            let listening = client.is_listening();
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                r = async {
                    if listening {
                        Ok(transport.recv().await)
                    } else {
                        timeout_at(deadline, transport.recv()).await
                    }
                } => Some(r),
            };

            let payload = match received {
                None => break FeedExit::Cancelled,
                Some(Err(_)) => {
                    let err = HandshakeError::Timeout(handshake_timeout);
                    report(ErrorKind::Handshake, &err);
                    break FeedExit::Handshake(err);
                }
                Some(Ok(Err(e))) => {
                    report(ErrorKind::Read, &e);
                    break FeedExit::Disconnected;
                }
                Some(Ok(Ok(None))) => {
                    report(ErrorKind::Read, &"connection closed by peer");
                    break FeedExit::Disconnected;
                }
                Some(Ok(Ok(Some(payload)))) => payload,
            };

            match client.handle_message(&payload) {
                Ok(batch) => {
                    if batch.is_empty() {
                        continue;
                    }
                    metrics.record_quotes(exchange, batch.len());
                    for quote in batch {
                        if quotes.send(quote).await.is_err() {
                            break 'feed FeedExit::Cancelled;
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    report(e.kind(), &e);
                    let exit = match e {
                        DecodeError::Handshake(h) => FeedExit::Handshake(h),
                        _ => FeedExit::Disconnected,
                    };
                    break exit;
                }
                Err(e) => {
                    metrics.record_decode_error(exchange);
                    report(e.kind(), &e);
                }
            }
        }
    };

    if let Err(e) = transport.close().await {
        tracing::debug!(target: "feed", %exchange, error = %e, "Close failed");
    }
    metrics.set_connected(exchange, false);
    tracing::info!(target: "feed", %exchange, ?exit, "Feed stopped");
    exit
}
