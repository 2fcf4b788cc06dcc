//! Cooperative shutdown
//!
//! `Shutdown` broadcasts the cancellation signal. Each read loop holds a
//! `LatchGuard` and arrives on the shared `ShutdownLatch` when it exits, so
//! the process can wait for every loop to close its socket before exiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{timeout_at, Instant};

/// Owner of the cancellation signal
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side, one per task
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown is triggered or its owner is gone
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Completion counter shared by the read loops
#[derive(Debug, Clone, Default)]
pub struct ShutdownLatch {
    inner: Arc<LatchInner>,
}

#[derive(Debug, Default)]
struct LatchInner {
    arrived: AtomicUsize,
    notify: Notify,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard that arrives when dropped, whichever way the task exits
    pub fn guard(&self) -> LatchGuard {
        LatchGuard {
            latch: self.clone(),
        }
    }

    pub fn arrive(&self) {
        self.inner.arrived.fetch_add(1, Ordering::AcqRel);
        self.inner.notify.notify_waiters();
    }

    pub fn arrived(&self) -> usize {
        self.inner.arrived.load(Ordering::Acquire)
    }

    /// Wait until `expected` tasks arrived; false on timeout
    pub async fn wait(&self, expected: usize, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an arrival in between is not lost
            notified.as_mut().enable();

            if self.arrived() >= expected {
                return true;
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.arrived() >= expected;
            }
        }
    }
}

#[derive(Debug)]
pub struct LatchGuard {
    latch: ShutdownLatch,
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.latch.arrive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_signal_observed_by_clones() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.signal();
        let mut b = a.clone();
        assert!(!a.is_cancelled());

        shutdown.trigger();
        a.cancelled().await;
        b.cancelled().await;
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_trigger_wakes_pending_signal() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        let mut cancelled = task::spawn(signal.cancelled());
        assert_pending!(cancelled.poll());

        shutdown.trigger();
        assert!(cancelled.is_woken());
        assert_ready!(cancelled.poll());
    }

    #[tokio::test]
    async fn test_signal_resolves_when_owner_dropped() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.signal();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_latch_waits_for_all_guards() {
        let latch = ShutdownLatch::new();
        for i in 0..3u64 {
            let guard = latch.guard();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10 * i)).await;
                drop(guard);
            });
        }
        assert!(latch.wait(3, Duration::from_secs(2)).await);
        assert_eq!(latch.arrived(), 3);
    }

    #[tokio::test]
    async fn test_latch_times_out() {
        let latch = ShutdownLatch::new();
        let _held = latch.guard();
        assert!(!latch.wait(1, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_guard_arrives_on_panic() {
        let latch = ShutdownLatch::new();
        let guard = latch.guard();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("read loop crashed");
        });
        assert!(handle.await.is_err());
        assert!(latch.wait(1, Duration::from_secs(1)).await);
    }
}
