//! Subscriber fan-out
//!
//! Registry of connected subscriber sessions. Each session drains its own
//! bounded queue; a publish never waits on a slow session, it drops it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Serialized event shared by every session
pub type Frame = Arc<str>;

#[derive(Debug)]
pub struct SubscriberHub {
    sessions: Mutex<HashMap<Uuid, mpsc::Sender<Frame>>>,
    queue_capacity: usize,
}

impl SubscriberHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a session and hand back its queue
    pub fn join(&self) -> (Uuid, mpsc::Receiver<Frame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.sessions.lock().insert(id, tx);
        tracing::debug!(target: "api", %id, "Subscriber joined");
        (id, rx)
    }

    pub fn leave(&self, id: &Uuid) -> bool {
        self.sessions.lock().remove(id).is_some()
    }

    /// Deliver to every session, removing those whose queue is full or closed
    ///
    /// Returns the number of sessions reached.
    pub fn publish(&self, frame: Frame) -> usize {
        let mut sessions = self.sessions.lock();
        let mut dropped = Vec::new();
        for (id, tx) in sessions.iter() {
            if let Err(e) = tx.try_send(frame.clone()) {
                tracing::warn!(target: "api", %id, error = %e, "Dropping subscriber");
                dropped.push(*id);
            }
        }
        for id in &dropped {
            sessions.remove(id);
        }
        sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
