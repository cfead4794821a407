//! Push channel to UI subscribers
//!
//! Fire-and-forget broadcast: each connected subscriber sees an event at
//! most once, disconnected subscribers get no replay. The hub owns the
//! subscriber registry explicitly; nothing here is process-global.

use crate::{
    engine::Transaction,
    scanner::Opportunity,
    strategy::StrategyUpdate,
    venues::ConnectionStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// Default event buffer per subscriber; a subscriber lagging past this
/// loses the oldest events, in line with at-most-once delivery.
const CHANNEL_CAPACITY: usize = 512;

/// Events mirrored to UI subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PushEvent {
    /// A new opportunity cleared the detection gate
    OpportunityDetected(Opportunity),
    /// A transaction reached a terminal status
    TransactionSettled(Transaction),
    /// The strategy engine retuned the threshold
    StrategyUpdated(StrategyUpdate),
    /// A venue's connection status changed
    ConnectionStatusChanged {
        /// Venue name
        venue: String,
        /// New status
        status: ConnectionStatus,
    },
    /// The control surface changed thresholds
    ThresholdsChanged {
        /// Global threshold before the change, in percent
        previous_pct: f64,
        /// Global threshold after the change, in percent
        current_pct: f64,
        /// Current per-pair overrides
        pair_overrides: HashMap<String, f64>,
    },
}

/// A registered subscription: the receiver plus the id needed to
/// unregister it
pub struct Subscription {
    /// Registry id of this subscriber
    pub id: u64,
    /// Event receiver
    pub receiver: broadcast::Receiver<PushEvent>,
}

/// Broadcast hub with an explicit subscriber registry
pub struct PushHub {
    sender: broadcast::Sender<PushEvent>,
    subscribers: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
}

impl PushHub {
    /// Create a hub with the default buffer capacity
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            subscribers: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().expect("subscriber registry poisoned").insert(id);
        Subscription {
            id,
            receiver: self.sender.subscribe(),
        }
    }

    /// Remove a subscriber from the registry. The receiver side simply
    /// gets dropped by the caller.
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().expect("subscriber registry poisoned").remove(&id);
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber registry poisoned").len()
    }

    /// Publish an event to all connected subscribers. Having no
    /// subscribers is not an error.
    pub fn publish(&self, event: PushEvent) {
        if self.sender.send(event).is_err() {
            debug!("push event dropped, no connected subscribers");
        }
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}
