//! Fact change broadcast bus
//!
//! Components subscribe to one fact-change class or to all of them. The bus
//! is the only path by which property updates, control events, and clock
//! ticks reach the routine runtime.

use dashmap::DashMap;
use routine_core::{FactChange, FactClass};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for fact subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast bus for fact changes
pub struct FactBus {
    /// Per-class broadcast senders
    class_senders: DashMap<FactClass, broadcast::Sender<FactChange>>,
    /// Sender for subscribers of every class
    all_sender: broadcast::Sender<FactChange>,
    /// Channel capacity
    capacity: usize,
}

impl FactBus {
    /// Create a bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the given channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (all_sender, _) = broadcast::channel(capacity);
        Self {
            class_senders: DashMap::new(),
            all_sender,
            capacity,
        }
    }

    /// Subscribe to one fact-change class
    pub fn subscribe(&self, class: FactClass) -> broadcast::Receiver<FactChange> {
        trace!(?class, "subscribing to fact class");
        self.class_senders
            .entry(class)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Subscribe to every fact change
    pub fn subscribe_all(&self) -> broadcast::Receiver<FactChange> {
        self.all_sender.subscribe()
    }

    /// Publish a change to class subscribers and all-subscribers
    pub fn publish(&self, change: FactChange) {
        debug!(class = ?change.class(), "publishing fact change");

        if let Some(sender) = self.class_senders.get(&change.class()) {
            // Send errors only mean no active receivers
            let _ = sender.send(change.clone());
        }
        let _ = self.all_sender.send(change);
    }
}

impl Default for FactBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to a FactBus
pub type SharedFactBus = Arc<FactBus>;
