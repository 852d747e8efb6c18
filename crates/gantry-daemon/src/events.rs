//! Event bus
//!
//! Fan-out of reconciliation events to API consumers plus a bounded
//! in-memory ring of recent events for the `/events` endpoint.

use gantry_types::{EventSource, GantryEvent, GantryEventEnvelope};
use std::collections::VecDeque;
use tokio::sync::{broadcast, RwLock};

/// Broadcasts events and keeps the most recent ones around
pub struct EventBus {
    tx: broadcast::Sender<GantryEventEnvelope>,
    recent: RwLock<VecDeque<GantryEventEnvelope>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Emit an event; never fails, even with no subscribers
    pub async fn emit(&self, event: GantryEvent, source: EventSource) {
        let envelope = GantryEventEnvelope::new(event, source);

        let mut recent = self.recent.write().await;
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(envelope.clone());
        drop(recent);

        let _ = self.tx.send(envelope);
    }

    /// Most recent events, newest last
    pub async fn recent(&self, limit: usize) -> Vec<GantryEventEnvelope> {
        let recent = self.recent.read().await;
        recent
            .iter()
            .skip(recent.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GantryEventEnvelope> {
        self.tx.subscribe()
    }
}
