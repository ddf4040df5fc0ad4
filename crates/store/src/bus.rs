// SPDX-License-Identifier: MIT

//! Per-entity event fan-out with drop-oldest-on-overflow semantics (spec
//! section "EventBus").
//!
//! Each entity gets its own bounded broadcast channel. `publish` never
//! blocks: a subscriber that falls more than `capacity` events behind
//! silently loses the oldest ones it hasn't read yet (`broadcast`'s native
//! lagging behaviour), which is exactly the "oldest event for that
//! subscriber is discarded" policy the spec allows as equivalent to a hard
//! drop-oldest buffer.

use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;
use wsi_core::Event;

/// Default bound on in-flight events per subscriber before it starts lagging.
pub const DEFAULT_BUFFER: usize = 64;

pub struct EventBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Event>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self { channels: RwLock::new(HashMap::new()), capacity: capacity.max(1) }
    }

    /// Subscribe to updates for one entity (job id or workflow id).
    ///
    /// Lazily creates the entity's channel on first subscription; the
    /// channel (and any backlog) is dropped once the last subscriber and
    /// the last publish reference to it are gone.
    pub fn subscribe(&self, entity_id: &str) -> Subscription {
        let mut channels = self.channels.write();
        let sender = channels
            .entry(entity_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        Subscription { rx: sender.subscribe() }
    }

    /// Publish an event for one entity. Non-blocking: if there are no
    /// subscribers the event is simply dropped.
    pub fn publish(&self, entity_id: &str, event: Event) {
        let sender = {
            let channels = self.channels.read();
            channels.get(entity_id).cloned()
        };
        if let Some(sender) = sender {
            // Err means no receivers are currently attached; not a failure.
            let _ = sender.send(event);
        } else {
            tracing::trace!(entity_id, "publish with no subscribers, dropping");
        }
    }
}

/// A subscriber's receive handle. Detaches (in the sense that further
/// publishes are silently ignored for it) when dropped.
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Await the next event in publish order for this entity. Returns
    /// `None` only if the bus-side sender has been fully dropped, which
    /// cannot happen while the `EventBus` that created this subscription
    /// is alive.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "subscriber lagging, oldest events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
