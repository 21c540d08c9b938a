//! Event notification bus, one broadcast lane per [`EventId`].
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every event on its lane without any single subscriber
//! blocking the others.  A slow subscriber loses the oldest events and sees
//! a `Lagged` error instead of stalling producers.
//!
//! Lanes are created lazily on first [`subscribe`][EventBus::subscribe] or
//! [`register`][EventBus::register]; publishing to a lane nobody listens on
//! is a normal condition and reports zero deliveries.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use obstacle_types::{Event, EventId};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared event bus. Clone it cheaply – all clones share the same lanes.
#[derive(Clone, Debug)]
pub struct EventBus {
    capacity: usize,
    lanes: Arc<RwLock<HashMap<EventId, broadcast::Sender<Event>>>>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every lane independently.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lanes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Make sure a lane exists for `event_id`.
    pub fn register(&self, event_id: EventId) {
        self.sender(event_id);
    }

    /// Publish `event` on its lane.
    ///
    /// Returns the number of subscribers that were handed the event; `0` when
    /// nobody is listening.
    pub fn publish(&self, event: Event) -> usize {
        let lanes = self.lanes.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = lanes.get(&event.event_id) else {
            trace!(event_id = %event.event_id, "no lane registered; event dropped");
            return 0;
        };
        let event_id = event.event_id;
        match sender.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(_)) => {
                trace!(%event_id, "no subscribers on lane");
                0
            }
        }
    }

    /// Subscribe to one lane.
    pub fn subscribe(&self, event_id: EventId) -> EventReceiver {
        EventReceiver {
            event_id,
            receiver: self.sender(event_id).subscribe(),
        }
    }

    /// Ids of every lane created so far, sorted.
    pub fn lanes(&self) -> Vec<EventId> {
        let lanes = self.lanes.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<EventId> = lanes.keys().copied().collect();
        ids.sort();
        ids
    }

    fn sender(&self, event_id: EventId) -> broadcast::Sender<Event> {
        let mut lanes = self.lanes.write().unwrap_or_else(|e| e.into_inner());
        lanes
            .entry(event_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single lane.
///
/// Obtained via [`EventBus::subscribe`].
pub struct EventReceiver {
    event_id: EventId,
    receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event on this lane.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` events were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`recv`][Self::recv] but skips over lag, returning `None` only
    /// once the lane is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(event_id = %self.event_id, lagged_by = n, "event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-queued event, without waiting.  Lag is skipped.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(event_id = %self.event_id, lagged_by = n, "event receiver lagged");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }
}
