//! [`SharedDataPublisher`] – the last hop of every radar frame.
//!
//! Stores a [`ResultSet`] under its derived key and then notifies every
//! registered listener lane with an [`Event`] carrying the same timestamp and
//! the device id in its `reserve` field, so listeners can rebuild the key and
//! fetch the result.

use std::sync::Arc;

use obstacle_types::{Event, EventId, ResultSet, Timestamp};
use thiserror::Error;
use tracing::{debug, error};

use crate::bus::EventBus;
use crate::key::{KeyError, shared_data_key};
use crate::store::SharedDataStore;

/// What a successful publish did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub key: String,
    /// An earlier result with the same key was overwritten.
    pub replaced: bool,
    /// Events emitted, one per registered listener lane.
    pub events: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("shared data key: {0}")]
    Key(#[from] KeyError),
}

/// Sink for finished frames.
///
/// [`SharedDataPublisher`] is the production implementation; tests swap in
/// spies.
pub trait ResultPublisher: Send + Sync {
    fn publish(&self, timestamp: Timestamp, device_id: &str, result: ResultSet) -> Result<PublishReceipt, PublishError>;
}

/// Shared-data store plus event fan-out.
pub struct SharedDataPublisher {
    store: Arc<SharedDataStore<ResultSet>>,
    bus: EventBus,
    event_ids: Vec<EventId>,
    retention: Option<f64>,
}

impl SharedDataPublisher {
    /// Publish into `store` and announce on `event_ids` (lanes are registered
    /// on `bus` immediately).
    pub fn new(store: Arc<SharedDataStore<ResultSet>>, bus: EventBus, event_ids: Vec<EventId>) -> Self {
        for id in &event_ids {
            bus.register(*id);
        }
        Self {
            store,
            bus,
            event_ids,
            retention: None,
        }
    }

    /// Evict stored results older than `seconds` behind each new publish.
    pub fn with_retention(mut self, seconds: f64) -> Self {
        self.retention = (seconds.is_finite() && seconds > 0.0).then_some(seconds);
        self
    }

    pub fn store(&self) -> &Arc<SharedDataStore<ResultSet>> {
        &self.store
    }

    pub fn event_ids(&self) -> &[EventId] {
        &self.event_ids
    }
}

impl ResultPublisher for SharedDataPublisher {
    fn publish(&self, timestamp: Timestamp, device_id: &str, result: ResultSet) -> Result<PublishReceipt, PublishError> {
        let key = shared_data_key(timestamp, device_id).map_err(|e| {
            error!(timestamp, device_id, error = %e, "failed to derive shared data key; dropping result");
            e
        })?;

        let error_code = result.error_code;
        let replaced = self.store.add(key.clone(), timestamp, result).is_some();
        if let Some(window) = self.retention {
            self.store.evict_older_than(timestamp - window);
        }

        let mut events = 0;
        for event_id in &self.event_ids {
            let delivered = self.bus.publish(Event::new(*event_id, timestamp, device_id));
            debug!(%event_id, delivered, "event emitted");
            events += 1;
        }

        debug!(key = %key, ?error_code, replaced, events, "result published");
        Ok(PublishReceipt { key, replaced, events })
    }
}
