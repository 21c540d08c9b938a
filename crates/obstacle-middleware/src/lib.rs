//! `obstacle-middleware` – shared data and notification plumbing.
//!
//! Moves finished results from producers to listeners without caring about
//! their meaning.
//!
//! # Modules
//!
//! - [`key`] – pure `(timestamp, device_id)` → key derivation shared by
//!   writers and readers.
//! - [`store`] – [`SharedDataStore`]: last-write-wins keyed store.
//! - [`bus`] – [`EventBus`]: one tokio broadcast lane per event id.
//! - [`publisher`] – [`SharedDataPublisher`]: store, then announce.

pub mod bus;
pub mod key;
pub mod publisher;
pub mod store;

pub use bus::{EventBus, EventReceiver};
pub use key::{KeyError, shared_data_key};
pub use publisher::{PublishError, PublishReceipt, ResultPublisher, SharedDataPublisher};
pub use store::SharedDataStore;
