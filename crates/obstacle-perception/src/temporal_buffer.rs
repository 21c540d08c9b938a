//! Bounded, time-indexed ring buffer for auxiliary measurements.
//!
//! Motion fixes arrive on their own stream and are looked up by radar frames
//! at the radar's (corrected) capture time.  The buffer keeps the last
//! `capacity` samples in arrival order; pushing into a full buffer overwrites
//! the oldest sample.
//!
//! # Example
//!
//! ```rust
//! use obstacle_perception::temporal_buffer::{BufferError, TemporalBuffer};
//!
//! let mut buf = TemporalBuffer::new(3, 0.05);
//! buf.push(10.0, "a");
//! buf.push(10.2, "b");
//! buf.push(10.4, "c");
//!
//! assert_eq!(buf.nearest_before(10.29).unwrap().value, "b");
//! assert_eq!(buf.nearest_before(10.5).unwrap_err(), BufferError::TooNew {
//!     query: 10.5,
//!     newest: 10.4,
//! });
//! ```

use std::collections::VecDeque;

use obstacle_types::Timestamp;
use thiserror::Error;

/// Default staleness tolerance on either side of the buffered range (s).
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Why a lookup produced no sample.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum BufferError {
    #[error("buffer is empty")]
    Empty,

    #[error("query {query} is earlier than the oldest sample {oldest}")]
    TooOld { query: Timestamp, oldest: Timestamp },

    #[error("query {query} is newer than the latest sample {newest}")]
    TooNew { query: Timestamp, newest: Timestamp },
}

/// A value paired with the time it was measured.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub timestamp: Timestamp,
    pub value: T,
}

/// Fixed-capacity circular buffer with nearest-timestamp lookup.
#[derive(Debug, Clone)]
pub struct TemporalBuffer<T> {
    capacity: usize,
    tolerance: f64,
    samples: VecDeque<Stamped<T>>,
}

impl<T> TemporalBuffer<T> {
    /// Create a buffer holding at most `capacity` samples (at least one).
    ///
    /// `tolerance` is how far (seconds) a query may fall outside the buffered
    /// time range before it is rejected as stale.
    pub fn new(capacity: usize, tolerance: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            tolerance: tolerance.max(0.0),
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, overwriting the oldest one when full.
    ///
    /// No ordering check is made; lookups assume roughly increasing arrival
    /// order.
    pub fn push(&mut self, timestamp: Timestamp, value: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Stamped { timestamp, value });
    }

    /// Return the sample closest to `query` (ties resolve to the later one).
    ///
    /// Scans from the newest sample backwards and stops at the first step
    /// whose distance does not strictly improve.
    pub fn nearest_before(&self, query: Timestamp) -> Result<&Stamped<T>, BufferError> {
        let (Some(oldest), Some(newest)) = (self.samples.front(), self.samples.back()) else {
            return Err(BufferError::Empty);
        };
        if query < oldest.timestamp - self.tolerance {
            return Err(BufferError::TooOld {
                query,
                oldest: oldest.timestamp,
            });
        }
        if query > newest.timestamp + self.tolerance {
            return Err(BufferError::TooNew {
                query,
                newest: newest.timestamp,
            });
        }

        let mut best = f64::INFINITY;
        let mut best_idx = self.samples.len() - 1;
        for (idx, sample) in self.samples.iter().enumerate().rev() {
            let distance = (query - sample.timestamp).abs();
            if distance >= best {
                break;
            }
            best = distance;
            best_idx = idx;
        }
        Ok(&self.samples[best_idx])
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Oldest and newest buffered timestamps.
    pub fn span(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.samples.front()?.timestamp, self.samples.back()?.timestamp))
    }

    /// Iterate samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Stamped<T>> {
        self.samples.iter()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
