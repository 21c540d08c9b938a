//! [`IdentityTracker`] – stable object identities across frames.
//!
//! Raw detection ids are only meaningful for a short time; the tracker maps
//! them onto stable ids that survive brief dropouts.  Each raw id owns one
//! record that moves through
//!
//! ```text
//! New ──second sighting──▶ Confirmed ◀──seen again── Stale
//!  │                          │                        │
//!  └── absent ≥ delay ──▶ Retired ◀── absent ≥ delay ──┘
//! ```
//!
//! A record seen at frame `f` can be matched again up to frame
//! `f + delay_frames`.  It is retired at the end of the first frame where
//! `current - last_seen >= delay_frames`, after which its raw id starts a
//! fresh record.
//!
//! With false-positive filtering enabled, a `New` record only receives a
//! stable id on its second sighting.  Frames holding objects of pending
//! records are buffered; a record retired while still `New` is rejected and
//! its objects are stripped from every buffered frame.  Failed results carry
//! no objects but still advance the frame count, so a sensor outage cannot
//! hold earlier frames back for more than `delay_frames`.  Frames leave the
//! tracker strictly in arrival order.

use std::collections::{HashMap, VecDeque};

use obstacle_types::ResultSet;
use tracing::{debug, trace};

/// Tracker tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Frames a record survives without a sighting.
    pub delay_frames: u64,
    /// Hold first sightings until confirmed; drop unconfirmed ones.
    pub use_fp_filter: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            delay_frames: 4,
            use_fp_filter: true,
        }
    }
}

/// Lifecycle state of a tracked raw id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    New,
    Confirmed,
    /// Confirmed, but absent from the most recent frame.
    Stale,
}

#[derive(Debug, Clone)]
struct TrackRecord {
    stable_id: Option<u64>,
    state: TrackState,
    hits: u32,
    first_seen: u64,
    last_seen: u64,
}

/// Assigns stable ids to [`DetectedObject`][obstacle_types::DetectedObject]s
/// and releases completed frames.
#[derive(Debug)]
pub struct IdentityTracker {
    config: IdentityConfig,
    records: HashMap<u32, TrackRecord>,
    pending: VecDeque<ResultSet>,
    frame: u64,
    next_id: u64,
}

impl IdentityTracker {
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
            pending: VecDeque::new(),
            frame: 0,
            next_id: 1,
        }
    }

    pub fn config(&self) -> IdentityConfig {
        self.config
    }

    /// Feed one frame; returns the frames that became publishable, oldest
    /// first.
    ///
    /// Results that do not carry [`ErrorCode::Ok`][obstacle_types::ErrorCode]
    /// are routed through [`pass_through`][Self::pass_through].
    pub fn stabilize(&mut self, mut result: ResultSet) -> Vec<ResultSet> {
        if !result.is_ok() {
            return self.pass_through(result);
        }
        self.frame += 1;
        let frame = self.frame;

        let mut confirmed = Vec::new();
        for object in result.objects.iter_mut() {
            object.track_id = self.observe(object.raw_id, frame, &mut confirmed);
        }
        for (raw_id, stable_id) in confirmed {
            self.backfill(raw_id, stable_id);
        }

        self.pending.push_back(result);
        self.sweep(frame);
        self.drain_ready()
    }

    /// Queue a result without matching its objects.  It still counts as a
    /// frame, so tracks age and pending first sightings are rejected on
    /// schedule while the sensor is failing.  It is released as soon as
    /// every frame ahead of it has been.
    pub fn pass_through(&mut self, result: ResultSet) -> Vec<ResultSet> {
        self.frame += 1;
        let frame = self.frame;
        trace!(timestamp = result.timestamp, frame, "queueing untracked result");
        self.pending.push_back(result);
        self.sweep(frame);
        self.drain_ready()
    }

    /// Release everything still buffered.  Objects whose records never got
    /// confirmed are dropped.
    pub fn flush(&mut self) -> Vec<ResultSet> {
        let mut out: Vec<ResultSet> = self.pending.drain(..).collect();
        for result in &mut out {
            result.objects.retain(|o| o.track_id.is_some());
        }
        if !out.is_empty() {
            debug!(frames = out.len(), "flushed identity tracker");
        }
        out
    }

    pub fn state_of(&self, raw_id: u32) -> Option<TrackState> {
        self.records.get(&raw_id).map(|r| r.state)
    }

    pub fn stable_id_of(&self, raw_id: u32) -> Option<u64> {
        self.records.get(&raw_id).and_then(|r| r.stable_id)
    }

    /// Number of live records.
    pub fn active_tracks(&self) -> usize {
        self.records.len()
    }

    /// Frames buffered awaiting confirmation.
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Index of the last tracked frame (1-based, 0 before the first).
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    fn observe(&mut self, raw_id: u32, frame: u64, confirmed: &mut Vec<(u32, u64)>) -> Option<u64> {
        let next_id = &mut self.next_id;
        if let Some(record) = self.records.get_mut(&raw_id) {
            // Duplicate raw ids within one frame are a single sighting.
            if record.last_seen != frame {
                record.hits += 1;
                record.last_seen = frame;
                match record.state {
                    TrackState::New => {
                        record.state = TrackState::Confirmed;
                        if record.stable_id.is_none() {
                            let id = allocate(next_id);
                            record.stable_id = Some(id);
                            confirmed.push((raw_id, id));
                        }
                        debug!(
                            raw_id,
                            stable_id = record.stable_id,
                            first_seen = record.first_seen,
                            "track confirmed"
                        );
                    }
                    TrackState::Stale => record.state = TrackState::Confirmed,
                    TrackState::Confirmed => {}
                }
            }
            return record.stable_id;
        }

        let stable_id = (!self.config.use_fp_filter).then(|| allocate(next_id));
        self.records.insert(
            raw_id,
            TrackRecord {
                stable_id,
                state: TrackState::New,
                hits: 1,
                first_seen: frame,
                last_seen: frame,
            },
        );
        trace!(raw_id, frame, "new track");
        stable_id
    }

    /// Stamp a freshly confirmed id onto the earlier sightings still buffered.
    fn backfill(&mut self, raw_id: u32, stable_id: u64) {
        for result in self.pending.iter_mut() {
            for object in result.objects.iter_mut() {
                if object.raw_id == raw_id && object.track_id.is_none() {
                    object.track_id = Some(stable_id);
                }
            }
        }
    }

    fn sweep(&mut self, frame: u64) {
        let delay = self.config.delay_frames;
        let filter = self.config.use_fp_filter;
        let mut rejected = Vec::new();

        self.records.retain(|raw_id, record| {
            if record.last_seen == frame {
                return true;
            }
            if frame - record.last_seen >= delay {
                if filter && record.state == TrackState::New {
                    rejected.push(*raw_id);
                }
                debug!(
                    raw_id = *raw_id,
                    stable_id = record.stable_id,
                    hits = record.hits,
                    "track retired"
                );
                return false;
            }
            if record.state == TrackState::Confirmed {
                record.state = TrackState::Stale;
            }
            true
        });

        for raw_id in rejected {
            debug!(raw_id, "rejecting unconfirmed detection");
            for result in self.pending.iter_mut() {
                result
                    .objects
                    .retain(|o| !(o.raw_id == raw_id && o.track_id.is_none()));
            }
        }
    }

    fn drain_ready(&mut self) -> Vec<ResultSet> {
        let mut out = Vec::new();
        while self
            .pending
            .front()
            .is_some_and(|r| r.objects.iter().all(|o| o.track_id.is_some()))
        {
            if let Some(result) = self.pending.pop_front() {
                out.push(result);
            }
        }
        out
    }
}

fn allocate(next_id: &mut u64) -> u64 {
    let id = *next_id;
    *next_id += 1;
    id
}
