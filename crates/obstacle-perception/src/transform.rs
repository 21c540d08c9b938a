//! Time-indexed Transform Frame (TF) buffer.
//!
//! Maintains a graph of named reference frames.  Each edge `parent → child`
//! holds either one static transform or a bounded, time-sorted history of
//! stamped transforms.  Given two frame names and a query time the buffer
//! finds a chain of edges via BFS (edges may be walked in either direction),
//! samples every edge at the query time and composes the result.
//!
//! Sampling interpolates between the two bracketing stamps (linear for the
//! translation, slerp for the rotation) and refuses to extrapolate.
//!
//! # Example
//!
//! ```rust
//! use obstacle_perception::transform::{TfBuffer, Transform3D, Quaternion, TransformService};
//! use obstacle_types::Vec3;
//!
//! let tf = TfBuffer::new(16);
//! tf.set_transform("world", "novatel", 10.0,
//!     Transform3D::new(Vec3::new(0.0, 0.0, 0.0), Quaternion::identity()));
//! tf.set_transform("world", "novatel", 11.0,
//!     Transform3D::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::identity()));
//! tf.set_static_transform("novatel", "radar",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup_transform("world", "radar", 10.5).unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

use obstacle_types::{PoseMatrix, Timestamp, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Two stamps closer than this are treated as the same instant.
const STAMP_EPSILON: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw` radians around +Z.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    fn dot(self, rhs: Self) -> f64 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    fn normalized(self) -> Self {
        let n = self.dot(self).sqrt();
        if n <= f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Spherical linear interpolation along the shortest arc, `t ∈ [0, 1]`.
    pub fn slerp(self, other: Self, t: f64) -> Self {
        let mut end = other;
        let mut cos_theta = self.dot(other);
        if cos_theta < 0.0 {
            end = Self::new(-other.w, -other.x, -other.y, -other.z);
            cos_theta = -cos_theta;
        }
        let (a, b) = if cos_theta > 0.9995 {
            // Nearly parallel: fall back to normalised lerp.
            (1.0 - t, t)
        } else {
            let theta = cos_theta.acos();
            let sin_theta = theta.sin();
            (((1.0 - t) * theta).sin() / sin_theta, (t * theta).sin() / sin_theta)
        };
        Self::new(
            a * self.w + b * end.w,
            a * self.x + b * end.x,
            a * self.y + b * end.y,
            a * self.z + b * end.z,
        )
        .normalized()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// T_B_A from T_A_B.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation.scale(-1.0)), inv_rot)
    }

    /// Map a point from the child frame into the parent frame.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.rotate(p).add(self.translation)
    }

    /// Rotate a free vector (e.g. a velocity) into the parent frame.
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation.rotate(v)
    }

    /// Interpolate between `self` (at ratio 0) and `other` (at ratio 1).
    pub fn interpolate(self, other: Self, ratio: f64) -> Self {
        let ratio = ratio.clamp(0.0, 1.0);
        let translation = self
            .translation
            .add(other.translation.sub(self.translation).scale(ratio));
        Self::new(translation, self.rotation.slerp(other.rotation, ratio))
    }

    /// The 4×4 homogeneous matrix of this transform.
    pub fn to_matrix(&self) -> PoseMatrix {
        let Quaternion { w, x, y, z } = self.rotation;
        let t = self.translation;
        PoseMatrix([
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
                t.x,
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
                t.y,
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
                t.z,
            ],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform service contract
// ────────────────────────────────────────────────────────────────────────────

/// Failure reported by a [`TransformService`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("no connection between frame '{source_frame}' and frame '{target_frame}'")]
    NoPath {
        target_frame: String,
        source_frame: String,
    },

    #[error("edge {parent} -> {child} has no data")]
    NoData { parent: String, child: String },

    #[error(
        "edge {parent} -> {child}: requested time {requested} outside [{earliest}, {latest}]"
    )]
    Extrapolation {
        parent: String,
        child: String,
        requested: Timestamp,
        earliest: Timestamp,
        latest: Timestamp,
    },
}

/// Abstract source of time-indexed transforms.
///
/// Implementations carry their own synchronization; callers treat both
/// methods as synchronous, potentially blocking calls.
pub trait TransformService: Send + Sync {
    /// `Ok` if `source` can be expressed in `target` at `time`, allowing data
    /// within `horizon` of the query time to bridge the frames.
    fn can_transform(
        &self,
        target: &str,
        source: &str,
        time: Timestamp,
        horizon: Duration,
    ) -> Result<(), TransformError>;

    /// T_target_source at exactly `time`.
    fn lookup_transform(
        &self,
        target: &str,
        source: &str,
        time: Timestamp,
    ) -> Result<Transform3D, TransformError>;
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct EdgeHistory {
    static_tf: Option<Transform3D>,
    /// Sorted by timestamp.
    samples: VecDeque<(Timestamp, Transform3D)>,
}

impl EdgeHistory {
    fn insert(&mut self, stamp: Timestamp, tf: Transform3D, capacity: usize) {
        let idx = self.samples.partition_point(|(ts, _)| *ts < stamp);
        match self.samples.get_mut(idx) {
            Some(existing) if (existing.0 - stamp).abs() < STAMP_EPSILON => existing.1 = tf,
            _ => self.samples.insert(idx, (stamp, tf)),
        }
        while self.samples.len() > capacity {
            self.samples.pop_front();
        }
    }

    fn covers(&self, time: Timestamp, horizon: f64) -> bool {
        if self.static_tf.is_some() {
            return true;
        }
        match (self.samples.front(), self.samples.back()) {
            (Some((first, _)), Some((last, _))) => {
                time >= first - horizon - STAMP_EPSILON && time <= last + horizon + STAMP_EPSILON
            }
            _ => false,
        }
    }

    fn sample(&self, parent: &str, child: &str, time: Timestamp) -> Result<Transform3D, TransformError> {
        if let Some(tf) = self.static_tf {
            return Ok(tf);
        }
        let (Some(&(earliest, first)), Some(&(latest, _))) =
            (self.samples.front(), self.samples.back())
        else {
            return Err(TransformError::NoData {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        };
        if time < earliest - STAMP_EPSILON || time > latest + STAMP_EPSILON {
            return Err(TransformError::Extrapolation {
                parent: parent.to_string(),
                child: child.to_string(),
                requested: time,
                earliest,
                latest,
            });
        }
        if self.samples.len() == 1 {
            return Ok(first);
        }

        let upper = self
            .samples
            .partition_point(|(ts, _)| *ts < time)
            .clamp(1, self.samples.len() - 1);
        let (t0, tf0) = self.samples[upper - 1];
        let (t1, tf1) = self.samples[upper];
        let span = t1 - t0;
        let ratio = if span > STAMP_EPSILON { (time - t0) / span } else { 0.0 };
        Ok(tf0.interpolate(tf1, ratio))
    }
}

/// One step along a frame chain.
#[derive(Debug, Clone)]
enum Hop {
    /// Walk `parent → child`, composing the edge transform.
    Forward { parent: String, child: String },
    /// Walk `child → parent`, composing the inverse edge transform.
    Inverse { parent: String, child: String },
}

/// A directed graph of named reference frames whose edges carry time-indexed
/// [`Transform3D`] histories.
///
/// Safe to share between a writer (the transform stream) and any number of
/// readers; all state sits behind an internal [`RwLock`].
#[derive(Debug)]
pub struct TfBuffer {
    history_capacity: usize,
    /// `edges[parent][child]`
    edges: RwLock<HashMap<String, HashMap<String, EdgeHistory>>>,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TfBuffer {
    /// Create an empty buffer that keeps up to `history_capacity` stamped
    /// transforms per edge.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history_capacity: history_capacity.max(1),
            edges: RwLock::new(HashMap::new()),
        }
    }

    /// Record the pose of `child_frame` in `parent_frame` at `stamp`.
    pub fn set_transform(
        &self,
        parent_frame: &str,
        child_frame: &str,
        stamp: Timestamp,
        transform: Transform3D,
    ) {
        let mut edges = match self.edges.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        edges
            .entry(parent_frame.to_string())
            .or_default()
            .entry(child_frame.to_string())
            .or_default()
            .insert(stamp, transform, self.history_capacity);
    }

    /// Register a transform that is valid at every instant (e.g. a sensor
    /// mounting extrinsic).
    pub fn set_static_transform(&self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        let mut edges = match self.edges.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        edges
            .entry(parent_frame.to_string())
            .or_default()
            .entry(child_frame.to_string())
            .or_default()
            .static_tf = Some(transform);
    }

    /// Sorted list of every known frame name.
    pub fn frames(&self) -> Vec<String> {
        let edges = match self.edges.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: HashSet<&String> = HashSet::new();
        for (parent, children) in edges.iter() {
            names.insert(parent);
            names.extend(children.keys());
        }
        let mut out: Vec<String> = names.into_iter().cloned().collect();
        out.sort();
        out
    }

    /// BFS from `target` to `source`; edges are walked forwards or backwards.
    fn find_path(
        edges: &HashMap<String, HashMap<String, EdgeHistory>>,
        target: &str,
        source: &str,
    ) -> Option<Vec<Hop>> {
        if target == source {
            return Some(Vec::new());
        }

        let mut queue: VecDeque<(String, Vec<Hop>)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        queue.push_back((target.to_string(), Vec::new()));
        visited.insert(target.to_string());

        while let Some((current, path)) = queue.pop_front() {
            let forward = edges.get(&current).into_iter().flat_map(|children| {
                children.keys().map(|child| {
                    (
                        child.clone(),
                        Hop::Forward {
                            parent: current.clone(),
                            child: child.clone(),
                        },
                    )
                })
            });
            let backward = edges
                .iter()
                .filter(|(_, children)| children.contains_key(&current))
                .map(|(parent, _)| {
                    (
                        parent.clone(),
                        Hop::Inverse {
                            parent: parent.clone(),
                            child: current.clone(),
                        },
                    )
                });

            let next_hops: Vec<(String, Hop)> = forward.chain(backward).collect();
            for (next, hop) in next_hops {
                if visited.contains(&next) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(hop);
                if next == source {
                    return Some(next_path);
                }
                visited.insert(next.clone());
                queue.push_back((next, next_path));
            }
        }
        None
    }

    fn edge<'a>(
        edges: &'a HashMap<String, HashMap<String, EdgeHistory>>,
        parent: &str,
        child: &str,
    ) -> Result<&'a EdgeHistory, TransformError> {
        edges
            .get(parent)
            .and_then(|children| children.get(child))
            .ok_or_else(|| TransformError::NoData {
                parent: parent.to_string(),
                child: child.to_string(),
            })
    }
}

impl TransformService for TfBuffer {
    fn can_transform(
        &self,
        target: &str,
        source: &str,
        time: Timestamp,
        horizon: Duration,
    ) -> Result<(), TransformError> {
        let edges = match self.edges.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let path = Self::find_path(&edges, target, source).ok_or_else(|| TransformError::NoPath {
            target_frame: target.to_string(),
            source_frame: source.to_string(),
        })?;
        let horizon = horizon.as_secs_f64();
        for hop in &path {
            let (parent, child) = match hop {
                Hop::Forward { parent, child } | Hop::Inverse { parent, child } => (parent, child),
            };
            let edge = Self::edge(&edges, parent, child)?;
            if !edge.covers(time, horizon) {
                return match (edge.samples.front(), edge.samples.back()) {
                    (Some((earliest, _)), Some((latest, _))) => Err(TransformError::Extrapolation {
                        parent: parent.clone(),
                        child: child.clone(),
                        requested: time,
                        earliest: *earliest,
                        latest: *latest,
                    }),
                    _ => Err(TransformError::NoData {
                        parent: parent.clone(),
                        child: child.clone(),
                    }),
                };
            }
        }
        Ok(())
    }

    fn lookup_transform(
        &self,
        target: &str,
        source: &str,
        time: Timestamp,
    ) -> Result<Transform3D, TransformError> {
        let edges = match self.edges.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let path = Self::find_path(&edges, target, source).ok_or_else(|| TransformError::NoPath {
            target_frame: target.to_string(),
            source_frame: source.to_string(),
        })?;

        let mut accumulated = Transform3D::identity();
        for hop in &path {
            accumulated = match hop {
                Hop::Forward { parent, child } => {
                    let tf = Self::edge(&edges, parent, child)?.sample(parent, child, time)?;
                    accumulated.compose(tf)
                }
                Hop::Inverse { parent, child } => {
                    let tf = Self::edge(&edges, parent, child)?.sample(parent, child, time)?;
                    accumulated.compose(tf.inverse())
                }
            };
        }
        Ok(accumulated)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    fn translation(x: f64, y: f64, z: f64) -> Transform3D {
        Transform3D::new(Vec3::new(x, y, z), Quaternion::identity())
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-9, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-9, "y should be ~1, got {}", r.y);
    }

    #[test]
    fn slerp_halfway_between_yaws() {
        let a = Quaternion::identity();
        let b = Quaternion::from_yaw(FRAC_PI_2);
        let mid = a.slerp(b, 0.5);
        let expected = Quaternion::from_yaw(FRAC_PI_2 / 2.0);
        assert!((mid.w - expected.w).abs() < 1e-9);
        assert!((mid.z - expected.z).abs() < 1e-9);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn inverse_composes_to_identity() {
        let t = Transform3D::new(Vec3::new(1.0, -2.0, 0.5), Quaternion::from_yaw(0.7));
        let id = t.compose(t.inverse());
        assert!(id.translation.norm() < 1e-9);
        assert!((id.rotation.w.abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn matrix_matches_point_transform() {
        let t = Transform3D::new(Vec3::new(3.0, 4.0, 1.0), Quaternion::from_yaw(FRAC_PI_2));
        let m = t.to_matrix().0;
        let p = Vec3::new(1.0, 0.0, 0.0);
        let via_matrix = Vec3::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][2] * p.z + m[0][3],
            m[1][0] * p.x + m[1][1] * p.y + m[1][2] * p.z + m[1][3],
            m[2][0] * p.x + m[2][1] * p.y + m[2][2] * p.z + m[2][3],
        );
        let direct = t.transform_point(p);
        assert!(via_matrix.sub(direct).norm() < 1e-9);
        assert!((direct.x - 3.0).abs() < 1e-9);
        assert!((direct.y - 5.0).abs() < 1e-9);
    }

    // ── TfBuffer ────────────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfBuffer::default();
        let t = tf.lookup_transform("world", "world", 1.0).unwrap();
        assert_eq!(t, Transform3D::identity());
    }

    #[test]
    fn lookup_interpolates_between_stamps() {
        let tf = TfBuffer::new(8);
        tf.set_transform("world", "radar", 1.0, translation(0.0, 0.0, 0.0));
        tf.set_transform("world", "radar", 2.0, translation(10.0, 0.0, 0.0));

        let t = tf.lookup_transform("world", "radar", 1.25).unwrap();
        assert!((t.translation.x - 2.5).abs() < 1e-9);
    }

    #[test]
    fn lookup_refuses_extrapolation() {
        let tf = TfBuffer::new(8);
        tf.set_transform("world", "radar", 1.0, translation(0.0, 0.0, 0.0));
        tf.set_transform("world", "radar", 2.0, translation(1.0, 0.0, 0.0));

        let err = tf.lookup_transform("world", "radar", 2.01).unwrap_err();
        assert!(matches!(err, TransformError::Extrapolation { .. }));
    }

    #[test]
    fn can_transform_honours_horizon() {
        let tf = TfBuffer::new(8);
        tf.set_transform("world", "radar", 1.0, translation(0.0, 0.0, 0.0));
        tf.set_transform("world", "radar", 2.0, translation(1.0, 0.0, 0.0));

        let horizon = Duration::from_millis(20);
        assert!(tf.can_transform("world", "radar", 2.01, horizon).is_ok());
        assert!(tf.can_transform("world", "radar", 2.5, horizon).is_err());
    }

    #[test]
    fn unknown_frame_has_no_path() {
        let tf = TfBuffer::new(8);
        tf.set_transform("world", "radar", 1.0, translation(0.0, 0.0, 0.0));
        let err = tf
            .can_transform("world", "ghost", 1.0, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, TransformError::NoPath { .. }));
    }

    #[test]
    fn chain_with_static_edge_and_inverse_walk() {
        let tf = TfBuffer::new(8);
        tf.set_transform("world", "novatel", 5.0, translation(100.0, 0.0, 0.0));
        tf.set_static_transform("novatel", "radar", translation(2.0, 0.0, 0.0));

        let world_radar = tf.lookup_transform("world", "radar", 5.0).unwrap();
        assert!((world_radar.translation.x - 102.0).abs() < 1e-9);

        // Walking the chain backwards yields the inverse.
        let radar_world = tf.lookup_transform("radar", "world", 5.0).unwrap();
        assert!((radar_world.translation.x + 102.0).abs() < 1e-9);
    }

    #[test]
    fn chain_respects_rotation() {
        // novatel is at the world origin, yawed 90°; radar is 1 m ahead of it.
        let tf = TfBuffer::new(8);
        tf.set_static_transform(
            "world",
            "novatel",
            Transform3D::new(Vec3::zero(), Quaternion::from_yaw(FRAC_PI_2)),
        );
        tf.set_static_transform("novatel", "radar", translation(1.0, 0.0, 0.0));

        let t = tf.lookup_transform("world", "radar", 0.0).unwrap();
        assert!(t.translation.x.abs() < 1e-9, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-9, "y={}", t.translation.y);
    }

    #[test]
    fn history_is_bounded_and_sorted() {
        let tf = TfBuffer::new(2);
        tf.set_transform("world", "radar", 3.0, translation(3.0, 0.0, 0.0));
        tf.set_transform("world", "radar", 1.0, translation(1.0, 0.0, 0.0));
        tf.set_transform("world", "radar", 2.0, translation(2.0, 0.0, 0.0));

        // Oldest stamp (1.0) was evicted after the out-of-order insert.
        assert!(tf.lookup_transform("world", "radar", 1.0).is_err());
        let t = tf.lookup_transform("world", "radar", 2.5).unwrap();
        assert!((t.translation.x - 2.5).abs() < 1e-9);
        assert_eq!(tf.frames(), vec!["radar".to_string(), "world".to_string()]);
    }
}
