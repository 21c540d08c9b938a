//! `obstacle-types` – shared data model for the radar obstacle pipeline.
//!
//! Everything that crosses a crate boundary lives here: raw sensor
//! observations, motion fixes, detector output, the published [`ResultSet`],
//! dataflow [`Event`]s and the crate-spanning [`PerceptionError`].

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Seconds since the Unix epoch, as reported by the sensor clock.
pub type Timestamp = f64;

// ────────────────────────────────────────────────────────────────────────────
// Geometry primitives
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (metres or metres/second depending on context).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        (n > f64::EPSILON).then(|| self.scale(1.0 / n))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Row-major 4×4 homogeneous pose matrix (sensor frame → world frame).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PoseMatrix(pub [[f64; 4]; 4]);

impl PoseMatrix {
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self(m)
    }

    /// Translation column of the matrix.
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.0[0][3], self.0[1][3], self.0[2][3])
    }
}

impl Default for PoseMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor input
// ────────────────────────────────────────────────────────────────────────────

/// Kind of sensor that produced a [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    #[default]
    Radar,
    Lidar,
    Camera,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Radar => write!(f, "radar"),
            SensorKind::Lidar => write!(f, "lidar"),
            SensorKind::Camera => write!(f, "camera"),
        }
    }
}

/// One raw return reported by the sensor, expressed in the sensor frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Sensor-local identifier; only meaningful within a short time span.
    pub id: u32,
    pub position: Vec3,
    /// Relative velocity along the line of sight (m/s), if measured.
    #[serde(default)]
    pub radial_velocity: Option<f64>,
    /// Existence probability reported by the sensor, if any.
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// A timestamped batch of raw detections from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

/// A timestamped vehicle motion fix from the localization stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub timestamp: Timestamp,
    pub position: Vec3,
    pub linear_velocity: Vec3,
}

// ────────────────────────────────────────────────────────────────────────────
// Detector output
// ────────────────────────────────────────────────────────────────────────────

/// Coarse classification attached by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    #[default]
    Unknown,
    UnknownMovable,
    UnknownUnmovable,
}

/// Detector output for one raw detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedObject {
    /// Identifier copied from the originating [`RawDetection`].
    pub raw_id: u32,
    /// Cross-frame identity; `None` until the identity tracker assigns it.
    pub track_id: Option<u64>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub object_type: ObjectType,
    pub confidence: f32,
}

/// Outcome tag carried by every published [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    Ok,
    /// The sensor pose could not be resolved.
    TransformError,
    /// Motion estimate or detector failure.
    ProcessError,
}

/// The artifact published once per valid observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResultSet {
    /// Latency-corrected capture time.
    pub timestamp: Timestamp,
    pub sensor_kind: SensorKind,
    pub sensor2world_pose: PoseMatrix,
    pub objects: Vec<DetectedObject>,
    pub error_code: ErrorCode,
}

impl ResultSet {
    /// A successful, still empty result at `timestamp`.
    pub fn new(timestamp: Timestamp, sensor_kind: SensorKind, pose: PoseMatrix) -> Self {
        Self {
            timestamp,
            sensor_kind,
            sensor2world_pose: pose,
            objects: Vec::new(),
            error_code: ErrorCode::Ok,
        }
    }

    /// An empty result tagged with `error_code`; still published so listeners
    /// observe a heartbeat.
    pub fn failed(timestamp: Timestamp, sensor_kind: SensorKind, error_code: ErrorCode) -> Self {
        Self {
            error_code,
            ..Self::new(timestamp, sensor_kind, PoseMatrix::identity())
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == ErrorCode::Ok
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dataflow events
// ────────────────────────────────────────────────────────────────────────────

/// Numeric identifier of a downstream event lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification emitted after a [`ResultSet`] has been stored.
///
/// Listeners rebuild the shared-data key from `timestamp` and `reserve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_id: EventId,
    pub timestamp: Timestamp,
    /// Opaque field; carries the producing device id.
    pub reserve: String,
    pub emitted_at: DateTime<Utc>,
}

impl Event {
    pub fn new(event_id: EventId, timestamp: Timestamp, reserve: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            timestamp,
            reserve: reserve.into(),
            emitted_at: Utc::now(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type spanning every failure class of the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PerceptionError {
    #[error("Invalid timestamp {timestamp}: {reason}")]
    InvalidTimestamp { timestamp: Timestamp, reason: String },

    #[error("Transform {source_frame} -> {target_frame} unavailable: {details}")]
    TransformUnavailable {
        target_frame: String,
        source_frame: String,
        details: String,
    },

    #[error("Transform lookup {source_frame} -> {target_frame} failed: {details}")]
    TransformLookup {
        target_frame: String,
        source_frame: String,
        details: String,
    },

    #[error("Motion estimate unavailable: {0}")]
    MotionUnavailable(String),

    #[error("Detector failure: {0}")]
    DetectorFailure(String),

    #[error("Unknown detector '{0}'")]
    UnknownDetector(String),

    #[error("Detector '{0}' failed to initialise")]
    DetectorInit(String),

    #[error("Shared data key error: {0}")]
    KeyDerivation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl PerceptionError {
    /// The code a published [`ResultSet`] carries for this failure, or `None`
    /// for failures that never publish.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::TransformUnavailable { .. } | Self::TransformLookup { .. } => {
                Some(ErrorCode::TransformError)
            }
            Self::MotionUnavailable(_) | Self::DetectorFailure(_) => Some(ErrorCode::ProcessError),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_normalized_handles_zero() {
        assert!(Vec3::zero().normalized().is_none());
        let n = Vec3::new(3.0, 4.0, 0.0).normalized().unwrap();
        assert!((n.x - 0.6).abs() < 1e-12);
        assert!((n.y - 0.8).abs() < 1e-12);
    }

    #[test]
    fn pose_identity_has_zero_translation() {
        let pose = PoseMatrix::identity();
        assert_eq!(pose.translation(), Vec3::zero());
        assert_eq!(pose.0[3][3], 1.0);
    }

    #[test]
    fn failed_result_is_empty_and_tagged() {
        let r = ResultSet::failed(12.5, SensorKind::Radar, ErrorCode::TransformError);
        assert!(r.objects.is_empty());
        assert_eq!(r.error_code, ErrorCode::TransformError);
        assert!(!r.is_ok());
    }

    #[test]
    fn error_codes_follow_failure_class() {
        let tf = PerceptionError::TransformLookup {
            target_frame: "world".into(),
            source_frame: "radar".into(),
            details: "extrapolation".into(),
        };
        assert_eq!(tf.error_code(), Some(ErrorCode::TransformError));
        assert_eq!(
            PerceptionError::MotionUnavailable("empty".into()).error_code(),
            Some(ErrorCode::ProcessError)
        );
        assert_eq!(
            PerceptionError::InvalidTimestamp { timestamp: 0.0, reason: "zero".into() }.error_code(),
            None
        );
        assert_eq!(PerceptionError::KeyDerivation("bad".into()).error_code(), None);
    }

    #[test]
    fn observation_deserializes_with_optional_fields() {
        let json = r#"{"timestamp": 100.07, "detections": [{"id": 7, "position": {"x": 1.0, "y": 2.0, "z": 0.0}}]}"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.detections.len(), 1);
        assert_eq!(obs.detections[0].radial_velocity, None);
        assert_eq!(obs.detections[0].confidence, None);
    }

    #[test]
    fn event_carries_device_in_reserve() {
        let event = Event::new(EventId(3), 42.0, "radar_front");
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.reserve, "radar_front");
        assert_eq!(back.event_id, EventId(3));
    }

    #[test]
    fn result_set_schema_names_every_field() {
        let schema = schemars::schema_for!(ResultSet);
        let json = serde_json::to_value(&schema).unwrap();
        let props = json["properties"].as_object().unwrap();
        for field in ["timestamp", "sensor_kind", "sensor2world_pose", "objects", "error_code"] {
            assert!(props.contains_key(field), "missing {field}");
        }
    }

    #[test]
    fn perception_error_display() {
        let err = PerceptionError::TransformUnavailable {
            target_frame: "world".into(),
            source_frame: "radar_front".into(),
            details: "no path".into(),
        };
        let s = err.to_string();
        assert!(s.contains("radar_front"));
        assert!(s.contains("unavailable"));
    }
}
