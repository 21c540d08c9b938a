//! Pluggable radar detectors and the name-based [`DetectorRegistry`].
//!
//! Every detector implements the fixed [`RadarDetector`] contract
//! (`name` / `init` / `detect`).  Concrete variants are registered under a
//! name at startup and selected by configuration string; nothing is loaded
//! dynamically.
//!
//! Built-in variants:
//!
//! | Name | Behaviour |
//! |---|---|
//! | [`DummyRadarDetector::NAME`] | Passes raw returns through untouched (sensor frame, no velocity compensation). |
//! | [`ModestRadarDetector::NAME`] | World-frame positions, ego-compensated velocity, coarse motion class, region filtering. |

use std::collections::HashMap;

use obstacle_types::{DetectedObject, ObjectType, Observation, PerceptionError, Vec3};
use thiserror::Error;
use tracing::debug;

use crate::region::{Point2, RegionContext};
use crate::transform::Transform3D;

/// Per-frame inputs handed to a detector alongside the observation.
///
/// Both fields must be present before a detector may run; the
/// [`DetectionInvoker`][crate::invoker::DetectionInvoker] enforces this.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectorOptions {
    pub sensor2world_pose: Option<Transform3D>,
    /// Ego vehicle linear velocity in the world frame (m/s).
    pub car_linear_speed: Option<Vec3>,
}

/// Failure reported by a detector for one frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("detector not initialised")]
    NotInitialised,

    #[error("{0}")]
    Internal(String),
}

/// The fixed detector contract.
pub trait RadarDetector: Send {
    /// Registry name of this variant.
    fn name(&self) -> &str;

    /// One-time initialisation.  Returns `false` when the detector cannot run.
    fn init(&mut self) -> bool;

    /// Turn one observation into detected objects.
    ///
    /// `options` is guaranteed to carry both the pose and the ego velocity.
    fn detect(
        &mut self,
        observation: &Observation,
        context: &RegionContext,
        options: &DetectorOptions,
    ) -> Result<Vec<DetectedObject>, DetectorError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Dummy detector
// ────────────────────────────────────────────────────────────────────────────

/// Pass-through detector, mostly useful for wiring tests.
#[derive(Debug, Default)]
pub struct DummyRadarDetector;

impl DummyRadarDetector {
    pub const NAME: &'static str = "DummyRadarDetector";
}

impl RadarDetector for DummyRadarDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self) -> bool {
        true
    }

    fn detect(
        &mut self,
        observation: &Observation,
        _context: &RegionContext,
        _options: &DetectorOptions,
    ) -> Result<Vec<DetectedObject>, DetectorError> {
        Ok(observation
            .detections
            .iter()
            .map(|raw| DetectedObject {
                raw_id: raw.id,
                track_id: None,
                position: raw.position,
                velocity: Vec3::zero(),
                object_type: ObjectType::Unknown,
                confidence: raw.confidence.unwrap_or(1.0),
            })
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Modest detector
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for [`ModestRadarDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModestParams {
    /// World-frame speed above which an object is classed as movable (m/s).
    pub movable_speed_threshold: f64,
    /// Returns with a lower existence probability are discarded.
    pub min_confidence: f32,
}

impl Default for ModestParams {
    fn default() -> Self {
        Self {
            movable_speed_threshold: 1.0,
            min_confidence: 0.0,
        }
    }
}

/// Converts raw radar returns into world-frame objects.
///
/// * position: `pose · p_sensor`
/// * velocity: radial velocity projected on the line of sight, rotated into
///   the world frame, plus the ego velocity
/// * objects outside every region polygon are dropped when the region context
///   is non-empty
#[derive(Debug, Default)]
pub struct ModestRadarDetector {
    params: ModestParams,
    initialised: bool,
}

impl ModestRadarDetector {
    pub const NAME: &'static str = "ModestRadarDetector";

    pub fn with_params(params: ModestParams) -> Self {
        Self {
            params,
            initialised: false,
        }
    }

    fn classify(&self, has_velocity: bool, world_velocity: Vec3) -> ObjectType {
        if !has_velocity {
            ObjectType::Unknown
        } else if world_velocity.norm() > self.params.movable_speed_threshold {
            ObjectType::UnknownMovable
        } else {
            ObjectType::UnknownUnmovable
        }
    }
}

impl RadarDetector for ModestRadarDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self) -> bool {
        self.initialised = self.params.movable_speed_threshold.is_finite()
            && self.params.movable_speed_threshold >= 0.0;
        self.initialised
    }

    fn detect(
        &mut self,
        observation: &Observation,
        context: &RegionContext,
        options: &DetectorOptions,
    ) -> Result<Vec<DetectedObject>, DetectorError> {
        if !self.initialised {
            return Err(DetectorError::NotInitialised);
        }
        let (Some(pose), Some(ego_velocity)) = (options.sensor2world_pose, options.car_linear_speed)
        else {
            return Err(DetectorError::InvalidInput("missing pose or ego velocity".into()));
        };

        let mut objects = Vec::with_capacity(observation.detections.len());
        for raw in &observation.detections {
            if !raw.position.is_finite() {
                return Err(DetectorError::InvalidInput(format!(
                    "raw detection {} has a non-finite position",
                    raw.id
                )));
            }
            let confidence = raw.confidence.unwrap_or(1.0);
            if confidence < self.params.min_confidence {
                continue;
            }

            let position = pose.transform_point(raw.position);
            if !context.is_empty() && !context.contains(Point2::new(position.x, position.y)) {
                continue;
            }

            let relative = match (raw.radial_velocity, raw.position.normalized()) {
                (Some(radial), Some(line_of_sight)) => Some(line_of_sight.scale(radial)),
                _ => None,
            };
            let velocity = relative
                .map(|v| pose.transform_vector(v).add(ego_velocity))
                .unwrap_or(ego_velocity);

            objects.push(DetectedObject {
                raw_id: raw.id,
                track_id: None,
                position,
                velocity,
                object_type: self.classify(relative.is_some(), velocity),
                confidence,
            });
        }

        debug!(
            raw = observation.detections.len(),
            kept = objects.len(),
            "modest radar detector finished"
        );
        Ok(objects)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

/// Constructor stored in the registry.
pub type DetectorFactory = fn() -> Box<dyn RadarDetector>;

/// Name → constructor table for detector variants.
///
/// ```rust
/// use obstacle_perception::detector::{DetectorRegistry, ModestRadarDetector};
///
/// let registry = DetectorRegistry::with_builtins();
/// let detector = registry.create(ModestRadarDetector::NAME).unwrap();
/// assert_eq!(detector.name(), "ModestRadarDetector");
/// assert!(registry.create("NoSuchDetector").is_err());
/// ```
#[derive(Default)]
pub struct DetectorRegistry {
    factories: HashMap<String, DetectorFactory>,
}

impl DetectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in variant registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DummyRadarDetector::NAME, || Box::new(DummyRadarDetector));
        registry.register(ModestRadarDetector::NAME, || {
            Box::new(ModestRadarDetector::default())
        });
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, factory: DetectorFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Instantiate the variant registered under `name` (not yet initialised).
    ///
    /// # Errors
    ///
    /// Returns [`PerceptionError::UnknownDetector`] for unregistered names.
    pub fn create(&self, name: &str) -> Result<Box<dyn RadarDetector>, PerceptionError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| PerceptionError::UnknownDetector(name.to_string()))
    }

    /// Sorted list of registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Polygon;
    use crate::transform::Quaternion;
    use obstacle_types::RawDetection;
    use std::f64::consts::FRAC_PI_2;

    fn raw(id: u32, x: f64, y: f64, radial: Option<f64>) -> RawDetection {
        RawDetection {
            id,
            position: Vec3::new(x, y, 0.0),
            radial_velocity: radial,
            confidence: None,
        }
    }

    fn options(pose: Transform3D, ego: Vec3) -> DetectorOptions {
        DetectorOptions {
            sensor2world_pose: Some(pose),
            car_linear_speed: Some(ego),
        }
    }

    fn ready_modest() -> ModestRadarDetector {
        let mut det = ModestRadarDetector::default();
        assert!(det.init());
        det
    }

    #[test]
    fn registry_knows_builtins() {
        let registry = DetectorRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["DummyRadarDetector".to_string(), "ModestRadarDetector".to_string()]
        );
        assert!(matches!(
            registry.create("Bogus"),
            Err(PerceptionError::UnknownDetector(_))
        ));
    }

    #[test]
    fn dummy_passes_through() {
        let mut det = DummyRadarDetector;
        let obs = Observation {
            timestamp: 1.0,
            detections: vec![raw(4, 1.0, 2.0, None)],
        };
        let out = det
            .detect(&obs, &RegionContext::empty(), &DetectorOptions::default())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw_id, 4);
        assert_eq!(out[0].position, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn modest_requires_init() {
        let mut det = ModestRadarDetector::default();
        let obs = Observation { timestamp: 1.0, detections: vec![] };
        let err = det
            .detect(&obs, &RegionContext::empty(), &options(Transform3D::identity(), Vec3::zero()))
            .unwrap_err();
        assert_eq!(err, DetectorError::NotInitialised);
    }

    #[test]
    fn modest_transforms_into_world_frame() {
        let mut det = ready_modest();
        // Sensor at (100, 50), yawed 90°: sensor +X is world +Y.
        let pose = Transform3D::new(Vec3::new(100.0, 50.0, 0.0), Quaternion::from_yaw(FRAC_PI_2));
        let obs = Observation {
            timestamp: 1.0,
            detections: vec![raw(1, 10.0, 0.0, Some(-2.0))],
        };
        let out = det
            .detect(&obs, &RegionContext::empty(), &options(pose, Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0].position.x - 100.0).abs() < 1e-9);
        assert!((out[0].position.y - 60.0).abs() < 1e-9);
        // Closing at 2 m/s while the ego drives at 2 m/s along +Y: stationary.
        assert!(out[0].velocity.norm() < 1e-9);
        assert_eq!(out[0].object_type, ObjectType::UnknownUnmovable);
    }

    #[test]
    fn modest_classifies_movers_and_unknowns() {
        let mut det = ready_modest();
        let obs = Observation {
            timestamp: 1.0,
            detections: vec![raw(1, 10.0, 0.0, Some(5.0)), raw(2, 10.0, 0.0, None)],
        };
        let out = det
            .detect(&obs, &RegionContext::empty(), &options(Transform3D::identity(), Vec3::zero()))
            .unwrap();
        assert_eq!(out[0].object_type, ObjectType::UnknownMovable);
        assert_eq!(out[1].object_type, ObjectType::Unknown);
    }

    #[test]
    fn modest_drops_returns_outside_region() {
        let mut det = ready_modest();
        let ctx = RegionContext {
            polygons: vec![Polygon::new(vec![
                Point2::new(0.0, -5.0),
                Point2::new(50.0, -5.0),
                Point2::new(50.0, 5.0),
                Point2::new(0.0, 5.0),
            ])],
        };
        let obs = Observation {
            timestamp: 1.0,
            detections: vec![raw(1, 10.0, 0.0, None), raw(2, 10.0, 20.0, None)],
        };
        let out = det
            .detect(&obs, &ctx, &options(Transform3D::identity(), Vec3::zero()))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw_id, 1);
    }

    #[test]
    fn modest_rejects_non_finite_input() {
        let mut det = ready_modest();
        let obs = Observation {
            timestamp: 1.0,
            detections: vec![raw(9, f64::NAN, 0.0, None)],
        };
        let err = det
            .detect(&obs, &RegionContext::empty(), &options(Transform3D::identity(), Vec3::zero()))
            .unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));
    }
}
