//! [`DetectionInvoker`] – owns one configured detector and guards its inputs.

use obstacle_types::{DetectedObject, Observation, PerceptionError};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::detector::{DetectorError, DetectorOptions, DetectorRegistry, RadarDetector};
use crate::region::RegionContext;

/// Why an invocation did not produce objects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    #[error("ego motion unavailable for this frame")]
    MotionUnavailable,

    #[error("sensor pose unavailable for this frame")]
    PoseUnavailable,

    #[error("detector {name} failed: {source}")]
    Detector {
        name: String,
        #[source]
        source: DetectorError,
    },
}

impl From<InvokeError> for PerceptionError {
    fn from(e: InvokeError) -> Self {
        match e {
            InvokeError::MotionUnavailable => {
                PerceptionError::MotionUnavailable("no ego motion sample for frame".into())
            }
            other => PerceptionError::DetectorFailure(other.to_string()),
        }
    }
}

/// Runs the configured detector variant for one pipeline stream.
pub struct DetectionInvoker {
    detector: Box<dyn RadarDetector>,
}

impl std::fmt::Debug for DetectionInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionInvoker")
            .field("detector", &self.detector.name())
            .finish()
    }
}

impl DetectionInvoker {
    /// Instantiate and initialise the detector registered under `name`.
    ///
    /// # Errors
    ///
    /// * [`PerceptionError::UnknownDetector`] – `name` is not registered.
    /// * [`PerceptionError::DetectorInit`] – the detector's `init` returned
    ///   `false`.
    pub fn new(registry: &DetectorRegistry, name: &str) -> Result<Self, PerceptionError> {
        let detector = registry.create(name)?;
        Self::from_detector(detector)
    }

    /// Wrap an already-constructed detector, running its `init`.
    pub fn from_detector(mut detector: Box<dyn RadarDetector>) -> Result<Self, PerceptionError> {
        if !detector.init() {
            error!(detector = detector.name(), "detector init failed");
            return Err(PerceptionError::DetectorInit(detector.name().to_string()));
        }
        info!(detector = detector.name(), "detector initialised");
        Ok(Self { detector })
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Run the detector on one frame.
    ///
    /// The detector is not invoked unless both the ego velocity and the
    /// sensor pose are present in `options`.
    pub fn detect(
        &mut self,
        observation: &Observation,
        context: &RegionContext,
        options: &DetectorOptions,
    ) -> Result<Vec<DetectedObject>, InvokeError> {
        if options.car_linear_speed.is_none() {
            return Err(InvokeError::MotionUnavailable);
        }
        if options.sensor2world_pose.is_none() {
            return Err(InvokeError::PoseUnavailable);
        }
        let objects = self
            .detector
            .detect(observation, context, options)
            .map_err(|source| {
                error!(detector = self.detector.name(), error = %source, "detector failed");
                InvokeError::Detector {
                    name: self.detector.name().to_string(),
                    source,
                }
            })?;
        debug!(
            detector = self.detector.name(),
            timestamp = observation.timestamp,
            objects = objects.len(),
            "detection complete"
        );
        Ok(objects)
    }
}
