//! [`PipelineStage`] – per-observation orchestration for one radar device.
//!
//! Each observation walks
//!
//! ```text
//! Received → TimeCorrected → FrameResolved → ContextResolved
//!          → MotionResolved → Detected → IdentityStabilized → Published
//! ```
//!
//! An invalid timestamp drops the observation without publishing.  Transform,
//! motion and detector failures short-circuit to an empty [`ResultSet`]
//! tagged with the matching [`ErrorCode`], which is still published so
//! listeners see every frame.  A region-context failure only degrades the
//! frame.
//!
//! Results leave through the [`IdentityTracker`], which may hold frames back
//! for up to `delay_frames` while it confirms new objects; publication order
//! always follows arrival order.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use obstacle_middleware::ResultPublisher;
use obstacle_perception::{
    DetectionInvoker, DetectorOptions, DetectorRegistry, FrameResolver, IdentityConfig,
    IdentityTracker, MapService, RegionContextProvider, TemporalBuffer, TransformService,
};
use obstacle_types::{ErrorCode, MotionSample, Observation, PerceptionError, ResultSet, Timestamp, Vec3};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;

/// Corrected timestamps closer than this to zero are invalid (s).
pub const TIMESTAMP_EPSILON: f64 = 1e-5;

/// Motion buffer shared by the motion task and every radar stage.
pub type SharedMotionBuffer = Arc<Mutex<TemporalBuffer<MotionSample>>>;

/// What happened to one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Rejected before processing; nothing was published.
    Dropped(PerceptionError),
    /// Processed; `error_code` is what this frame's result carries.
    Processed {
        timestamp: Timestamp,
        error_code: ErrorCode,
        /// Results handed to the publisher by this call (may include earlier
        /// frames released by the tracker, or none if this one is held).
        published: usize,
    },
}

pub struct PipelineStage {
    config: PipelineConfig,
    resolver: FrameResolver,
    region: RegionContextProvider,
    motion: SharedMotionBuffer,
    invoker: DetectionInvoker,
    tracker: IdentityTracker,
    publisher: Arc<dyn ResultPublisher>,
    last_timestamp: Option<Timestamp>,
}

impl std::fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStage")
            .field("device_id", &self.config.device_id)
            .field("invoker", &self.invoker)
            .field("last_timestamp", &self.last_timestamp)
            .finish_non_exhaustive()
    }
}

impl PipelineStage {
    /// Wire a stage from its collaborators.
    pub fn new(
        config: PipelineConfig,
        resolver: FrameResolver,
        region: RegionContextProvider,
        motion: SharedMotionBuffer,
        invoker: DetectionInvoker,
        publisher: Arc<dyn ResultPublisher>,
    ) -> Self {
        let tracker = IdentityTracker::new(IdentityConfig {
            delay_frames: config.delay_frames,
            use_fp_filter: config.use_fp_filter,
        });
        Self {
            config,
            resolver,
            region,
            motion,
            invoker,
            tracker,
            publisher,
            last_timestamp: None,
        }
    }

    /// Build every collaborator from `config`.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or the detector cannot be
    /// created or initialised.
    pub fn from_config(
        config: PipelineConfig,
        transforms: Arc<dyn TransformService>,
        map: Option<Arc<dyn MapService>>,
        motion: SharedMotionBuffer,
        registry: &DetectorRegistry,
        publisher: Arc<dyn ResultPublisher>,
    ) -> Result<Self, PerceptionError> {
        config.validate()?;
        let resolver = FrameResolver::with_horizon_ms(transforms, config.tf_buffer_horizon_ms);
        let region = RegionContextProvider::new(map, config.enable_region_context);
        let invoker = DetectionInvoker::new(registry, &config.detector)?;
        info!(
            device_id = %config.device_id,
            detector = invoker.detector_name(),
            region_context = region.is_enabled(),
            "pipeline stage ready"
        );
        Ok(Self::new(config, resolver, region, motion, invoker, publisher))
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    /// Capture time minus the configured latency offset.
    pub fn correct_timestamp(&self, capture: Timestamp) -> Timestamp {
        capture - self.config.latency_offset_s
    }

    /// Run one observation end to end.
    pub fn process(&mut self, observation: Observation) -> FrameOutcome {
        let timestamp = self.correct_timestamp(observation.timestamp);
        log_frame_statistics(&self.config.device_id, "start", timestamp);

        if let Err(e) = self.check_timestamp(timestamp) {
            error!(device_id = %self.config.device_id, error = %e, "dropping observation");
            return FrameOutcome::Dropped(e);
        }
        self.last_timestamp = Some(timestamp);

        let result = self.run(timestamp, &observation).unwrap_or_else(|e| {
            let code = e.error_code().unwrap_or(ErrorCode::ProcessError);
            warn!(
                device_id = %self.config.device_id,
                timestamp,
                error = %e,
                ?code,
                "publishing empty result"
            );
            ResultSet::failed(timestamp, self.config.sensor_kind, code)
        });
        let error_code = result.error_code;

        let released = self.tracker.stabilize(result);
        let published = self.publish_all(released);

        log_frame_statistics(&self.config.device_id, "end", timestamp);
        FrameOutcome::Processed {
            timestamp,
            error_code,
            published,
        }
    }

    /// Publish every frame the tracker is still holding.  Returns how many
    /// were handed to the publisher.
    pub fn flush(&mut self) -> usize {
        let released = self.tracker.flush();
        self.publish_all(released)
    }

    fn check_timestamp(&self, timestamp: Timestamp) -> Result<(), PerceptionError> {
        if !timestamp.is_finite() || timestamp.abs() < TIMESTAMP_EPSILON {
            return Err(PerceptionError::InvalidTimestamp {
                timestamp,
                reason: "corrected timestamp is zero".into(),
            });
        }
        if let Some(last) = self.last_timestamp
            && timestamp < last
        {
            return Err(PerceptionError::InvalidTimestamp {
                timestamp,
                reason: format!("older than last accepted frame {last}"),
            });
        }
        Ok(())
    }

    fn run(&mut self, timestamp: Timestamp, observation: &Observation) -> Result<ResultSet, PerceptionError> {
        let pose = self
            .resolver
            .resolve(&self.config.world_frame, &self.config.sensor_frame, timestamp)?;

        let context = self
            .region
            .get_context(pose.translation, self.config.region_forward_distance_m);

        let options = DetectorOptions {
            sensor2world_pose: Some(pose),
            car_linear_speed: self.ego_velocity(timestamp),
        };
        let objects = self.invoker.detect(observation, &context, &options)?;

        let mut result = ResultSet::new(timestamp, self.config.sensor_kind, pose.to_matrix());
        result.objects = objects;
        debug!(
            device_id = %self.config.device_id,
            timestamp,
            objects = result.objects.len(),
            region_polygons = context.polygons.len(),
            "frame detected"
        );
        Ok(result)
    }

    /// Ego velocity nearest to `timestamp`; the lock covers only the scan.
    fn ego_velocity(&self, timestamp: Timestamp) -> Option<Vec3> {
        let buffer = self.motion.lock().unwrap_or_else(|e| e.into_inner());
        match buffer.nearest_before(timestamp) {
            Ok(sample) => Some(sample.value.linear_velocity),
            Err(e) => {
                warn!(device_id = %self.config.device_id, timestamp, error = %e, "no motion sample for frame");
                None
            }
        }
    }

    fn publish_all(&self, results: Vec<ResultSet>) -> usize {
        let mut published = 0;
        for result in results {
            let timestamp = result.timestamp;
            match self.publisher.publish(timestamp, &self.config.device_id, result) {
                Ok(receipt) => {
                    debug!(key = %receipt.key, events = receipt.events, "frame published");
                    published += 1;
                }
                Err(e) => {
                    error!(device_id = %self.config.device_id, timestamp, error = %e, "failed to publish result");
                }
            }
        }
        published
    }
}

fn log_frame_statistics(device_id: &str, phase: &str, timestamp: Timestamp) {
    let now = Utc::now();
    let wall = now.timestamp_micros() as f64 / 1e6;
    info!(
        device_id,
        phase,
        msg_time = timestamp,
        cur_time = wall,
        latency_ms = (wall - timestamp) * 1e3,
        "FRAME_STATISTICS"
    );
}
