//! [`FrameResolver`] – sensor-to-world pose at a query instant.
//!
//! Wraps a [`TransformService`] with the two-step check the pipeline needs:
//! first ask whether the frames can be bridged within the buffering horizon,
//! then perform the concrete lookup.  The two failure classes are kept apart
//! because downstream consumers distinguish "no data yet" from "data exists
//! but cannot be sampled at this instant".
//!
//! Transforms are never cached; each call goes to the service.

use std::sync::Arc;
use std::time::Duration;

use obstacle_types::{PerceptionError, Timestamp};
use tracing::{debug, error};

use crate::transform::{Transform3D, TransformService};

/// Default buffering horizon for [`TransformService::can_transform`].
pub const DEFAULT_HORIZON: Duration = Duration::from_millis(10);

/// Resolves sensor poses against a shared [`TransformService`].
#[derive(Clone)]
pub struct FrameResolver {
    service: Arc<dyn TransformService>,
    horizon: Duration,
}

impl FrameResolver {
    pub fn new(service: Arc<dyn TransformService>, horizon: Duration) -> Self {
        Self { service, horizon }
    }

    /// Build a resolver with the horizon given in milliseconds, as configured.
    pub fn with_horizon_ms(service: Arc<dyn TransformService>, horizon_ms: u64) -> Self {
        Self::new(service, Duration::from_millis(horizon_ms))
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Resolve T_target_source at `query_time`.
    ///
    /// # Errors
    ///
    /// * [`PerceptionError::TransformUnavailable`] – the service cannot bridge
    ///   the frames within the horizon.
    /// * [`PerceptionError::TransformLookup`] – the bridge exists but the
    ///   lookup at `query_time` failed.
    pub fn resolve(
        &self,
        target_frame: &str,
        source_frame: &str,
        query_time: Timestamp,
    ) -> Result<Transform3D, PerceptionError> {
        if let Err(e) = self
            .service
            .can_transform(target_frame, source_frame, query_time, self.horizon)
        {
            error!(
                target_frame,
                source_frame,
                query_time,
                error = %e,
                "cannot transform frame"
            );
            return Err(PerceptionError::TransformUnavailable {
                target_frame: target_frame.to_string(),
                source_frame: source_frame.to_string(),
                details: e.to_string(),
            });
        }

        let transform = self
            .service
            .lookup_transform(target_frame, source_frame, query_time)
            .map_err(|e| {
                error!(target_frame, source_frame, query_time, error = %e, "transform lookup failed");
                PerceptionError::TransformLookup {
                    target_frame: target_frame.to_string(),
                    source_frame: source_frame.to_string(),
                    details: e.to_string(),
                }
            })?;

        debug!(
            target_frame,
            source_frame,
            x = transform.translation.x,
            y = transform.translation.y,
            z = transform.translation.z,
            "resolved sensor pose"
        );
        Ok(transform)
    }
}
