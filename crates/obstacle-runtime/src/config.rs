//! Pipeline and node configuration.
//!
//! Every field carries a serde default so a partial TOML table (or none at
//! all) yields a usable configuration:
//!
//! ```toml
//! [motion]
//! buffer_capacity = 50
//!
//! [[radars]]
//! device_id = "radar_front"
//! detector = "ModestRadarDetector"
//! publish_event_ids = [1, 2]
//! ```

use obstacle_middleware::shared_data_key;
use obstacle_types::{EventId, PerceptionError, SensorKind};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

fn default_device_id() -> String {
    "radar_front".to_string()
}
fn default_world_frame() -> String {
    "world".to_string()
}
fn default_sensor_frame() -> String {
    "radar_front".to_string()
}
fn default_latency_offset() -> f64 {
    0.07
}
fn default_forward_distance() -> f64 {
    120.0
}
fn default_tf_horizon_ms() -> u64 {
    10
}
fn default_delay_frames() -> u64 {
    4
}
fn default_true() -> bool {
    true
}
fn default_detector() -> String {
    "ModestRadarDetector".to_string()
}
fn default_event_ids() -> Vec<EventId> {
    vec![EventId(1)]
}
fn default_retention() -> f64 {
    10.0
}
fn default_motion_stream() -> String {
    "localization".to_string()
}
fn default_motion_capacity() -> usize {
    50
}
fn default_motion_tolerance() -> f64 {
    0.1
}

// ─────────────────────────────────────────────────────────────────────────────
// PipelineConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for one radar device's pipeline.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub sensor_kind: SensorKind,
    #[serde(default = "default_world_frame")]
    pub world_frame: String,
    #[serde(default = "default_sensor_frame")]
    pub sensor_frame: String,
    /// Subtracted from every capture timestamp (s).
    #[serde(default = "default_latency_offset")]
    pub latency_offset_s: f64,
    #[serde(default = "default_forward_distance")]
    pub region_forward_distance_m: f64,
    #[serde(default)]
    pub enable_region_context: bool,
    #[serde(default = "default_tf_horizon_ms")]
    pub tf_buffer_horizon_ms: u64,
    #[serde(default = "default_delay_frames")]
    pub delay_frames: u64,
    #[serde(default = "default_true")]
    pub use_fp_filter: bool,
    #[serde(default = "default_detector")]
    pub detector: String,
    #[serde(default = "default_event_ids")]
    pub publish_event_ids: Vec<EventId>,
    /// Stored results older than this (s) are evicted; `0` keeps everything.
    #[serde(default = "default_retention")]
    pub shared_data_retention_s: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            sensor_kind: SensorKind::default(),
            world_frame: default_world_frame(),
            sensor_frame: default_sensor_frame(),
            latency_offset_s: default_latency_offset(),
            region_forward_distance_m: default_forward_distance(),
            enable_region_context: false,
            tf_buffer_horizon_ms: default_tf_horizon_ms(),
            delay_frames: default_delay_frames(),
            use_fp_filter: true,
            detector: default_detector(),
            publish_event_ids: default_event_ids(),
            shared_data_retention_s: default_retention(),
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("device_id", &self.device_id)
            .field("sensor", &format_args!("{} ({} -> {})", self.sensor_kind, self.sensor_frame, self.world_frame))
            .field("detector", &self.detector)
            .field("latency_offset_s", &self.latency_offset_s)
            .field("delay_frames", &self.delay_frames)
            .field("use_fp_filter", &self.use_fp_filter)
            .field("region", &self.enable_region_context.then_some(self.region_forward_distance_m))
            .field("tf_buffer_horizon_ms", &self.tf_buffer_horizon_ms)
            .field("publish_event_ids", &self.publish_event_ids)
            .finish()
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PerceptionError> {
        let fail = |msg: String| Err(PerceptionError::Config(format!("[{}] {msg}", self.device_id)));
        if self.device_id.trim().is_empty() {
            return Err(PerceptionError::Config("device_id must not be empty".into()));
        }
        if let Err(e) = shared_data_key(1.0, &self.device_id) {
            return fail(format!("device_id cannot key shared data: {e}"));
        }
        if self.world_frame.is_empty() || self.sensor_frame.is_empty() {
            return fail("frame ids must not be empty".into());
        }
        if !self.latency_offset_s.is_finite() || self.latency_offset_s < 0.0 {
            return fail(format!("latency_offset_s must be >= 0, got {}", self.latency_offset_s));
        }
        if !self.region_forward_distance_m.is_finite() || self.region_forward_distance_m <= 0.0 {
            return fail(format!(
                "region_forward_distance_m must be > 0, got {}",
                self.region_forward_distance_m
            ));
        }
        if self.delay_frames == 0 {
            return fail("delay_frames must be at least 1".into());
        }
        if self.detector.trim().is_empty() {
            return fail("detector name must not be empty".into());
        }
        if !self.shared_data_retention_s.is_finite() || self.shared_data_retention_s < 0.0 {
            return fail("shared_data_retention_s must be >= 0".into());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Motion + node
// ─────────────────────────────────────────────────────────────────────────────

/// Ego-motion stream settings, shared by every radar pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotionConfig {
    #[serde(default = "default_motion_stream")]
    pub stream: String,
    #[serde(default = "default_motion_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_motion_tolerance")]
    pub tolerance_s: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            stream: default_motion_stream(),
            buffer_capacity: default_motion_capacity(),
            tolerance_s: default_motion_tolerance(),
        }
    }
}

/// Everything a [`PerceptionNode`][crate::node::PerceptionNode] needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default = "default_radars")]
    pub radars: Vec<PipelineConfig>,
}

fn default_radars() -> Vec<PipelineConfig> {
    vec![PipelineConfig::default()]
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            motion: MotionConfig::default(),
            radars: default_radars(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), PerceptionError> {
        if self.motion.buffer_capacity == 0 {
            return Err(PerceptionError::Config("motion.buffer_capacity must be at least 1".into()));
        }
        if !self.motion.tolerance_s.is_finite() || self.motion.tolerance_s < 0.0 {
            return Err(PerceptionError::Config("motion.tolerance_s must be >= 0".into()));
        }
        if self.radars.is_empty() {
            return Err(PerceptionError::Config("at least one radar must be configured".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for radar in &self.radars {
            radar.validate()?;
            if !seen.insert(radar.device_id.as_str()) {
                return Err(PerceptionError::Config(format!(
                    "duplicate device_id {}",
                    radar.device_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        let radar = &config.radars[0];
        assert_eq!(radar.latency_offset_s, 0.07);
        assert_eq!(radar.delay_frames, 4);
        assert!(radar.use_fp_filter);
        assert!(!radar.enable_region_context);
        assert_eq!(radar.region_forward_distance_m, 120.0);
        assert_eq!(radar.tf_buffer_horizon_ms, 10);
        assert_eq!(config.motion.buffer_capacity, 50);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let radar: PipelineConfig =
            serde_json::from_str(r#"{"device_id": "radar_rear", "delay_frames": 2}"#).unwrap();
        assert_eq!(radar.device_id, "radar_rear");
        assert_eq!(radar.delay_frames, 2);
        assert_eq!(radar.detector, "ModestRadarDetector");
        assert_eq!(radar.publish_event_ids, vec![EventId(1)]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut radar = PipelineConfig {
            delay_frames: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(radar.validate(), Err(PerceptionError::Config(_))));
        radar.delay_frames = 4;
        radar.latency_offset_s = f64::NAN;
        assert!(radar.validate().is_err());
        radar.latency_offset_s = 0.07;
        radar.device_id = " ".into();
        assert!(radar.validate().is_err());
    }

    #[test]
    fn device_id_must_be_usable_as_key() {
        for bad in ["radar front", "radar\tfront", "radar\u{7}"] {
            let radar = PipelineConfig {
                device_id: bad.into(),
                ..PipelineConfig::default()
            };
            let err = radar.validate().unwrap_err();
            assert!(err.to_string().contains("cannot key shared data"), "{bad:?}: {err}");
        }
        let node = NodeConfig {
            radars: vec![PipelineConfig {
                device_id: "radar front".into(),
                ..PipelineConfig::default()
            }],
            ..NodeConfig::default()
        };
        assert!(node.validate().is_err());
    }

    #[test]
    fn duplicate_devices_are_rejected() {
        let config = NodeConfig {
            motion: MotionConfig::default(),
            radars: vec![PipelineConfig::default(), PipelineConfig::default()],
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn debug_view_is_compact() {
        let s = format!("{:?}", PipelineConfig::default());
        assert!(s.contains("radar_front"));
        assert!(s.contains("ModestRadarDetector"));
        assert!(!s.contains("shared_data_retention_s"));
    }
}
