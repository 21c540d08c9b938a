//! Node configuration file – reads/writes `~/.obstacle/config.toml` (or the
//! path given with `--config`).

use obstacle_perception::region::Polygon;
use obstacle_perception::transform::{Quaternion, Transform3D};
use obstacle_runtime::{MotionConfig, NodeConfig, PipelineConfig};
use obstacle_types::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A sensor extrinsic valid at every instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTransform {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default)]
    pub yaw_rad: f64,
}

impl StaticTransform {
    pub fn transform(&self) -> Transform3D {
        let [x, y, z] = self.translation;
        Transform3D::new(Vec3::new(x, y, z), Quaternion::from_yaw(self.yaw_rad))
    }
}

/// Region polygons served by the in-process map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub polygons: Vec<Polygon>,
}

/// Everything in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub motion: MotionConfig,

    #[serde(default = "default_radars")]
    pub radars: Vec<PipelineConfig>,

    #[serde(default)]
    pub map: MapConfig,

    /// Extrinsics registered before replay starts.
    #[serde(default = "default_transforms")]
    pub transforms: Vec<StaticTransform>,
}

fn default_radars() -> Vec<PipelineConfig> {
    vec![PipelineConfig::default()]
}

fn default_transforms() -> Vec<StaticTransform> {
    vec![StaticTransform {
        parent: "world".to_string(),
        child: "radar_front".to_string(),
        translation: [3.9, 0.0, 0.5],
        yaw_rad: 0.0,
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            motion: MotionConfig::default(),
            radars: default_radars(),
            map: MapConfig::default(),
            transforms: default_transforms(),
        }
    }
}

impl Config {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            motion: self.motion.clone(),
            radars: self.radars.clone(),
        }
    }
}

/// Return the path to `~/.obstacle/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".obstacle").join("config.toml")
}

/// Load the config from `path` and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load(path: &Path) -> Result<Option<Config>, String> {
    let mut cfg = load_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse the file at `path` as-is.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `OBSTACLE_*` environment variable overrides to every radar in `cfg`.
///
/// | Variable | Field |
/// |---|---|
/// | `OBSTACLE_DETECTOR` | `radars[*].detector` |
/// | `OBSTACLE_LATENCY_OFFSET` | `radars[*].latency_offset_s` |
/// | `OBSTACLE_DELAY_FRAMES` | `radars[*].delay_frames` |
/// | `OBSTACLE_FP_FILTER` | `radars[*].use_fp_filter` |
/// | `OBSTACLE_MOTION_CAPACITY` | `motion.buffer_capacity` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("OBSTACLE_DETECTOR")
        && !v.trim().is_empty()
    {
        for radar in &mut cfg.radars {
            radar.detector = v.trim().to_string();
        }
    }
    if let Ok(v) = std::env::var("OBSTACLE_LATENCY_OFFSET")
        && let Ok(offset) = v.parse::<f64>()
        && offset.is_finite()
    {
        for radar in &mut cfg.radars {
            radar.latency_offset_s = offset;
        }
    }
    if let Ok(v) = std::env::var("OBSTACLE_DELAY_FRAMES")
        && let Ok(frames) = v.parse::<u64>()
    {
        for radar in &mut cfg.radars {
            radar.delay_frames = frames;
        }
    }
    if let Ok(v) = std::env::var("OBSTACLE_FP_FILTER")
        && let Ok(enabled) = v.parse::<bool>()
    {
        for radar in &mut cfg.radars {
            radar.use_fp_filter = enabled;
        }
    }
    if let Ok(v) = std::env::var("OBSTACLE_MOTION_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
    {
        cfg.motion.buffer_capacity = capacity;
    }
}

/// Write `cfg` to `path`, creating parent directories.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use obstacle_types::EventId;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.radars.len(), 1);
        assert_eq!(loaded.radars[0].detector, "ModestRadarDetector");
        assert_eq!(loaded.motion.buffer_capacity, 50);
        assert_eq!(loaded.transforms[0].child, "radar_front");
        loaded.node_config().validate().expect("valid");
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("node.toml");
        std::fs::write(
            &path,
            r#"
[[radars]]
device_id = "radar_rear"
sensor_frame = "radar_rear"
publish_event_ids = [3, 4]
enable_region_context = true

[[map.polygons]]
points = [{ x = 0.0, y = -5.0 }, { x = 100.0, y = -5.0 }, { x = 100.0, y = 5.0 }]
"#,
        )
        .expect("write");

        let cfg = load_from(&path).expect("parse").expect("some");
        let radar = &cfg.radars[0];
        assert_eq!(radar.device_id, "radar_rear");
        assert_eq!(radar.publish_event_ids, vec![EventId(3), EventId(4)]);
        assert_eq!(radar.latency_offset_s, 0.07);
        assert_eq!(cfg.map.polygons.len(), 1);
        assert_eq!(cfg.map.polygons[0].points.len(), 3);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "radars = 12").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_obstacle_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".obstacle"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn static_transform_builds_pose() {
        let st = StaticTransform {
            parent: "world".into(),
            child: "radar_front".into(),
            translation: [1.0, 2.0, 3.0],
            yaw_rad: 0.0,
        };
        let tf = st.transform();
        assert_eq!(tf.translation, Vec3::new(1.0, 2.0, 3.0));
    }

    // Environment overrides share process state, so they run in one test.
    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        // SAFETY: only this test touches OBSTACLE_* variables.
        unsafe {
            std::env::set_var("OBSTACLE_DETECTOR", "DummyRadarDetector");
            std::env::set_var("OBSTACLE_DELAY_FRAMES", "6");
            std::env::set_var("OBSTACLE_FP_FILTER", "false");
            std::env::set_var("OBSTACLE_LATENCY_OFFSET", "not-a-number");
            std::env::set_var("OBSTACLE_MOTION_CAPACITY", "80");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            for var in [
                "OBSTACLE_DETECTOR",
                "OBSTACLE_DELAY_FRAMES",
                "OBSTACLE_FP_FILTER",
                "OBSTACLE_LATENCY_OFFSET",
                "OBSTACLE_MOTION_CAPACITY",
            ] {
                std::env::remove_var(var);
            }
        }

        let radar = &cfg.radars[0];
        assert_eq!(radar.detector, "DummyRadarDetector");
        assert_eq!(radar.delay_frames, 6);
        assert!(!radar.use_fp_filter);
        assert_eq!(radar.latency_offset_s, 0.07);
        assert_eq!(cfg.motion.buffer_capacity, 80);
    }
}
