//! JSONL recording replay.
//!
//! One record per line, tagged by `kind`:
//!
//! ```text
//! {"kind":"motion","timestamp":10.0,"position":{"x":0,"y":0,"z":0},"linear_velocity":{"x":8,"y":0,"z":0}}
//! {"kind":"radar","device_id":"radar_front","observation":{"timestamp":10.07,"detections":[...]}}
//! {"kind":"transform","parent":"world","child":"radar_front","timestamp":10.0,"transform":{...}}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.  Malformed lines are
//! logged and skipped.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use obstacle_perception::{TfBuffer, Transform3D};
use obstacle_runtime::NodeHandle;
use obstacle_types::{MotionSample, Observation, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Longest pause inserted between two records, whatever the gap in the file.
const MAX_PAUSE_S: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Motion(MotionSample),
    Radar {
        device_id: String,
        observation: Observation,
    },
    Transform {
        parent: String,
        child: String,
        timestamp: Timestamp,
        transform: Transform3D,
    },
}

impl Record {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Record::Motion(sample) => sample.timestamp,
            Record::Radar { observation, .. } => observation.timestamp,
            Record::Transform { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub records: u64,
    pub skipped: u64,
    pub interrupted: bool,
}

/// Parse one line; `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Record>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Wall-clock pause before a record stamped `ts`, given the previous stamp.
///
/// `rate` scales recording time; `0` replays as fast as possible.
pub fn pacing(previous: Option<Timestamp>, ts: Timestamp, rate: f64) -> Option<Duration> {
    let previous = previous?;
    if rate <= 0.0 {
        return None;
    }
    let gap = (ts - previous) / rate;
    (gap > 0.0).then(|| Duration::from_secs_f64(gap.min(MAX_PAUSE_S)))
}

/// Feed every record of `path` into `handle`, applying transform records to
/// `transforms` directly.  Stops early once `shutdown` is set.
pub async fn replay(
    path: &Path,
    rate: f64,
    shutdown: &AtomicBool,
    handle: &NodeHandle,
    transforms: &TfBuffer,
) -> Result<ReplayStats, String> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| format!("Failed to open recording {}: {}", path.display(), e))?;
    let mut lines = BufReader::new(file).lines();
    let mut stats = ReplayStats::default();
    let mut previous: Option<Timestamp> = None;
    let mut line_no = 0u64;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("Failed to read recording: {}", e))?
    {
        line_no += 1;
        if shutdown.load(Ordering::SeqCst) {
            stats.interrupted = true;
            break;
        }
        let record = match parse_line(&line) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping malformed record");
                stats.skipped += 1;
                continue;
            }
        };

        let ts = record.timestamp();
        if let Some(pause) = pacing(previous, ts, rate) {
            tokio::time::sleep(pause).await;
        }
        previous = Some(previous.map_or(ts, |p| p.max(ts)));

        match record {
            Record::Motion(sample) => {
                handle.send_motion(sample).await.map_err(|e| e.to_string())?;
                // Let the motion task land the sample before the next frame.
                tokio::task::yield_now().await;
            }
            Record::Radar { device_id, observation } => {
                if let Err(e) = handle.send_observation(&device_id, observation).await {
                    warn!(line = line_no, %device_id, error = %e, "radar record not delivered");
                    stats.skipped += 1;
                    continue;
                }
            }
            Record::Transform {
                parent,
                child,
                timestamp,
                transform,
            } => {
                debug!(%parent, %child, timestamp, "transform record");
                transforms.set_transform(&parent, &child, timestamp, transform);
            }
        }
        stats.records += 1;
    }
    Ok(stats)
}
