//! [`PerceptionNode`] – one task per sensor stream.
//!
//! The motion stream feeds the shared [`TemporalBuffer`]; every radar device
//! gets its own task owning its [`PipelineStage`], so frames are serialized
//! within a device and processed concurrently across devices.  Closing a
//! stream's sender ends its task; radar tasks flush their identity tracker
//! on the way out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use obstacle_middleware::{EventBus, ResultPublisher, SharedDataPublisher, SharedDataStore};
use obstacle_perception::{DetectorRegistry, MapService, TemporalBuffer, TransformService};
use obstacle_types::{MotionSample, Observation, PerceptionError, ResultSet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{NodeConfig, PipelineConfig};
use crate::stage::{FrameOutcome, PipelineStage, SharedMotionBuffer};

/// Per-stream inbound channel depth.
const STREAM_CAPACITY: usize = 64;

/// Counters reported by a stream task when it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub stream: String,
    pub received: u64,
    pub processed: u64,
    pub dropped: u64,
    pub published: u64,
}

/// Drain `rx` into `buffer` until the sender side closes.
pub fn spawn_motion_stream(
    stream: String,
    buffer: SharedMotionBuffer,
    mut rx: mpsc::Receiver<MotionSample>,
) -> JoinHandle<StreamReport> {
    tokio::spawn(async move {
        let mut report = StreamReport {
            stream,
            ..StreamReport::default()
        };
        while let Some(sample) = rx.recv().await {
            report.received += 1;
            {
                let mut guard = buffer.lock().unwrap_or_else(|e| e.into_inner());
                guard.push(sample.timestamp, sample);
            }
            report.processed += 1;
        }
        debug!(stream = %report.stream, samples = report.received, "motion stream closed");
        report
    })
}

/// Run `stage` on every observation from `rx`, flushing when the stream ends.
///
/// Frames run on the blocking pool since transform and map lookups may
/// block; the stage is handed back after every frame.
pub fn spawn_radar_stream(stage: PipelineStage, mut rx: mpsc::Receiver<Observation>) -> JoinHandle<StreamReport> {
    tokio::spawn(async move {
        let mut report = StreamReport {
            stream: stage.device_id().to_string(),
            ..StreamReport::default()
        };
        let mut stage = stage;
        while let Some(observation) = rx.recv().await {
            report.received += 1;
            let frame = tokio::task::spawn_blocking(move || {
                let outcome = stage.process(observation);
                (stage, outcome)
            })
            .await;
            let outcome = match frame {
                Ok((returned, outcome)) => {
                    stage = returned;
                    outcome
                }
                Err(e) => {
                    error!(device_id = %report.stream, error = %e, "pipeline stage panicked; stream stopped");
                    return report;
                }
            };
            match outcome {
                FrameOutcome::Dropped(_) => report.dropped += 1,
                FrameOutcome::Processed { published, .. } => {
                    report.processed += 1;
                    report.published += published as u64;
                }
            }
        }
        match tokio::task::spawn_blocking(move || stage.flush()).await {
            Ok(flushed) => report.published += flushed as u64,
            Err(e) => error!(device_id = %report.stream, error = %e, "flush failed"),
        }
        info!(
            device_id = %report.stream,
            received = report.received,
            dropped = report.dropped,
            published = report.published,
            "radar stream closed"
        );
        report
    })
}

/// All pipeline stages of one process plus the motion buffer they share.
pub struct PerceptionNode {
    config: NodeConfig,
    motion: SharedMotionBuffer,
    stages: Vec<PipelineStage>,
}

impl PerceptionNode {
    /// Build one stage per configured radar; `publisher_for` supplies each
    /// stage's result sink.
    pub fn new<F>(
        config: NodeConfig,
        transforms: Arc<dyn TransformService>,
        map: Option<Arc<dyn MapService>>,
        registry: &DetectorRegistry,
        publisher_for: F,
    ) -> Result<Self, PerceptionError>
    where
        F: Fn(&PipelineConfig) -> Arc<dyn ResultPublisher>,
    {
        config.validate()?;
        let motion: SharedMotionBuffer = Arc::new(Mutex::new(TemporalBuffer::new(
            config.motion.buffer_capacity,
            config.motion.tolerance_s,
        )));
        let stages = config
            .radars
            .iter()
            .map(|radar| {
                PipelineStage::from_config(
                    radar.clone(),
                    Arc::clone(&transforms),
                    map.clone(),
                    Arc::clone(&motion),
                    registry,
                    publisher_for(radar),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { config, motion, stages })
    }

    /// Build a node whose stages publish into `store` and announce on `bus`,
    /// each on its own configured event ids.
    pub fn with_shared_data(
        config: NodeConfig,
        transforms: Arc<dyn TransformService>,
        map: Option<Arc<dyn MapService>>,
        registry: &DetectorRegistry,
        store: Arc<SharedDataStore<ResultSet>>,
        bus: EventBus,
    ) -> Result<Self, PerceptionError> {
        Self::new(config, transforms, map, registry, |radar| {
            let publisher: Arc<dyn ResultPublisher> = Arc::new(
                SharedDataPublisher::new(Arc::clone(&store), bus.clone(), radar.publish_event_ids.clone())
                    .with_retention(radar.shared_data_retention_s),
            );
            publisher
        })
    }

    pub fn motion_buffer(&self) -> SharedMotionBuffer {
        Arc::clone(&self.motion)
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.device_id().to_string()).collect()
    }

    /// Spawn every stream task.  Must be called inside a Tokio runtime.
    pub fn start(self) -> NodeHandle {
        let (motion_tx, motion_rx) = mpsc::channel(STREAM_CAPACITY);
        let mut tasks = vec![spawn_motion_stream(
            self.config.motion.stream.clone(),
            Arc::clone(&self.motion),
            motion_rx,
        )];

        let mut radars = HashMap::new();
        for stage in self.stages {
            let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
            radars.insert(stage.device_id().to_string(), tx);
            tasks.push(spawn_radar_stream(stage, rx));
        }
        info!(radars = radars.len(), "perception node started");

        NodeHandle {
            motion: motion_tx,
            radars,
            tasks,
        }
    }
}

/// Senders into a running node.
pub struct NodeHandle {
    motion: mpsc::Sender<MotionSample>,
    radars: HashMap<String, mpsc::Sender<Observation>>,
    tasks: Vec<JoinHandle<StreamReport>>,
}

impl NodeHandle {
    pub async fn send_motion(&self, sample: MotionSample) -> Result<(), PerceptionError> {
        self.motion
            .send(sample)
            .await
            .map_err(|e| PerceptionError::Channel(format!("motion stream closed: {e}")))
    }

    pub async fn send_observation(&self, device_id: &str, observation: Observation) -> Result<(), PerceptionError> {
        let tx = self
            .radars
            .get(device_id)
            .ok_or_else(|| PerceptionError::Channel(format!("no radar stream named {device_id}")))?;
        tx.send(observation)
            .await
            .map_err(|e| PerceptionError::Channel(format!("radar stream {device_id} closed: {e}")))
    }

    /// Close every stream and wait for the tasks to finish.
    pub async fn shutdown(self) -> Vec<StreamReport> {
        let Self { motion, radars, tasks } = self;
        drop(motion);
        drop(radars);

        let mut reports = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "stream task failed"),
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obstacle_perception::transform::{Quaternion, TfBuffer, Transform3D, TransformError};
    use obstacle_types::{EventId, RawDetection, Vec3};
    use std::sync::atomic::Ordering;

    fn transforms() -> Arc<TfBuffer> {
        let tf = TfBuffer::default();
        tf.set_static_transform("world", "radar_front", Transform3D::identity());
        tf.set_static_transform(
            "world",
            "radar_rear",
            Transform3D::new(Vec3::zero(), Quaternion::from_yaw(std::f64::consts::PI)),
        );
        Arc::new(tf)
    }

    fn two_radar_config() -> NodeConfig {
        let front = PipelineConfig {
            use_fp_filter: false,
            publish_event_ids: vec![EventId(1)],
            ..PipelineConfig::default()
        };
        let rear = PipelineConfig {
            device_id: "radar_rear".into(),
            sensor_frame: "radar_rear".into(),
            use_fp_filter: false,
            publish_event_ids: vec![EventId(2)],
            ..PipelineConfig::default()
        };
        NodeConfig {
            radars: vec![front, rear],
            ..NodeConfig::default()
        }
    }

    fn observation(ts: f64) -> Observation {
        Observation {
            timestamp: ts,
            detections: vec![RawDetection {
                id: 1,
                position: Vec3::new(20.0, 0.0, 0.0),
                radial_velocity: None,
                confidence: None,
            }],
        }
    }

    fn motion(ts: f64) -> MotionSample {
        MotionSample {
            timestamp: ts,
            position: Vec3::zero(),
            linear_velocity: Vec3::zero(),
        }
    }

    #[tokio::test]
    async fn motion_stream_fills_buffer() {
        let buffer: SharedMotionBuffer = Arc::new(Mutex::new(TemporalBuffer::new(2, 0.1)));
        let (tx, rx) = mpsc::channel(8);
        let task = spawn_motion_stream("localization".into(), Arc::clone(&buffer), rx);
        for ts in [1.0, 2.0, 3.0] {
            tx.send(motion(ts)).await.unwrap();
        }
        drop(tx);
        let report = task.await.unwrap();
        assert_eq!(report.received, 3);
        let guard = buffer.lock().unwrap();
        assert_eq!(guard.span(), Some((2.0, 3.0)));
    }

    #[tokio::test]
    async fn node_routes_each_device_to_its_own_lane() {
        let store = Arc::new(SharedDataStore::new());
        let bus = EventBus::default();
        let mut front_events = bus.subscribe(EventId(1));
        let mut rear_events = bus.subscribe(EventId(2));

        let node = PerceptionNode::with_shared_data(
            two_radar_config(),
            transforms(),
            None,
            &DetectorRegistry::with_builtins(),
            Arc::clone(&store),
            bus.clone(),
        )
        .unwrap();
        let motion_buffer = node.motion_buffer();
        let handle = node.start();

        handle.send_motion(motion(9.95)).await.unwrap();
        handle.send_motion(motion(10.0)).await.unwrap();
        // Make sure the motion task has consumed both samples.
        while motion_buffer.lock().unwrap().len() < 2 {
            tokio::task::yield_now().await;
        }
        handle.send_observation("radar_front", observation(10.07)).await.unwrap();
        handle.send_observation("radar_rear", observation(10.07)).await.unwrap();
        assert!(handle.send_observation("radar_side", observation(10.07)).await.is_err());

        let front = front_events.recv().await.unwrap();
        let rear = rear_events.recv().await.unwrap();
        assert_eq!(front.reserve, "radar_front");
        assert_eq!(rear.reserve, "radar_rear");

        let front_result = store.get_by_stamp(front.timestamp, &front.reserve).unwrap().unwrap();
        let rear_result = store.get_by_stamp(rear.timestamp, &rear.reserve).unwrap().unwrap();
        assert!((front_result.objects[0].position.x - 20.0).abs() < 1e-9);
        assert!((rear_result.objects[0].position.x + 20.0).abs() < 1e-9);

        let reports = handle.shutdown().await;
        assert_eq!(reports.len(), 3);
        let published: u64 = reports.iter().map(|r| r.published).sum();
        assert_eq!(published, 2);
    }

    /// Holds `radar_front` lookups until opened (or two seconds pass).
    struct Gated {
        inner: Arc<TfBuffer>,
        open: std::sync::atomic::AtomicBool,
    }

    impl TransformService for Gated {
        fn can_transform(
            &self,
            target: &str,
            source: &str,
            time: f64,
            horizon: std::time::Duration,
        ) -> Result<(), TransformError> {
            if source == "radar_front" {
                let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
                while !self.open.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
            }
            self.inner.can_transform(target, source, time, horizon)
        }

        fn lookup_transform(&self, target: &str, source: &str, time: f64) -> Result<Transform3D, TransformError> {
            self.inner.lookup_transform(target, source, time)
        }
    }

    #[tokio::test]
    async fn blocked_device_does_not_stall_others() {
        let store = Arc::new(SharedDataStore::new());
        let bus = EventBus::default();
        let mut front_events = bus.subscribe(EventId(1));
        let mut rear_events = bus.subscribe(EventId(2));
        let gate = Arc::new(Gated {
            inner: transforms(),
            open: std::sync::atomic::AtomicBool::new(false),
        });

        let node = PerceptionNode::with_shared_data(
            two_radar_config(),
            gate.clone(),
            None,
            &DetectorRegistry::with_builtins(),
            Arc::clone(&store),
            bus.clone(),
        )
        .unwrap();
        let motion_buffer = node.motion_buffer();
        let handle = node.start();
        handle.send_motion(motion(10.0)).await.unwrap();
        while motion_buffer.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        handle.send_observation("radar_front", observation(10.07)).await.unwrap();
        handle.send_observation("radar_rear", observation(10.07)).await.unwrap();

        let rear = rear_events.recv().await.unwrap();
        assert_eq!(rear.reserve, "radar_rear");
        assert!(store.get_by_stamp(10.0, "radar_front").unwrap().is_none());

        gate.open.store(true, Ordering::SeqCst);
        let front = front_events.recv().await.unwrap();
        assert_eq!(front.reserve, "radar_front");
        handle.shutdown().await;
    }

    #[test]
    fn unknown_detector_fails_construction() {
        let mut config = NodeConfig::default();
        config.radars[0].detector = "MissingDetector".into();
        let result = PerceptionNode::with_shared_data(
            config,
            transforms(),
            None,
            &DetectorRegistry::with_builtins(),
            Arc::new(SharedDataStore::new()),
            EventBus::default(),
        );
        assert!(matches!(result, Err(PerceptionError::UnknownDetector(_))));
    }
}
