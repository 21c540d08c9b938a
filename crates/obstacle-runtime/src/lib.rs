//! `obstacle-runtime` – drives radar frames through the pipeline.
//!
//! # Modules
//!
//! - [`config`] – [`PipelineConfig`][config::PipelineConfig] per radar and
//!   the surrounding [`NodeConfig`][config::NodeConfig], all serde-friendly
//!   with defaults.
//! - [`stage`] – [`PipelineStage`][stage::PipelineStage]: timestamp
//!   correction, pose, region, motion, detection, identity, publication.
//! - [`node`] – [`PerceptionNode`][node::PerceptionNode]: one Tokio task per
//!   sensor stream around a shared motion buffer.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod config;
pub mod node;
pub mod stage;
pub mod telemetry;

pub use config::{MotionConfig, NodeConfig, PipelineConfig};
pub use node::{NodeHandle, PerceptionNode, StreamReport};
pub use stage::{FrameOutcome, PipelineStage, SharedMotionBuffer};
pub use telemetry::{TracerProviderGuard, init_tracing};
