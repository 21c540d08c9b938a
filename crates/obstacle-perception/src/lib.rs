//! `obstacle-perception` – per-frame resolution and detection stages.
//!
//! Everything a radar frame passes through between arrival and publication,
//! minus the orchestration itself (see `obstacle-runtime`).
//!
//! # Modules
//!
//! - [`temporal_buffer`] – [`TemporalBuffer`][temporal_buffer::TemporalBuffer]:
//!   bounded ring of motion fixes with nearest-timestamp lookup.
//! - [`transform`] – rigid transforms and [`TfBuffer`][transform::TfBuffer],
//!   a time-indexed frame graph implementing
//!   [`TransformService`][transform::TransformService].
//! - [`frame_resolver`] – [`FrameResolver`][frame_resolver::FrameResolver]:
//!   sensor-to-world pose at the corrected capture time.
//! - [`region`] – [`RegionContextProvider`][region::RegionContextProvider]:
//!   map polygons around the sensor, degrading to an empty context.
//! - [`detector`] – the [`RadarDetector`][detector::RadarDetector] contract,
//!   built-in variants and the name-based registry.
//! - [`invoker`] – [`DetectionInvoker`][invoker::DetectionInvoker]: runs the
//!   configured detector once its inputs are complete.
//! - [`identity`] – [`IdentityTracker`][identity::IdentityTracker]: stable
//!   ids, delayed confirmation and false-positive suppression.

pub mod detector;
pub mod frame_resolver;
pub mod identity;
pub mod invoker;
pub mod region;
pub mod temporal_buffer;
pub mod transform;

pub use detector::{DetectorOptions, DetectorRegistry, RadarDetector};
pub use frame_resolver::FrameResolver;
pub use identity::{IdentityConfig, IdentityTracker, TrackState};
pub use invoker::{DetectionInvoker, InvokeError};
pub use region::{MapService, RegionContext, RegionContextProvider};
pub use temporal_buffer::TemporalBuffer;
pub use transform::{TfBuffer, Transform3D, TransformService};
