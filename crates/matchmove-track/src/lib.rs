//! 2-D point tracking for `matchmove-rs`.
//!
//! - track data model ([`Track`], [`TrackPoint`], [`TrackingSession`]),
//! - feature detection with pluggable backends and a deterministic fallback,
//! - pyramidal Lucas–Kanade optical flow, also with a fallback backend,
//! - [`PointTracker`], which drives both over a frame range.
//!
//! Track positions are normalized UV (0–1, origin top-left). Detectors and
//! flow backends work in pixels; the tracker converts at the boundary.

pub mod detector;
/// Float images and pyramids used by the detectors and flow.
pub mod image_ops;
pub mod klt;
pub mod tracker;
mod types;

pub use detector::{
    CornerResponse, DetectionResult, FeatureDetectorBackend, FeatureDetectorEngine, FeaturePoint,
    GridFallbackDetector, StructureTensorDetector,
};
pub use klt::{FallbackFlow, FlowResult, KltTracker, OpticalFlowBackend, PyramidalLucasKanade};
pub use tracker::{AutoTrackState, PointTracker, MIN_EXCLUSION_UV};
pub use types::*;
