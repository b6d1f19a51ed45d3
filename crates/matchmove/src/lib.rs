//! High-level entry crate for `matchmove-rs`.
//!
//! This crate ties the match-moving stages together:
//! - footage import and camera profiles
//! - automatic 2-D point tracking (feature detection + pyramidal KLT)
//! - camera solving (keyframe reconstruction + intrinsics refinement)
//! - ST-map generation for lens distortion workflows in compositing
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use matchmove::prelude::*;
//!
//! let ctx = MatchmoveContext::from_json_file("shot.json")?;
//! let mut session = ctx.open_footage("plates/shot.1001.exr", 24.0)?;
//! let sequence = matchmove::core::scan_image_sequence("plates/shot.1001.exr")?;
//! let frames = SequenceFrames::new(sequence);
//!
//! let tracking = ctx.track(&mut session, |f| frames.read(f), None);
//! println!("{} tracks", tracking.tracks.len());
//!
//! let (report, solve) = ctx.solve(&session, None);
//! println!("solve error {:.3} px ({} frames)", report.average_error, report.frames_solved);
//! if let Some(solve) = solve {
//!     println!("focal {:.2} px", solve.intrinsics.focal_px);
//! }
//!
//! let stmap = ctx.stmap(None)?;
//! stmap.save("shot_stmap.exr")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`core`] - Math types, lens distortion, camera profiles, footage import
//! - [`linear`] - Closed-form geometry (essential matrix, PnP, triangulation)
//! - [`track`] - Track model, feature detection, optical flow, [`PointTracker`]
//! - [`solve`] - [`CameraSolver`], reconstruction backends, intrinsics refinement
//! - [`stmap`] - ST-map generation, image output and batch export
//! - [`synthetic`] - Deterministic synthetic scenes for testing
//!
//! # Pipeline
//!
//! | Stage | Entry point | Output |
//! |-------|-------------|--------|
//! | Import | [`MatchmoveContext::open_footage`] | [`TrackingSession`] |
//! | Track | [`MatchmoveContext::track`] | [`TrackingResult`], tracks in the session |
//! | Solve | [`MatchmoveContext::solve`] | [`SolveReport`], [`Solve`] snapshot |
//! | ST-map | [`MatchmoveContext::stmap`] / [`MatchmoveContext::export_stmaps`] | [`STMapResult`], files |
//!
//! Every long-running stage takes an optional [`ProgressCallback`] receiving
//! a non-decreasing fraction and a stage label.

mod config;
mod context;
mod frames;

pub use config::{PipelineConfig, PipelineError};
pub use context::MatchmoveContext;
pub use frames::SequenceFrames;

// ═══════════════════════════════════════════════════════════════════════════════
// Foundation Crates
// ═══════════════════════════════════════════════════════════════════════════════

/// Math types, lens distortion, camera profiles and footage import.
pub mod core {
    pub use matchmove_core::*;
}

/// Closed-form multiple-view geometry.
pub mod linear {
    pub use matchmove_linear::*;
}

/// Feature detection, optical flow and point tracking.
pub mod track {
    pub use matchmove_track::*;
}

/// Camera solving.
pub mod solve {
    pub use matchmove_solve::*;
}

/// ST-map generation and output.
pub mod stmap {
    pub use matchmove_stmap::*;
}

/// Deterministic synthetic data generation for testing.
pub mod synthetic {
    pub use matchmove_core::synthetic::*;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Re-exports (Top-Level)
// ═══════════════════════════════════════════════════════════════════════════════

// Core types
pub use matchmove_core::{
    CameraModel, CameraProfile, CameraProfileManager, DistortionCoefficients, FootageInfo, Frame,
    Iso3, ProgressCallback, Pt2, Pt3, Real, Vec2, Vec3,
};

// Tracking
pub use matchmove_track::{
    PointTracker, Track, TrackId, TrackPoint, TrackStatus, TrackingConfig, TrackingResult,
    TrackingSession,
};

// Solving
pub use matchmove_solve::{CameraSolver, Solve, SolveConfig, SolveReport};

// ST-maps
pub use matchmove_stmap::{
    BitDepth, STMapBatchGenerator, STMapConfig, STMapGenerator, STMapMetadata, STMapResult,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude (Quick Start)
// ═══════════════════════════════════════════════════════════════════════════════

/// Convenient re-exports for common use cases.
///
/// ```no_run
/// use matchmove::prelude::*;
/// ```
pub mod prelude {
    // Pipeline
    pub use crate::{MatchmoveContext, PipelineConfig, PipelineError, SequenceFrames};

    // Core types
    pub use crate::{
        CameraModel, CameraProfile, CameraProfileManager, DistortionCoefficients, FootageInfo,
        Frame, ProgressCallback, Pt2, Pt3, Real,
    };

    // Stage types
    pub use crate::{
        BitDepth, CameraSolver, PointTracker, STMapConfig, STMapGenerator, STMapMetadata,
        STMapResult, Solve, SolveConfig, SolveReport, TrackingConfig, TrackingResult,
        TrackingSession,
    };
}
