//! Camera solving for tracked footage.
//!
//! [`CameraSolver`] turns the tracks of a [`matchmove_track::TrackingSession`]
//! into per-frame camera poses, 3-D points and refined intrinsics:
//!
//! 1. pick a keyframe pair with good shared coverage,
//! 2. reconstruct through a [`SolverBackend`] (two-view essential matrix,
//!    resection and triangulation; rotation-only fallback),
//! 3. refine the selected intrinsics with Levenberg–Marquardt, keeping the
//!    result only when the mean reprojection error drops.
//!
//! Solving is best effort: insufficient data produces a [`SolveReport`]
//! with `success = false` and warnings, never an error.

pub mod backend;
mod config;
pub mod observations;
pub mod refine;
mod solver;

pub use backend::{
    LinearSolverBackend, ObservationError, Reconstruction, ReconstructionMethod, SolverBackend,
};
pub use config::{IntrinsicsMask, SolveConfig, MIN_FRAME_TRACKS, MIN_KEYFRAME_OVERLAP};
pub use observations::TrackObservations;
pub use refine::{refine_intrinsics, IntrinsicsBounds, IntrinsicsProblem, NllsProblem, RefinedIntrinsics};
pub use solver::{
    CameraSolver, FrameCamera, Solve, SolveId, SolveReport, SolvedIntrinsics, FALLBACK_RESOLUTION,
};
