//! Closed-form multi-view geometry used to initialise camera solves.
//!
//! All solvers work on normalized camera coordinates (`K^-1` applied and
//! lens distortion removed) and return `anyhow::Result`, so callers can turn
//! a degenerate configuration into a soft warning.
//!
//! - [`essential_8point`], [`decompose_essential`], [`recover_relative_pose`]
//! - [`triangulate_point_linear`]
//! - [`pnp_dlt`]
//! - [`fit_rotation_3d`]
//! - [`fit_similarity_2d`]

pub mod epipolar;
pub mod math;
pub mod pnp;
pub mod rotation;
pub mod similarity;
pub mod triangulation;

pub use epipolar::{decompose_essential, essential_8point, recover_relative_pose, RelativePose};
pub use math::Mat34;
pub use pnp::pnp_dlt;
pub use rotation::fit_rotation_3d;
pub use similarity::{fit_similarity_2d, Similarity2};
pub use triangulation::{camera_matrix, triangulate_point_linear};
