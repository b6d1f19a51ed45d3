//! Core types for `matchmove-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...) and error statistics,
//! - Brown–Conrady lens distortion in centered lens coordinates,
//! - a pinhole camera model built on it,
//! - camera profiles, the profile registry and its JSON persistence,
//! - footage import (image sequences and video containers),
//! - the progress callback contract shared by long-running operations,
//! - deterministic synthetic scenes.

pub mod camera;
/// Footage description and import.
pub mod footage;
/// Forward and inverse lens distortion.
pub mod lens;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera profiles and registry.
pub mod profile;
pub mod progress;
/// Deterministic synthetic data generation helpers.
pub mod synthetic;

pub use camera::CameraModel;
pub use footage::{
    import_footage, read_metadata, scan_image_sequence, FootageError, FootageInfo, FootageKind,
    ImageSequenceInfo, VideoMetadata,
};
pub use lens::{
    apply_distortion, apply_radial_k1, remove_distortion, remove_radial_k1,
    DistortionCoefficients, DistortionModelKind, LensSpace,
};
pub use math::*;
pub use profile::{default_profile_manager, CameraProfile, CameraProfileManager, ProfileError};
pub use progress::{Progress, ProgressCallback};
