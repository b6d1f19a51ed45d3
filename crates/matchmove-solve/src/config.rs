use matchmove_core::{CameraModel, CameraProfile, DistortionCoefficients, Frame, Real};
use serde::{Deserialize, Serialize};

/// Fewest shared tracks the eight-point initialisation can work with.
pub const MIN_KEYFRAME_OVERLAP: usize = 8;
/// Fewest 3-D points a DLT resection can work with.
pub const MIN_FRAME_TRACKS: usize = 6;

/// Which intrinsics the solver may adjust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicsMask {
    pub focal_length: bool,
    pub principal_point: bool,
    /// `k1` and `k2`.
    pub radial_distortion: bool,
}

impl Default for IntrinsicsMask {
    fn default() -> Self {
        Self {
            focal_length: true,
            principal_point: false,
            radial_distortion: false,
        }
    }
}

impl IntrinsicsMask {
    pub const NONE: Self = Self {
        focal_length: false,
        principal_point: false,
        radial_distortion: false,
    };

    pub const FOCAL: Self = Self {
        focal_length: true,
        principal_point: false,
        radial_distortion: false,
    };

    pub fn any(&self) -> bool {
        self.focal_length || self.principal_point || self.radial_distortion
    }

    pub fn num_params(&self) -> usize {
        usize::from(self.focal_length) + 2 * usize::from(self.principal_point) + 2 * usize::from(self.radial_distortion)
    }
}

/// Camera solve settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveConfig {
    /// Pick the keyframe pair from track coverage; otherwise `keyframes` is used.
    pub auto_keyframe: bool,
    pub keyframes: Option<(Frame, Frame)>,
    pub refine_intrinsics: IntrinsicsMask,
    /// Initial focal length.
    pub focal_length_mm: Real,
    pub sensor_width_mm: Real,
    /// Lens distortion of the footage, in lens coordinates.
    pub distortion: DistortionCoefficients,
    /// Evaluation budget multiplier for the intrinsics refinement.
    pub max_iterations: usize,
    /// Below this many usable tracks the solve still runs, with a warning.
    pub recommended_min_tracks: usize,
    /// Known 3-D points needed to resect a frame. The linear backend never
    /// goes below [`MIN_FRAME_TRACKS`].
    pub min_frame_tracks: usize,
    /// Tracks shared by the keyframe pair for two-view initialisation. The
    /// linear backend never goes below [`MIN_KEYFRAME_OVERLAP`].
    pub min_keyframe_overlap: usize,
    /// Median triangulation angle required between the keyframes.
    pub min_parallax_deg: Real,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            auto_keyframe: true,
            keyframes: None,
            refine_intrinsics: IntrinsicsMask::default(),
            focal_length_mm: 35.0,
            sensor_width_mm: 36.0,
            distortion: DistortionCoefficients::ZERO,
            max_iterations: 50,
            recommended_min_tracks: 10,
            min_frame_tracks: MIN_FRAME_TRACKS,
            min_keyframe_overlap: MIN_KEYFRAME_OVERLAP,
            min_parallax_deg: 0.5,
        }
    }
}

impl SolveConfig {
    /// Focal length, sensor width and distortion taken from a camera profile.
    pub fn from_profile(profile: &CameraProfile) -> Self {
        Self {
            focal_length_mm: profile.focal_length,
            sensor_width_mm: profile.sensor_width,
            distortion: profile.distortion_coefficients(),
            ..Self::default()
        }
    }

    /// `min_keyframe_overlap` as the linear backend applies it.
    pub fn effective_min_keyframe_overlap(&self) -> usize {
        self.min_keyframe_overlap.max(MIN_KEYFRAME_OVERLAP)
    }

    /// `min_frame_tracks` as the linear backend applies it.
    pub fn effective_min_frame_tracks(&self) -> usize {
        self.min_frame_tracks.max(MIN_FRAME_TRACKS)
    }

    /// One message per threshold the linear backend raises to its floor.
    pub fn raised_thresholds(&self) -> Vec<String> {
        let mut raised = Vec::new();
        if self.min_keyframe_overlap < MIN_KEYFRAME_OVERLAP {
            raised.push(format!(
                "min_keyframe_overlap {} raised to {MIN_KEYFRAME_OVERLAP}",
                self.min_keyframe_overlap
            ));
        }
        if self.min_frame_tracks < MIN_FRAME_TRACKS {
            raised.push(format!(
                "min_frame_tracks {} raised to {MIN_FRAME_TRACKS}",
                self.min_frame_tracks
            ));
        }
        raised
    }

    /// Starting camera for footage of `width × height` pixels.
    pub fn initial_camera(&self, width: u32, height: u32) -> CameraModel {
        CameraModel::from_focal_mm(width, height, self.focal_length_mm, self.sensor_width_mm, self.distortion)
    }
}
