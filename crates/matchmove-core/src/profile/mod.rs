//! Camera/lens profiles and the registry that owns them.

mod catalog;
mod io;
mod manager;

use serde::{Deserialize, Serialize};

use crate::lens::{DistortionCoefficients, DistortionModelKind};
use crate::Real;

pub use catalog::builtin_profiles;
pub use io::{ProfileFile, PROFILE_FILE_VERSION};
pub use manager::{default_profile_manager, CameraProfileManager};

/// Errors from profile persistence.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to access profile file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("profile file {path} is not valid JSON: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("profile file must hold an object with a `profiles` array or a bare array")]
    Layout,
    #[error("failed to serialize profiles: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A named camera body + lens combination.
///
/// Sensor dimensions and focal length are in millimetres. The distortion
/// coefficients are expressed in centered lens coordinates, see
/// [`crate::lens`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraProfile {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sensor_width: Real,
    pub sensor_height: Real,
    pub focal_length: Real,
    pub crop_factor: Real,
    pub distortion_model: DistortionModelKind,
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
    pub cx: Real,
    pub cy: Real,
}

impl Default for CameraProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            manufacturer: String::new(),
            model: String::new(),
            sensor_width: 36.0,
            sensor_height: 24.0,
            focal_length: 35.0,
            crop_factor: 1.0,
            distortion_model: DistortionModelKind::BrownConrady,
            k1: 0.0,
            k2: 0.0,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
            cx: 0.0,
            cy: 0.0,
        }
    }
}

impl CameraProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The coefficients to use with this profile.
    ///
    /// A profile tagged [`DistortionModelKind::None`] yields all zeros even
    /// if coefficient fields are set.
    pub fn distortion_coefficients(&self) -> DistortionCoefficients {
        match self.distortion_model {
            DistortionModelKind::None => DistortionCoefficients::ZERO,
            DistortionModelKind::BrownConrady => DistortionCoefficients {
                k1: self.k1,
                k2: self.k2,
                k3: self.k3,
                p1: self.p1,
                p2: self.p2,
                cx: self.cx,
                cy: self.cy,
            },
        }
    }

    pub fn with_distortion(mut self, coeffs: DistortionCoefficients) -> Self {
        self.distortion_model = DistortionModelKind::BrownConrady;
        self.k1 = coeffs.k1;
        self.k2 = coeffs.k2;
        self.k3 = coeffs.k3;
        self.p1 = coeffs.p1;
        self.p2 = coeffs.p2;
        self.cx = coeffs.cx;
        self.cy = coeffs.cy;
        self
    }

    pub fn has_distortion(&self) -> bool {
        !self.distortion_coefficients().is_zero()
    }

    /// Diagonal of the sensor in millimetres.
    pub fn sensor_diagonal(&self) -> Real {
        self.sensor_width.hypot(self.sensor_height)
    }

    /// Focal length in pixels for an image `image_width` pixels wide.
    pub fn focal_length_px(&self, image_width: u32) -> Option<Real> {
        (self.sensor_width > 0.0).then(|| self.focal_length * image_width as Real / self.sensor_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_model_masks_coefficients() {
        let mut profile = CameraProfile::new("x");
        profile.k1 = -0.2;
        assert!(profile.has_distortion());
        profile.distortion_model = DistortionModelKind::None;
        assert!(!profile.has_distortion());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let profile: CameraProfile =
            serde_json::from_str(r#"{"name": "lens", "k1": -0.1}"#).unwrap();
        assert_eq!(profile.name, "lens");
        assert_eq!(profile.k1, -0.1);
        assert_eq!(profile.k2, 0.0);
        assert_eq!(profile.distortion_model, DistortionModelKind::BrownConrady);
    }

    #[test]
    fn focal_in_pixels() {
        let mut profile = CameraProfile::new("ff");
        profile.focal_length = 36.0;
        assert_eq!(profile.focal_length_px(1920), Some(1920.0));
        profile.sensor_width = 0.0;
        assert_eq!(profile.focal_length_px(1920), None);
    }
}
