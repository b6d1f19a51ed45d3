use serde::{Deserialize, Serialize};

use crate::lens::{DistortionCoefficients, LensSpace};
use crate::{Pt2, Pt3, Real, Vec2, Vec3};

/// Pinhole camera with lens distortion for an image of fixed size.
///
/// Projection chain:
/// `pixel = distort(f * (X/Z, Y/Z) + principal_point)`
///
/// Distortion is evaluated in centered lens coordinates (see
/// [`LensSpace`]) so profile coefficients can be used unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub width: u32,
    pub height: u32,
    pub focal_px: Real,
    pub principal_point: Vec2,
    pub distortion: DistortionCoefficients,
}

impl CameraModel {
    /// Camera with the principal point at the image center.
    pub fn new(width: u32, height: u32, focal_px: Real, distortion: DistortionCoefficients) -> Self {
        Self {
            width,
            height,
            focal_px,
            principal_point: Vec2::new(0.5 * width as Real, 0.5 * height as Real),
            distortion,
        }
    }

    /// Build from a focal length and sensor width in millimetres.
    pub fn from_focal_mm(
        width: u32,
        height: u32,
        focal_mm: Real,
        sensor_width_mm: Real,
        distortion: DistortionCoefficients,
    ) -> Self {
        Self::new(width, height, focal_mm * width as Real / sensor_width_mm, distortion)
    }

    pub fn lens_space(&self) -> LensSpace {
        LensSpace::new(self.width as Real, self.height as Real)
    }

    pub fn focal_mm(&self, sensor_width_mm: Real) -> Real {
        self.focal_px * sensor_width_mm / self.width as Real
    }

    /// Project a camera-frame point to distorted pixels; `None` behind the camera.
    pub fn project(&self, p_c: &Pt3) -> Option<Pt2> {
        if p_c.z <= 1e-9 {
            return None;
        }
        let ideal = self.principal_point + self.focal_px * Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let (px, py) = self
            .lens_space()
            .distort_pixel(ideal.x, ideal.y, &self.distortion);
        (px.is_finite() && py.is_finite()).then(|| Pt2::new(px, py))
    }

    /// Undistorted normalized image coordinates `(X/Z, Y/Z)` of a pixel.
    pub fn normalize(&self, pixel: &Pt2) -> Pt2 {
        let (ux, uy) = self
            .lens_space()
            .undistort_pixel(pixel.x, pixel.y, &self.distortion);
        Pt2::new(
            (ux - self.principal_point.x) / self.focal_px,
            (uy - self.principal_point.y) / self.focal_px,
        )
    }

    /// Unit ray through a pixel, in the camera frame.
    pub fn backproject(&self, pixel: &Pt2) -> Vec3 {
        let n = self.normalize(pixel);
        Vec3::new(n.x, n.y, 1.0).normalize()
    }

    pub fn uv_to_pixel(&self, uv: &Pt2) -> Pt2 {
        Pt2::new(uv.x * self.width as Real, uv.y * self.height as Real)
    }

    pub fn pixel_to_uv(&self, pixel: &Pt2) -> Pt2 {
        Pt2::new(pixel.x / self.width as Real, pixel.y / self.height as Real)
    }

    pub fn contains_pixel(&self, pixel: &Pt2) -> bool {
        pixel.x >= 0.0
            && pixel.y >= 0.0
            && pixel.x < self.width as Real
            && pixel.y < self.height as Real
    }
}
