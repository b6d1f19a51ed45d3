//! Brown–Conrady lens distortion in centered lens coordinates.
//!
//! Lens coordinates have their origin at the image center and are scaled by
//! half the image width, so the left/right frame edges sit at `x = ±1` and
//! pixels stay square (`y` spans `±height/width`). The optical-center offset
//! `(cx, cy)` of a profile is additive in this space: distortion is evaluated
//! relative to `(cx, cy)` and the offset is added back afterwards.
//!
//! The forward model is
//!
//! ```text
//! r² = x² + y²
//! x' = x (1 + k1 r² + k2 r⁴ + k3 r⁶) + 2 p1 x y + p2 (r² + 2 x²)
//! y' = y (1 + k1 r² + k2 r⁴ + k3 r⁶) + p1 (r² + 2 y²) + 2 p2 x y
//! ```
//!
//! and the inverse is computed iteratively.

use serde::{Deserialize, Serialize};

use crate::Real;

const UNDISTORT_MAX_ITERS: usize = 20;
const UNDISTORT_TOL: Real = 1e-12;

/// Distortion model tag stored with a camera profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModelKind {
    None,
    #[default]
    BrownConrady,
}

/// The seven Brown–Conrady parameters, independent of any profile identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionCoefficients {
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
    pub cx: Real,
    pub cy: Real,
}

impl DistortionCoefficients {
    /// No distortion.
    pub const ZERO: Self = Self {
        k1: 0.0,
        k2: 0.0,
        k3: 0.0,
        p1: 0.0,
        p2: 0.0,
        cx: 0.0,
        cy: 0.0,
    };

    /// Purely radial model centered on the image.
    pub fn radial(k1: Real, k2: Real, k3: Real) -> Self {
        Self {
            k1,
            k2,
            k3,
            ..Self::ZERO
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// `true` when there are no tangential terms and no center offset.
    pub fn is_radial_only(&self) -> bool {
        self.p1 == 0.0 && self.p2 == 0.0 && self.cx == 0.0 && self.cy == 0.0
    }

    /// Map an undistorted lens coordinate to its distorted position.
    pub fn apply(&self, x: Real, y: Real) -> (Real, Real) {
        if self.is_zero() {
            return (x, y);
        }
        let (xd, yd) = self.distort_centered(x - self.cx, y - self.cy);
        (xd + self.cx, yd + self.cy)
    }

    /// Map a distorted lens coordinate back to its undistorted position.
    ///
    /// Newton iteration on the forward model, seeded at the distorted point.
    /// When the Jacobian is singular a fixed-point step is taken instead.
    pub fn remove(&self, x: Real, y: Real) -> (Real, Real) {
        if self.is_zero() {
            return (x, y);
        }
        let xd = x - self.cx;
        let yd = y - self.cy;

        let mut xu = xd;
        let mut yu = yd;
        for _ in 0..UNDISTORT_MAX_ITERS {
            let (fx, fy) = self.distort_centered(xu, yu);
            let ex = fx - xd;
            let ey = fy - yd;
            if ex.abs().max(ey.abs()) < UNDISTORT_TOL {
                break;
            }

            let (j00, j01, j10, j11) = self.jacobian_centered(xu, yu);
            let det = j00 * j11 - j01 * j10;
            let (next_x, next_y) = if det.abs() > 1e-12 {
                (
                    xu - (j11 * ex - j01 * ey) / det,
                    yu - (j00 * ey - j10 * ex) / det,
                )
            } else {
                (xu - ex, yu - ey)
            };

            if !next_x.is_finite() || !next_y.is_finite() {
                break;
            }
            xu = next_x;
            yu = next_y;
        }

        (xu + self.cx, yu + self.cy)
    }

    fn radial_factor(&self, r2: Real) -> Real {
        1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2
    }

    fn distort_centered(&self, x: Real, y: Real) -> (Real, Real) {
        let r2 = x * x + y * y;
        let radial = self.radial_factor(r2);
        let x_t = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_t = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + x_t, y * radial + y_t)
    }

    /// Partial derivatives `(∂x'/∂x, ∂x'/∂y, ∂y'/∂x, ∂y'/∂y)`.
    fn jacobian_centered(&self, x: Real, y: Real) -> (Real, Real, Real, Real) {
        let r2 = x * x + y * y;
        let radial = self.radial_factor(r2);
        let d_radial = self.k1 + 2.0 * self.k2 * r2 + 3.0 * self.k3 * r2 * r2;

        let cross = 2.0 * x * y * d_radial + 2.0 * self.p1 * x + 2.0 * self.p2 * y;
        let dxdx = radial + 2.0 * x * x * d_radial + 2.0 * self.p1 * y + 6.0 * self.p2 * x;
        let dydy = radial + 2.0 * y * y * d_radial + 6.0 * self.p1 * y + 2.0 * self.p2 * x;
        (dxdx, cross, cross, dydy)
    }
}

/// Forward distortion of a lens coordinate.
pub fn apply_distortion(x: Real, y: Real, coeffs: &DistortionCoefficients) -> (Real, Real) {
    coeffs.apply(x, y)
}

/// Inverse distortion of a lens coordinate.
pub fn remove_distortion(x: Real, y: Real, coeffs: &DistortionCoefficients) -> (Real, Real) {
    coeffs.remove(x, y)
}

/// Coarse single-coefficient barrel/pincushion model: `x' = x (1 + k1 r²)`.
pub fn apply_radial_k1(x: Real, y: Real, k1: Real) -> (Real, Real) {
    let scale = 1.0 + k1 * (x * x + y * y);
    (x * scale, y * scale)
}

/// Inverse of [`apply_radial_k1`] by fixed-point iteration on the radius.
pub fn remove_radial_k1(x: Real, y: Real, k1: Real) -> (Real, Real) {
    if k1 == 0.0 {
        return (x, y);
    }
    let mut xu = x;
    let mut yu = y;
    for _ in 0..UNDISTORT_MAX_ITERS {
        let scale = 1.0 + k1 * (xu * xu + yu * yu);
        if scale.abs() < 1e-12 || !scale.is_finite() {
            break;
        }
        let next_x = x / scale;
        let next_y = y / scale;
        let delta = (next_x - xu).abs().max((next_y - yu).abs());
        xu = next_x;
        yu = next_y;
        if delta < UNDISTORT_TOL {
            break;
        }
    }
    (xu, yu)
}

/// Conversions between pixels, normalized UV and centered lens coordinates
/// for an image of a given size.
///
/// UV is `(0, 0)` at the top-left corner and `(1, 1)` at the bottom-right,
/// with `v` growing downwards like pixel rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LensSpace {
    pub width: Real,
    pub height: Real,
}

impl LensSpace {
    pub fn new(width: Real, height: Real) -> Self {
        Self { width, height }
    }

    fn half_width(&self) -> Real {
        0.5 * self.width
    }

    pub fn pixel_to_lens(&self, px: Real, py: Real) -> (Real, Real) {
        let hw = self.half_width();
        ((px - hw) / hw, (py - 0.5 * self.height) / hw)
    }

    pub fn lens_to_pixel(&self, x: Real, y: Real) -> (Real, Real) {
        let hw = self.half_width();
        (x * hw + hw, y * hw + 0.5 * self.height)
    }

    pub fn uv_to_lens(&self, u: Real, v: Real) -> (Real, Real) {
        self.pixel_to_lens(u * self.width, v * self.height)
    }

    pub fn lens_to_uv(&self, x: Real, y: Real) -> (Real, Real) {
        let (px, py) = self.lens_to_pixel(x, y);
        (px / self.width, py / self.height)
    }

    /// Undistort a pixel position.
    pub fn undistort_pixel(&self, px: Real, py: Real, coeffs: &DistortionCoefficients) -> (Real, Real) {
        if coeffs.is_zero() {
            return (px, py);
        }
        let (x, y) = self.pixel_to_lens(px, py);
        let (xu, yu) = coeffs.remove(x, y);
        self.lens_to_pixel(xu, yu)
    }

    /// Distort a pixel position.
    pub fn distort_pixel(&self, px: Real, py: Real, coeffs: &DistortionCoefficients) -> (Real, Real) {
        if coeffs.is_zero() {
            return (px, py);
        }
        let (x, y) = self.pixel_to_lens(px, py);
        let (xd, yd) = coeffs.apply(x, y);
        self.lens_to_pixel(xd, yd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realistic_lenses() -> Vec<DistortionCoefficients> {
        vec![
            DistortionCoefficients::radial(-0.2, 0.05, 0.0),
            DistortionCoefficients::radial(0.15, -0.04, 0.01),
            DistortionCoefficients {
                k1: -0.12,
                k2: 0.03,
                k3: -0.005,
                p1: 0.004,
                p2: -0.003,
                cx: 0.01,
                cy: -0.02,
            },
            DistortionCoefficients {
                k1: 0.05,
                k2: 0.0,
                k3: 0.0,
                p1: -0.008,
                p2: 0.006,
                cx: 0.0,
                cy: 0.0,
            },
        ]
    }

    #[test]
    fn zero_coefficients_are_exact_identity() {
        let zero = DistortionCoefficients::default();
        for &(x, y) in &[(0.0, 0.0), (0.3, -0.7), (-0.999, 0.01), (1e-9, -1e-9)] {
            assert_eq!(zero.apply(x, y), (x, y));
            assert_eq!(zero.remove(x, y), (x, y));
        }
    }

    #[test]
    fn remove_inverts_apply_inside_unit_disk() {
        for lens in realistic_lenses() {
            for ri in 0..=10 {
                let r = ri as Real * 0.099;
                for ai in 0..16 {
                    let a = ai as Real * std::f64::consts::PI / 8.0;
                    let (x, y) = (r * a.cos(), r * a.sin());
                    let (xd, yd) = lens.apply(x, y);
                    let (xu, yu) = lens.remove(xd, yd);
                    let err = ((xu - x).powi(2) + (yu - y).powi(2)).sqrt();
                    assert!(err < 1e-3, "lens {lens:?} at ({x}, {y}): err {err}");
                }
            }
        }
    }

    #[test]
    fn barrel_pulls_points_inward() {
        let lens = DistortionCoefficients::radial(-0.2, 0.0, 0.0);
        let (xd, yd) = lens.apply(0.8, 0.0);
        assert!(xd < 0.8);
        assert_eq!(yd, 0.0);
    }

    #[test]
    fn simple_k1_model_roundtrips() {
        for &k1 in &[-0.25, -0.05, 0.1, 0.3] {
            let (xd, yd) = apply_radial_k1(0.6, -0.4, k1);
            let (xu, yu) = remove_radial_k1(xd, yd, k1);
            assert!((xu - 0.6).abs() < 1e-6, "k1={k1}: {xu}");
            assert!((yu + 0.4).abs() < 1e-6, "k1={k1}: {yu}");
        }
    }

    #[test]
    fn simple_k1_matches_full_model() {
        let full = DistortionCoefficients::radial(-0.1, 0.0, 0.0);
        let (a, b) = full.apply(0.4, 0.2);
        let (c, d) = apply_radial_k1(0.4, 0.2, -0.1);
        assert!((a - c).abs() < 1e-15 && (b - d).abs() < 1e-15);
    }

    #[test]
    fn lens_space_conversions_roundtrip() {
        let space = LensSpace::new(1920.0, 1080.0);
        assert_eq!(space.pixel_to_lens(960.0, 540.0), (0.0, 0.0));
        let (x, _) = space.pixel_to_lens(1920.0, 540.0);
        assert!((x - 1.0).abs() < 1e-12);

        let (x, y) = space.uv_to_lens(0.25, 0.8);
        let (u, v) = space.lens_to_uv(x, y);
        assert!((u - 0.25).abs() < 1e-12 && (v - 0.8).abs() < 1e-12);
    }

    #[test]
    fn pixel_undistort_inverts_distort() {
        let space = LensSpace::new(640.0, 480.0);
        let lens = DistortionCoefficients::radial(-0.15, 0.02, 0.0);
        let (dx, dy) = space.distort_pixel(50.0, 400.0, &lens);
        let (ux, uy) = space.undistort_pixel(dx, dy, &lens);
        assert!((ux - 50.0).abs() < 1e-6 && (uy - 400.0).abs() < 1e-6);
    }
}
