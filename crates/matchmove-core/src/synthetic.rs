//! Deterministic synthetic match-move data for tests and benchmarks.
//!
//! - random 3D point clouds in front of the camera,
//! - a dolly camera path,
//! - projection of every point into every frame as normalized UV,
//! - a Gaussian-blob image renderer for tracker tests.

use image::{GrayImage, Luma};
use nalgebra::{Translation3, UnitQuaternion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::camera::CameraModel;
use crate::{Frame, Iso3, Pt2, Pt3, Real, Vec3};

/// Points uniformly drawn from `x ∈ [-2, 2]`, `y ∈ [-1.5, 1.5]`, `z ∈ [4, 8]`.
pub fn volumetric_points(n: usize, seed: u64) -> Vec<Pt3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Pt3::new(
                rng.random_range(-2.0..2.0),
                rng.random_range(-1.5..1.5),
                rng.random_range(4.0..8.0),
            )
        })
        .collect()
}

/// Camera-from-world poses of a camera dollying along +X by `step` per frame
/// while panning slowly by `yaw_step` radians per frame.
///
/// The path is centered on the world origin.
pub fn dolly_poses(n_frames: usize, step: Real, yaw_step: Real) -> Vec<Iso3> {
    let mid = (n_frames.saturating_sub(1)) as Real * 0.5;
    (0..n_frames)
        .map(|i| {
            let t = i as Real - mid;
            let center = Vec3::new(t * step, 0.0, 0.0);
            let world_from_cam = Iso3::from_parts(
                Translation3::from(center),
                UnitQuaternion::from_scaled_axis(Vec3::y() * (t * yaw_step)),
            );
            world_from_cam.inverse()
        })
        .collect()
}

/// A camera, a point cloud and one pose per frame.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub camera: CameraModel,
    pub points: Vec<Pt3>,
    pub first_frame: Frame,
    /// Camera-from-world per frame, starting at `first_frame`.
    pub poses: Vec<Iso3>,
}

impl SyntheticScene {
    /// Volumetric points seen by a dollying camera.
    pub fn dolly(camera: CameraModel, n_points: usize, first_frame: Frame, n_frames: usize, seed: u64) -> Self {
        Self {
            camera,
            points: volumetric_points(n_points, seed),
            first_frame,
            poses: dolly_poses(n_frames, 0.03, 0.002),
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        (0..self.poses.len()).map(move |i| self.first_frame + i as Frame)
    }

    pub fn pose(&self, frame: Frame) -> Option<&Iso3> {
        let idx = usize::try_from(frame - self.first_frame).ok()?;
        self.poses.get(idx)
    }

    /// Distorted pixel of `point` at `frame`, if in front of the camera and
    /// inside the image.
    pub fn project_pixel(&self, frame: Frame, point: usize) -> Option<Pt2> {
        let pose = self.pose(frame)?;
        let p_c = pose.transform_point(self.points.get(point)?);
        let px = self.camera.project(&p_c)?;
        self.camera.contains_pixel(&px).then_some(px)
    }

    /// Same as [`Self::project_pixel`] in normalized UV.
    pub fn project_uv(&self, frame: Frame, point: usize) -> Option<Pt2> {
        self.project_pixel(frame, point)
            .map(|px| self.camera.pixel_to_uv(&px))
    }

    /// Every visible projection in UV, with optional Gaussian noise in pixels.
    ///
    /// Returns `(point index, frame, uv)`.
    pub fn observations(&self, noise_px: Real, seed: u64) -> Vec<(usize, Frame, Pt2)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::new();
        for point in 0..self.points.len() {
            for frame in self.frames() {
                let Some(mut px) = self.project_pixel(frame, point) else {
                    continue;
                };
                if noise_px > 0.0 {
                    px.x += gaussian(&mut rng) * noise_px;
                    px.y += gaussian(&mut rng) * noise_px;
                }
                out.push((point, frame, self.camera.pixel_to_uv(&px)));
            }
        }
        out
    }
}

fn gaussian(rng: &mut StdRng) -> Real {
    // Box-Muller
    let u1: Real = rng.random::<Real>().max(1e-12);
    let u2: Real = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Render Gaussian blobs (`sigma` in pixels) at pixel `centers` over a dark
/// background.
pub fn render_blobs(width: u32, height: u32, centers: &[Pt2], sigma: Real) -> GrayImage {
    let mut acc = vec![0.0_f64; (width as usize) * (height as usize)];
    let radius = (3.0 * sigma).ceil() as i64;
    let inv = 1.0 / (2.0 * sigma * sigma);
    for c in centers {
        let cx = c.x.round() as i64;
        let cy = c.y.round() as i64;
        for y in (cy - radius).max(0)..=(cy + radius).min(height as i64 - 1) {
            for x in (cx - radius).max(0)..=(cx + radius).min(width as i64 - 1) {
                let dx = x as Real + 0.5 - c.x;
                let dy = y as Real + 0.5 - c.y;
                acc[y as usize * width as usize + x as usize] += (-(dx * dx + dy * dy) * inv).exp();
            }
        }
    }
    GrayImage::from_fn(width, height, |x, y| {
        let v = acc[y as usize * width as usize + x as usize].min(1.0);
        Luma([(16.0 + 224.0 * v).round() as u8])
    })
}

/// `n` random blob centers at least `margin` pixels from the border.
pub fn random_blob_centers(width: u32, height: u32, n: usize, margin: Real, seed: u64) -> Vec<Pt2> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Pt2::new(
                rng.random_range(margin..(width as Real - margin)),
                rng.random_range(margin..(height as Real - margin)),
            )
        })
        .collect()
}
