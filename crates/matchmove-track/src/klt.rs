//! Frame-to-frame point tracking: backends and the tracker facade.
//!
//! Every backend returns parallel arrays the same length as its input;
//! failures are reported through `status`, never by dropping points.

use image::GrayImage;
use log::debug;
use matchmove_core::{Pt2, Real};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::image_ops::{FloatImage, Pyramid};
use crate::types::{FlowKind, TrackingConfig};

/// Parallel per-point flow output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowResult {
    pub points: Vec<Pt2>,
    pub status: Vec<bool>,
    pub errors: Vec<Real>,
}

impl FlowResult {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            points: Vec::with_capacity(n),
            status: Vec::with_capacity(n),
            errors: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, point: Pt2, ok: bool, error: Real) {
        self.points.push(point);
        self.status.push(ok);
        self.errors.push(error);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.status.iter().filter(|s| **s).count()
    }
}

/// Optical flow between two frames. Points are in pixels.
pub trait OpticalFlowBackend: Send + Sync {
    fn kind(&self) -> FlowKind;

    fn track(&self, prev: &GrayImage, curr: &GrayImage, points: &[Pt2]) -> FlowResult;
}

/// Forward-additive pyramidal Lucas–Kanade.
#[derive(Debug, Clone)]
pub struct PyramidalLucasKanade {
    /// Patch half-size; the patch is `(2r + 1)²`.
    pub window_radius: usize,
    pub levels: usize,
    pub max_iterations: usize,
    /// Convergence threshold in pixels.
    pub epsilon: f32,
    /// Mean absolute patch difference above which a point fails.
    pub max_error: f32,
}

impl Default for PyramidalLucasKanade {
    fn default() -> Self {
        Self {
            window_radius: 7,
            levels: 3,
            max_iterations: 30,
            epsilon: 0.01,
            max_error: 30.0,
        }
    }
}

enum LkStep {
    Converged(f32, f32),
    MaxIter(f32, f32),
    Singular,
}

impl PyramidalLucasKanade {
    fn lk_level(&self, prev: &FloatImage, curr: &FloatImage, fx: f32, fy: f32, mut dx: f32, mut dy: f32) -> LkStep {
        let r = self.window_radius as isize;
        for _ in 0..self.max_iterations {
            let (mut h00, mut h01, mut h11) = (0.0f32, 0.0f32, 0.0f32);
            let (mut b0, mut b1) = (0.0f32, 0.0f32);
            for py in -r..=r {
                for px in -r..=r {
                    let (ox, oy) = (px as f32, py as f32);
                    let t = prev.sample(fx + ox, fy + oy);
                    let wx = fx + dx + ox;
                    let wy = fy + dy + oy;
                    let e = t - curr.sample(wx, wy);
                    let gx = 0.5 * (curr.sample(wx + 1.0, wy) - curr.sample(wx - 1.0, wy));
                    let gy = 0.5 * (curr.sample(wx, wy + 1.0) - curr.sample(wx, wy - 1.0));
                    h00 += gx * gx;
                    h01 += gx * gy;
                    h11 += gy * gy;
                    b0 += gx * e;
                    b1 += gy * e;
                }
            }

            let det = h00 * h11 - h01 * h01;
            if det.abs() < 1e-6 {
                return LkStep::Singular;
            }
            let inv = 1.0 / det;
            let ddx = inv * (h11 * b0 - h01 * b1);
            let ddy = inv * (h00 * b1 - h01 * b0);
            dx += ddx;
            dy += ddy;
            if !dx.is_finite() || !dy.is_finite() {
                return LkStep::Singular;
            }
            if ddx * ddx + ddy * ddy < self.epsilon * self.epsilon {
                return LkStep::Converged(dx, dy);
            }
        }
        LkStep::MaxIter(dx, dy)
    }

    fn residual(&self, prev: &FloatImage, curr: &FloatImage, from: Pt2, to: Pt2) -> f32 {
        let r = self.window_radius as isize;
        let mut sum = 0.0f32;
        for py in -r..=r {
            for px in -r..=r {
                let (ox, oy) = (px as f32, py as f32);
                let a = prev.sample(from.x as f32 + ox, from.y as f32 + oy);
                let b = curr.sample(to.x as f32 + ox, to.y as f32 + oy);
                sum += (a - b).abs();
            }
        }
        let n = (2 * r + 1) * (2 * r + 1);
        sum / n as f32
    }

    fn track_one(&self, prev: &Pyramid, curr: &Pyramid, p: Pt2) -> (Pt2, bool, Real) {
        let levels = prev.num_levels().min(curr.num_levels()).min(self.levels.max(1));
        let base = &prev.levels[0];
        if !p.x.is_finite() || !p.y.is_finite() || !base.contains(p.x as f32, p.y as f32) {
            return (p, false, Real::INFINITY);
        }

        let (mut dx, mut dy) = (0.0f32, 0.0f32);
        for level in (0..levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let fx = p.x as f32 * scale;
            let fy = p.y as f32 * scale;
            match self.lk_level(&prev.levels[level], &curr.levels[level], fx, fy, dx, dy) {
                LkStep::Converged(ndx, ndy) | LkStep::MaxIter(ndx, ndy) => {
                    dx = ndx;
                    dy = ndy;
                }
                LkStep::Singular => {
                    let guess = Pt2::new(p.x + (dx / scale) as Real, p.y + (dy / scale) as Real);
                    return (guess, false, Real::INFINITY);
                }
            }
            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        let q = Pt2::new(p.x + dx as Real, p.y + dy as Real);
        if !curr.levels[0].contains(q.x as f32, q.y as f32) {
            return (q, false, Real::INFINITY);
        }
        let err = self.residual(&prev.levels[0], &curr.levels[0], p, q);
        (q, err <= self.max_error, err as Real)
    }
}

impl OpticalFlowBackend for PyramidalLucasKanade {
    fn kind(&self) -> FlowKind {
        FlowKind::LucasKanade
    }

    fn track(&self, prev: &GrayImage, curr: &GrayImage, points: &[Pt2]) -> FlowResult {
        let min_size = 2 * self.window_radius + 2;
        let prev_pyr = Pyramid::build(FloatImage::from_gray(prev), self.levels, min_size);
        let curr_pyr = Pyramid::build(FloatImage::from_gray(curr), self.levels, min_size);

        let mut out = FlowResult::with_capacity(points.len());
        for p in points {
            let (q, ok, err) = self.track_one(&prev_pyr, &curr_pyr, *p);
            out.push(q, ok, err);
        }
        out
    }
}

/// Image-independent stand-in flow: most points survive with a sub-pixel
/// perturbation. Deterministic for a given seed and input.
#[derive(Debug, Clone)]
pub struct FallbackFlow {
    pub seed: u64,
    /// Largest per-axis perturbation in pixels.
    pub max_offset: Real,
    /// Share of points reported lost, capped at 10 %.
    pub failure_rate: Real,
}

impl FallbackFlow {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_offset: 0.5,
            failure_rate: 0.05,
        }
    }

    fn input_hash(&self, points: &[Pt2]) -> u64 {
        // FNV-1a over the quantised coordinates.
        let mut h: u64 = 0xcbf2_9ce4_8422_2325 ^ self.seed;
        for p in points {
            for v in [p.x, p.y] {
                h ^= (v * 1024.0).round() as i64 as u64;
                h = h.wrapping_mul(0x0100_0000_01b3);
            }
        }
        h
    }
}

impl OpticalFlowBackend for FallbackFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Fallback
    }

    fn track(&self, _prev: &GrayImage, curr: &GrayImage, points: &[Pt2]) -> FlowResult {
        let mut rng = StdRng::seed_from_u64(self.input_hash(points));
        let max_failures = points.len() / 10;
        let rate = self.failure_rate.clamp(0.0, 0.1);
        let (w, h) = (curr.width() as Real, curr.height() as Real);
        let offset = self.max_offset.abs();

        let mut failures = 0;
        let mut out = FlowResult::with_capacity(points.len());
        for p in points {
            let dx = if offset > 0.0 { rng.random_range(-offset..=offset) } else { 0.0 };
            let dy = if offset > 0.0 { rng.random_range(-offset..=offset) } else { 0.0 };
            let q = Pt2::new(p.x + dx, p.y + dy);
            let roll: Real = rng.random();
            let lost = roll < rate && failures < max_failures;
            let inside = q.x >= 0.0 && q.y >= 0.0 && q.x < w && q.y < h;
            if lost {
                failures += 1;
            }
            out.push(q, !lost && inside, (dx * dx + dy * dy).sqrt());
        }
        out
    }
}

/// Frame-to-frame tracker over a pluggable flow backend.
pub struct KltTracker {
    backend: Box<dyn OpticalFlowBackend>,
}

impl KltTracker {
    pub fn new(backend: Box<dyn OpticalFlowBackend>) -> Self {
        Self { backend }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        let backend: Box<dyn OpticalFlowBackend> = match config.flow {
            FlowKind::LucasKanade => Box::new(PyramidalLucasKanade {
                window_radius: config.window_radius.max(1) as usize,
                levels: config.pyramid_levels.max(1) as usize,
                max_iterations: config.max_iterations.max(1) as usize,
                epsilon: config.epsilon as f32,
                max_error: config.max_error as f32,
            }),
            FlowKind::Fallback => Box::new(FallbackFlow::new(config.seed)),
        };
        Self::new(backend)
    }

    pub fn kind(&self) -> FlowKind {
        self.backend.kind()
    }

    /// Track pixel positions from `prev` to `curr`.
    ///
    /// The output always has one entry per input point.
    pub fn track(&self, prev: &GrayImage, curr: &GrayImage, points: &[Pt2]) -> FlowResult {
        if points.is_empty() {
            return FlowResult::default();
        }
        if prev.dimensions() != curr.dimensions() {
            debug!(
                "frame size changed {:?} -> {:?}; all points lost",
                prev.dimensions(),
                curr.dimensions()
            );
            let mut out = FlowResult::with_capacity(points.len());
            for p in points {
                out.push(*p, false, Real::INFINITY);
            }
            return out;
        }

        let mut out = self.backend.track(prev, curr, points);
        // Normalize a misbehaving backend to the parallel-array contract.
        out.points.truncate(points.len());
        out.status.truncate(points.len());
        out.errors.truncate(points.len());
        for (i, p) in points.iter().enumerate() {
            if i >= out.points.len() {
                out.points.push(*p);
            }
            if i >= out.status.len() {
                out.status.push(false);
            }
            if i >= out.errors.len() {
                out.errors.push(Real::INFINITY);
            }
        }
        for i in 0..points.len() {
            let q = out.points[i];
            if !q.x.is_finite() || !q.y.is_finite() {
                out.points[i] = points[i];
                out.status[i] = false;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchmove_core::synthetic::{random_blob_centers, render_blobs};
    use matchmove_core::Vec2;

    #[test]
    fn lucas_kanade_follows_translated_blobs() {
        let centers = random_blob_centers(200, 150, 15, 25.0, 11);
        let shift = Vec2::new(2.3, -1.6);
        let moved: Vec<Pt2> = centers.iter().map(|c| c + shift).collect();
        let prev = render_blobs(200, 150, &centers, 3.0);
        let curr = render_blobs(200, 150, &moved, 3.0);

        let lk = PyramidalLucasKanade::default();
        let out = lk.track(&prev, &curr, &centers);
        assert_eq!(out.len(), centers.len());
        let ok = out.success_count();
        assert!(ok >= centers.len() * 8 / 10, "only {ok} tracked");
        for i in 0..centers.len() {
            if out.status[i] {
                let err = (out.points[i] - moved[i]).norm();
                assert!(err < 0.5, "point {i} off by {err}");
            }
        }
    }

    #[test]
    fn flat_region_is_lost() {
        let flat = GrayImage::from_pixel(64, 64, image::Luma([100]));
        let lk = PyramidalLucasKanade::default();
        let out = lk.track(&flat, &flat, &[Pt2::new(32.0, 32.0), Pt2::new(-5.0, 3.0)]);
        assert_eq!(out.status, vec![false, false]);
    }

    #[test]
    fn fallback_mostly_succeeds_with_small_offsets() {
        let img = GrayImage::new(640, 480);
        let points: Vec<Pt2> = (0..200)
            .map(|i| Pt2::new(20.0 + (i % 20) as Real * 30.0, 20.0 + (i / 20) as Real * 40.0))
            .collect();
        let flow = FallbackFlow::new(9);
        let a = flow.track(&img, &img, &points);
        let b = flow.track(&img, &img, &points);
        assert_eq!(a, b);
        assert!(a.success_count() >= 180);
        for (p, q) in points.iter().zip(&a.points) {
            assert!((p.x - q.x).abs() <= 0.5 && (p.y - q.y).abs() <= 0.5);
        }
    }

    #[test]
    fn tracker_keeps_output_parallel() {
        let tracker = KltTracker::from_config(&TrackingConfig {
            flow: FlowKind::Fallback,
            ..TrackingConfig::default()
        });
        let a = GrayImage::new(100, 100);
        let b = GrayImage::new(120, 100);
        let pts = [Pt2::new(10.0, 10.0), Pt2::new(50.0, 50.0), Pt2::new(90.0, 5.0)];
        let out = tracker.track(&a, &b, &pts);
        assert_eq!(out.len(), 3);
        assert_eq!(out.status.len(), 3);
        assert_eq!(out.errors.len(), 3);
        assert_eq!(out.success_count(), 0);
        assert!(tracker.track(&a, &a, &[]).is_empty());
    }
}
