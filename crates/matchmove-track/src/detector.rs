//! Feature detection: backends and the engine that runs them.

use std::time::{Duration, Instant};

use image::GrayImage;
use log::{debug, warn};
use matchmove_core::{Frame, Pt2, Real};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::image_ops::FloatImage;
use crate::types::{DetectorKind, TrackingConfig};

/// A detected image feature, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub position: Pt2,
    pub strength: Real,
    pub scale: Real,
    /// Dominant gradient direction in radians.
    pub orientation: Real,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub frame: Frame,
    pub features: Vec<FeaturePoint>,
    /// Backend that actually produced `features`.
    pub detector: DetectorKind,
    pub elapsed: Duration,
    pub warnings: Vec<String>,
}

/// A per-frame feature detector.
///
/// Implementations must return at most `max_features` points, strongest
/// first.
pub trait FeatureDetectorBackend: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Smallest image side the backend can work on.
    fn min_image_size(&self) -> u32 {
        1
    }

    fn detect(&self, image: &GrayImage, frame: Frame, max_features: usize) -> Vec<FeaturePoint>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CornerResponse {
    /// Smallest eigenvalue of the structure tensor.
    ShiTomasi,
    /// `det - k * trace²`.
    Harris { k: Real },
}

/// Corner detector on the windowed structure tensor.
#[derive(Debug, Clone)]
pub struct StructureTensorDetector {
    pub response: CornerResponse,
    pub quality_level: Real,
    pub min_distance: Real,
    pub block_radius: usize,
    /// Pixels ignored along every edge.
    pub border: usize,
}

impl StructureTensorDetector {
    pub fn shi_tomasi(quality_level: Real, min_distance: Real) -> Self {
        Self {
            response: CornerResponse::ShiTomasi,
            quality_level,
            min_distance,
            block_radius: 2,
            border: 8,
        }
    }

    pub fn harris(k: Real, quality_level: Real, min_distance: Real) -> Self {
        Self {
            response: CornerResponse::Harris { k },
            ..Self::shi_tomasi(quality_level, min_distance)
        }
    }

    fn response_map(&self, img: &FloatImage) -> (Vec<f32>, Vec<f32>) {
        let (w, h) = (img.width(), img.height());
        let mut ixx = vec![0.0f32; w * h];
        let mut iyy = vec![0.0f32; w * h];
        let mut ixy = vec![0.0f32; w * h];
        let mut angle = vec![0.0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                let (gx, gy) = img.gradient(x, y);
                let i = y * w + x;
                ixx[i] = gx * gx;
                iyy[i] = gy * gy;
                ixy[i] = gx * gy;
                angle[i] = gy.atan2(gx);
            }
        }

        let r = self.block_radius;
        let mut response = vec![0.0f32; w * h];
        for y in r..h.saturating_sub(r) {
            for x in r..w.saturating_sub(r) {
                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
                for yy in y - r..=y + r {
                    let row = yy * w;
                    for xx in x - r..=x + r {
                        a += ixx[row + xx];
                        b += ixy[row + xx];
                        c += iyy[row + xx];
                    }
                }
                response[y * w + x] = match self.response {
                    CornerResponse::ShiTomasi => {
                        let half_tr = 0.5 * (a + c);
                        let disc = (0.25 * (a - c) * (a - c) + b * b).sqrt();
                        half_tr - disc
                    }
                    CornerResponse::Harris { k } => {
                        let det = a * c - b * b;
                        let tr = a + c;
                        det - k as f32 * tr * tr
                    }
                };
            }
        }
        (response, angle)
    }
}

impl FeatureDetectorBackend for StructureTensorDetector {
    fn kind(&self) -> DetectorKind {
        match self.response {
            CornerResponse::ShiTomasi => DetectorKind::ShiTomasi,
            CornerResponse::Harris { .. } => DetectorKind::Harris,
        }
    }

    fn min_image_size(&self) -> u32 {
        (2 * (self.border.max(self.block_radius + 1)) + 3) as u32
    }

    fn detect(&self, image: &GrayImage, _frame: Frame, max_features: usize) -> Vec<FeaturePoint> {
        if max_features == 0 {
            return Vec::new();
        }
        let img = FloatImage::from_gray(image);
        let (w, h) = (img.width(), img.height());
        let (response, angle) = self.response_map(&img);

        let max_response = response.iter().copied().fold(0.0f32, f32::max);
        if max_response <= 0.0 {
            return Vec::new();
        }
        let threshold = max_response * self.quality_level as f32;

        // 3x3 non-maximum suppression inside the border.
        let border = self.border.max(self.block_radius + 1);
        let mut candidates = Vec::new();
        for y in border..h.saturating_sub(border) {
            for x in border..w.saturating_sub(border) {
                let v = response[y * w + x];
                if v < threshold || v <= 0.0 {
                    continue;
                }
                let is_max = (y - 1..=y + 1).all(|yy| {
                    (x - 1..=x + 1).all(|xx| (xx == x && yy == y) || response[yy * w + xx] <= v)
                });
                if is_max {
                    candidates.push((v, x, y));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let min_d2 = self.min_distance * self.min_distance;
        let mut selected: Vec<FeaturePoint> = Vec::new();
        for (v, x, y) in candidates {
            if selected.len() >= max_features {
                break;
            }
            let p = Pt2::new(x as Real + 0.5, y as Real + 0.5);
            if selected
                .iter()
                .any(|s| (s.position - p).norm_squared() < min_d2)
            {
                continue;
            }
            selected.push(FeaturePoint {
                position: p,
                strength: v as Real,
                scale: (2 * self.block_radius + 1) as Real,
                orientation: angle[y * w + x] as Real,
            });
        }
        selected
    }
}

/// Deterministic jittered grid, usable on any image.
///
/// Points vary with `seed` and frame but are reproducible.
#[derive(Debug, Clone)]
pub struct GridFallbackDetector {
    pub seed: u64,
    /// Fraction of the image kept clear at each edge.
    pub margin: Real,
}

impl GridFallbackDetector {
    pub fn new(seed: u64) -> Self {
        Self { seed, margin: 0.05 }
    }
}

impl FeatureDetectorBackend for GridFallbackDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Fallback
    }

    fn detect(&self, image: &GrayImage, frame: Frame, max_features: usize) -> Vec<FeaturePoint> {
        let (w, h) = (image.width() as Real, image.height() as Real);
        if max_features == 0 || w < 1.0 || h < 1.0 {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(self.seed ^ (frame as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));

        let x0 = w * self.margin;
        let y0 = h * self.margin;
        let span_x = w - 2.0 * x0;
        let span_y = h - 2.0 * y0;
        let cols = ((max_features as Real * span_x / span_y.max(1.0)).sqrt().ceil() as usize).max(1);
        let rows = max_features.div_ceil(cols).max(1);
        let cell_w = span_x / cols as Real;
        let cell_h = span_y / rows as Real;

        let mut features = Vec::with_capacity(max_features);
        'grid: for r in 0..rows {
            for c in 0..cols {
                if features.len() >= max_features {
                    break 'grid;
                }
                let jx: Real = rng.random_range(0.15..0.85);
                let jy: Real = rng.random_range(0.15..0.85);
                features.push(FeaturePoint {
                    position: Pt2::new(x0 + (c as Real + jx) * cell_w, y0 + (r as Real + jy) * cell_h),
                    strength: rng.random::<Real>(),
                    scale: 1.0,
                    orientation: 0.0,
                });
            }
        }
        features.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        features
    }
}

/// Runs the configured backend, enforces the feature cap and falls back to
/// the grid detector when the backend cannot produce anything.
pub struct FeatureDetectorEngine {
    backend: Box<dyn FeatureDetectorBackend>,
    fallback: GridFallbackDetector,
    max_features: usize,
    fallback_on_empty: bool,
}

impl FeatureDetectorEngine {
    pub fn new(backend: Box<dyn FeatureDetectorBackend>, max_features: usize) -> Self {
        Self {
            backend,
            fallback: GridFallbackDetector::new(0),
            max_features,
            fallback_on_empty: true,
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        let backend: Box<dyn FeatureDetectorBackend> = match config.detector {
            DetectorKind::ShiTomasi => Box::new(StructureTensorDetector::shi_tomasi(
                config.quality_level,
                config.min_distance_px,
            )),
            DetectorKind::Harris => Box::new(StructureTensorDetector::harris(
                config.harris_k,
                config.quality_level,
                config.min_distance_px,
            )),
            DetectorKind::Fallback => Box::new(GridFallbackDetector::new(config.seed)),
        };
        Self {
            backend,
            fallback: GridFallbackDetector::new(config.seed),
            max_features: config.max_features,
            fallback_on_empty: config.fallback_on_empty,
        }
    }

    pub fn kind(&self) -> DetectorKind {
        self.backend.kind()
    }

    pub fn max_features(&self) -> usize {
        self.max_features
    }

    pub fn set_max_features(&mut self, max_features: usize) {
        self.max_features = max_features;
    }

    pub fn detect(&self, image: &GrayImage, frame: Frame) -> DetectionResult {
        self.detect_capped(image, frame, self.max_features)
    }

    /// Like [`Self::detect`] with a lower cap for this call.
    pub fn detect_capped(&self, image: &GrayImage, frame: Frame, cap: usize) -> DetectionResult {
        let start = Instant::now();
        let cap = cap.min(self.max_features);
        let mut warnings = Vec::new();
        let mut detector = self.backend.kind();

        let min_side = self.backend.min_image_size();
        let too_small = image.width() < min_side || image.height() < min_side;
        let mut features = if too_small {
            let msg = format!(
                "frame {frame}: {}x{} image too small for {:?} detector",
                image.width(),
                image.height(),
                detector
            );
            warn!("{msg}");
            warnings.push(msg);
            Vec::new()
        } else {
            self.backend.detect(image, frame, cap)
        };

        let needs_fallback = features.is_empty()
            && cap > 0
            && detector != DetectorKind::Fallback
            && (too_small || self.fallback_on_empty);
        if needs_fallback {
            let msg = format!("frame {frame}: {:?} found no features, using grid fallback", detector);
            warn!("{msg}");
            warnings.push(msg);
            features = self.fallback.detect(image, frame, cap);
            detector = DetectorKind::Fallback;
        }

        features.truncate(cap);
        let elapsed = start.elapsed();
        debug!(
            "frame {frame}: {} features from {:?} in {:?}",
            features.len(),
            detector,
            elapsed
        );
        DetectionResult {
            frame,
            features,
            detector,
            elapsed,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchmove_core::synthetic::{random_blob_centers, render_blobs};

    fn blob_image() -> (GrayImage, Vec<Pt2>) {
        let centers = random_blob_centers(160, 120, 12, 20.0, 5);
        (render_blobs(160, 120, &centers, 2.0), centers)
    }

    #[test]
    fn shi_tomasi_finds_blobs_and_respects_cap() {
        let (img, centers) = blob_image();
        let det = StructureTensorDetector::shi_tomasi(0.05, 5.0);
        let all = det.detect(&img, 0, 1000);
        assert!(!all.is_empty());
        // Every strong response sits near a blob.
        for f in &all {
            let near = centers.iter().map(|c| (c - f.position).norm()).fold(Real::MAX, Real::min);
            assert!(near < 8.0, "feature {:?} far from blobs", f.position);
        }
        assert!(det.detect(&img, 0, 3).len() <= 3);
    }

    #[test]
    fn selected_features_respect_min_distance() {
        let (img, _) = blob_image();
        let det = StructureTensorDetector::harris(0.04, 0.01, 12.0);
        let feats = det.detect(&img, 0, 100);
        for (i, a) in feats.iter().enumerate() {
            for b in &feats[i + 1..] {
                assert!((a.position - b.position).norm() >= 12.0);
            }
        }
    }

    #[test]
    fn grid_fallback_is_deterministic_and_varies_per_frame() {
        let img = GrayImage::new(320, 240);
        let det = GridFallbackDetector::new(42);
        let a = det.detect(&img, 3, 50);
        let b = det.detect(&img, 3, 50);
        let c = det.detect(&img, 4, 50);
        assert_eq!(a.len(), 50);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a
            .iter()
            .all(|f| f.position.x > 0.0 && f.position.x < 320.0 && f.position.y > 0.0 && f.position.y < 240.0));
    }

    #[test]
    fn engine_falls_back_on_flat_image() {
        let config = TrackingConfig {
            max_features: 25,
            ..TrackingConfig::default()
        };
        let engine = FeatureDetectorEngine::from_config(&config);
        let flat = GrayImage::from_pixel(200, 150, image::Luma([90]));
        let result = engine.detect(&flat, 7);
        assert_eq!(result.detector, DetectorKind::Fallback);
        assert_eq!(result.features.len(), 25);
        assert_eq!(result.warnings.len(), 1);

        let tiny = GrayImage::new(6, 6);
        let result = engine.detect(&tiny, 7);
        assert_eq!(result.detector, DetectorKind::Fallback);
        assert!(result.features.len() <= 25);
    }

    #[test]
    fn engine_never_exceeds_cap() {
        let (img, _) = blob_image();
        let config = TrackingConfig {
            max_features: 4,
            min_distance_px: 1.0,
            ..TrackingConfig::default()
        };
        let engine = FeatureDetectorEngine::from_config(&config);
        let result = engine.detect(&img, 0);
        assert!(result.features.len() <= 4);
        assert_eq!(result.detector, DetectorKind::ShiTomasi);
    }
}
