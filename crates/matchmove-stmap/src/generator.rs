//! Per-pixel UV map evaluation.

use log::debug;
use matchmove_core::{
    CameraProfile, CameraProfileManager, DistortionCoefficients, LensSpace, Progress,
    ProgressCallback, Pt2, Real,
};

use crate::config::STMapConfig;
use crate::StMapError;

/// Rows evaluated between progress reports.
const PROGRESS_ROWS: u32 = 64;

/// Generated map: one source UV per output pixel, row-major, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct STMapResult {
    pub config: STMapConfig,
    pub profile_name: String,
    pub coefficients: DistortionCoefficients,
    pub(crate) uv: Vec<[f32; 2]>,
}

impl STMapResult {
    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Stored UV of pixel `(x, y)`.
    pub fn uv_at(&self, x: u32, y: u32) -> Option<Pt2> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let [u, v] = self.uv[(y as usize) * (self.width() as usize) + x as usize];
        Some(Pt2::new(u as Real, v as Real))
    }

    pub fn samples(&self) -> &[[f32; 2]] {
        &self.uv
    }

    /// Stored UVs falling outside `[0, 1]²`, e.g. from overscan or strong
    /// distortion near the corners.
    pub fn out_of_range_count(&self) -> usize {
        self.uv
            .iter()
            .filter(|[u, v]| !(0.0..=1.0).contains(u) || !(0.0..=1.0).contains(v))
            .count()
    }
}

/// Builds ST-maps for a fixed output configuration.
#[derive(Debug, Clone, Default)]
pub struct STMapGenerator {
    pub config: STMapConfig,
}

impl STMapGenerator {
    pub fn new(config: STMapConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, profile: &CameraProfile, progress: Option<ProgressCallback<'_>>) -> Result<STMapResult, StMapError> {
        self.evaluate(&profile.name, profile.distortion_coefficients(), progress)
    }

    pub fn generate_from_coefficients(
        &self,
        coefficients: DistortionCoefficients,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<STMapResult, StMapError> {
        self.evaluate("custom", coefficients, progress)
    }

    /// Look the profile up by name; an unknown name is an error.
    pub fn generate_from_name(
        &self,
        manager: &CameraProfileManager,
        name: &str,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<STMapResult, StMapError> {
        let profile = manager
            .get(name)
            .ok_or_else(|| StMapError::UnknownProfile(name.to_string()))?;
        self.generate(profile, progress)
    }

    fn evaluate(
        &self,
        name: &str,
        coefficients: DistortionCoefficients,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<STMapResult, StMapError> {
        let config = &self.config;
        let (w, h) = (config.width, config.height);
        if w == 0 || h == 0 {
            return Err(StMapError::InvalidResolution { width: w, height: h });
        }
        let mut progress = Progress::new(progress);
        let space = LensSpace::new(w as Real, h as Real);
        let zoom = 1.0 + config.overscan.max(-0.9);
        let identity = coefficients.is_zero();

        let mut uv = Vec::with_capacity(w as usize * h as usize);
        for y in 0..h {
            let v = (y as Real + 0.5) / h as Real;
            for x in 0..w {
                let u = (x as Real + 0.5) / w as Real;
                let (lx, ly) = space.uv_to_lens(u, v);
                let (lx, ly) = (lx * zoom, ly * zoom);
                let (mx, my) = if identity {
                    (lx, ly)
                } else if config.encode_undistort {
                    coefficients.apply(lx, ly)
                } else {
                    coefficients.remove(lx, ly)
                };
                let (su, sv) = space.lens_to_uv(mx, my);
                uv.push([su as f32, sv as f32]);
            }
            if (y + 1) % PROGRESS_ROWS == 0 {
                progress.report_span(0.0, 1.0, (y + 1) as usize, h as usize, "generating");
            }
        }
        progress.finish("done");
        debug!("generated {w}x{h} ST-map for {name}");

        Ok(STMapResult {
            config: config.clone(),
            profile_name: name.to_string(),
            coefficients,
            uv,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BitDepth;

    fn small(encode_undistort: bool) -> STMapGenerator {
        STMapGenerator::new(STMapConfig {
            width: 64,
            height: 36,
            bit_depth: BitDepth::Sixteen,
            encode_undistort,
            overscan: 0.0,
        })
    }

    #[test]
    fn zero_distortion_is_identity() {
        let map = small(true)
            .generate_from_coefficients(DistortionCoefficients::ZERO, None)
            .unwrap();
        for (x, y) in [(0, 0), (31, 17), (63, 35)] {
            let uv = map.uv_at(x, y).unwrap();
            assert!((uv.x - (x as Real + 0.5) / 64.0).abs() < 1e-6);
            assert!((uv.y - (y as Real + 0.5) / 36.0).abs() < 1e-6);
        }
        assert_eq!(map.out_of_range_count(), 0);
    }

    #[test]
    fn undistort_and_distort_maps_are_inverse() {
        let c = DistortionCoefficients::radial(-0.12, 0.02, 0.0);
        let fwd = small(true).generate_from_coefficients(c, None).unwrap();
        let inv = small(false).generate_from_coefficients(c, None).unwrap();
        let space = LensSpace::new(64.0, 36.0);
        let p = fwd.uv_at(10, 8).unwrap();
        let (lx, ly) = space.uv_to_lens(p.x, p.y);
        let (bx, by) = c.remove(lx, ly);
        let (u, v) = space.lens_to_uv(bx, by);
        assert!((u - 10.5 / 64.0).abs() < 1e-5 && (v - 8.5 / 36.0).abs() < 1e-5);
        assert_ne!(fwd.uv_at(10, 8), inv.uv_at(10, 8));
    }

    #[test]
    fn overscan_samples_beyond_frame() {
        let generator = STMapGenerator::new(STMapConfig {
            width: 32,
            height: 32,
            overscan: 0.2,
            ..STMapConfig::default()
        });
        let map = generator
            .generate_from_coefficients(DistortionCoefficients::ZERO, None)
            .unwrap();
        assert!(map.uv_at(0, 0).unwrap().x < 0.0);
        assert!(map.out_of_range_count() > 0);
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let generator = STMapGenerator::new(STMapConfig {
            width: 0,
            ..STMapConfig::default()
        });
        assert!(matches!(
            generator.generate_from_coefficients(DistortionCoefficients::ZERO, None),
            Err(StMapError::InvalidResolution { width: 0, .. })
        ));
    }
}
