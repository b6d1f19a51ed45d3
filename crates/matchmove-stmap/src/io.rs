//! Writers for generated maps.
//!
//! Red/green carry UV, blue is zero and alpha opaque. When an encoder is
//! compiled out the writer produces the JSON metadata file instead, next to
//! the requested path.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use matchmove_core::DistortionCoefficients;
use serde::{Deserialize, Serialize};

use crate::config::{BitDepth, STMapConfig};
use crate::generator::STMapResult;
use crate::StMapError;

/// Samples per axis stored in the metadata file.
const METADATA_GRID: u32 = 9;

/// Text description of a map, with a coarse grid of its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct STMapMetadata {
    pub profile: String,
    pub config: STMapConfig,
    pub coefficients: DistortionCoefficients,
    /// `(x, y, u, v)` on an evenly spaced pixel grid including the corners.
    pub samples: Vec<(u32, u32, f32, f32)>,
}

impl STMapMetadata {
    pub fn from_result(result: &STMapResult) -> Self {
        let grid = |n: u32| -> Vec<u32> {
            if n <= 1 {
                return vec![0];
            }
            let steps = METADATA_GRID.min(n) - 1;
            let mut v: Vec<u32> = (0..=steps).map(|i| i * (n - 1) / steps).collect();
            v.dedup();
            v
        };
        let mut samples = Vec::new();
        for y in grid(result.height()) {
            for x in grid(result.width()) {
                if let Some(uv) = result.uv_at(x, y) {
                    samples.push((x, y, uv.x as f32, uv.y as f32));
                }
            }
        }
        Self {
            profile: result.profile_name.clone(),
            config: result.config.clone(),
            coefficients: result.coefficients,
            samples,
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), StMapError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|source| StMapError::Io {
            path: dir.to_path_buf(),
            source,
        }),
        _ => Ok(()),
    }
}

#[cfg(any(feature = "png", feature = "exr"))]
fn save_image(image: image::DynamicImage, path: &Path, format: image::ImageFormat) -> Result<PathBuf, StMapError> {
    ensure_parent(path)?;
    image.save_with_format(path, format)?;
    Ok(path.to_path_buf())
}

impl STMapResult {
    /// Write the JSON metadata description.
    pub fn save_metadata(&self, path: impl AsRef<Path>) -> Result<PathBuf, StMapError> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let text = serde_json::to_string_pretty(&STMapMetadata::from_result(self))?;
        fs::write(path, text).map_err(|source| StMapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(path.to_path_buf())
    }

    #[cfg(not(all(feature = "png", feature = "exr")))]
    fn save_fallback(&self, path: &Path, encoder: &str) -> Result<PathBuf, StMapError> {
        let fallback = path.with_extension("json");
        warn!(
            "{encoder} support is not compiled in; writing metadata to {}",
            fallback.display()
        );
        self.save_metadata(fallback)
    }

    /// Write an 8- or 16-bit PNG. A 32-bit request is written as 16-bit.
    ///
    /// Returns the path actually written.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<PathBuf, StMapError> {
        let path = path.as_ref();
        #[cfg(feature = "png")]
        {
            use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};

            let (w, h) = (self.width(), self.height());
            let image = match self.config.bit_depth {
                BitDepth::Eight => {
                    let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
                    DynamicImage::ImageRgba8(ImageBuffer::from_fn(w, h, |x, y| {
                        let [u, v] = self.uv[(y * w + x) as usize];
                        Rgba([q(u), q(v), 0, u8::MAX])
                    }))
                }
                depth => {
                    if depth == BitDepth::ThirtyTwo {
                        warn!("PNG cannot hold 32-bit float; writing 16-bit to {}", path.display());
                    }
                    let q = |c: f32| (c.clamp(0.0, 1.0) * 65535.0).round() as u16;
                    let buf: ImageBuffer<Rgba<u16>, Vec<u16>> = ImageBuffer::from_fn(w, h, |x, y| {
                        let [u, v] = self.uv[(y * w + x) as usize];
                        Rgba([q(u), q(v), 0, u16::MAX])
                    });
                    DynamicImage::ImageRgba16(buf)
                }
            };
            save_image(image, path, ImageFormat::Png)
        }
        #[cfg(not(feature = "png"))]
        {
            self.save_fallback(path, "PNG")
        }
    }

    /// Write a 32-bit float RGBA OpenEXR file, unclamped.
    pub fn save_exr(&self, path: impl AsRef<Path>) -> Result<PathBuf, StMapError> {
        let path = path.as_ref();
        #[cfg(feature = "exr")]
        {
            use image::{DynamicImage, ImageFormat, Rgba, Rgba32FImage};

            let w = self.width();
            let buf = Rgba32FImage::from_fn(w, self.height(), |x, y| {
                let [u, v] = self.uv[(y * w + x) as usize];
                Rgba([u, v, 0.0, 1.0])
            });
            save_image(DynamicImage::ImageRgba32F(buf), path, ImageFormat::OpenExr)
        }
        #[cfg(not(feature = "exr"))]
        {
            self.save_fallback(path, "OpenEXR")
        }
    }

    /// Write with the format matching the configured bit depth.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf, StMapError> {
        match self.config.bit_depth {
            BitDepth::ThirtyTwo => self.save_exr(path),
            _ => self.save_png(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::STMapGenerator;

    fn map(bit_depth: BitDepth) -> STMapResult {
        STMapGenerator::new(STMapConfig {
            width: 20,
            height: 10,
            bit_depth,
            ..STMapConfig::default()
        })
        .generate_from_coefficients(DistortionCoefficients::radial(-0.1, 0.0, 0.0), None)
        .unwrap()
    }

    #[test]
    fn metadata_grid_includes_corners() {
        let meta = STMapMetadata::from_result(&map(BitDepth::Eight));
        assert!(meta.samples.iter().any(|s| s.0 == 0 && s.1 == 0));
        assert!(meta.samples.iter().any(|s| s.0 == 19 && s.1 == 9));
        assert_eq!(meta.samples.len(), 9 * 9);
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = map(BitDepth::Sixteen).save_metadata(dir.path().join("nested/map.json")).unwrap();
        let text = fs::read_to_string(path).unwrap();
        let meta: STMapMetadata = serde_json::from_str(&text).unwrap();
        assert_eq!(meta.config.width, 20);
        assert_eq!(meta.coefficients.k1, -0.1);
    }

    #[cfg(feature = "png")]
    #[test]
    fn png_stores_uv_in_red_green() {
        let dir = tempfile::tempdir().unwrap();
        let result = map(BitDepth::Sixteen);
        let path = result.save_png(dir.path().join("map.png")).unwrap();
        let img = image::open(&path).unwrap().into_rgba16();
        let px = img.get_pixel(10, 5);
        let uv = result.uv_at(10, 5).unwrap();
        assert!((px[0] as f64 / 65535.0 - uv.x).abs() < 1e-4);
        assert!((px[1] as f64 / 65535.0 - uv.y).abs() < 1e-4);
        assert_eq!(px[2], 0);
        assert_eq!(px[3], u16::MAX);
    }

    #[cfg(feature = "png")]
    #[test]
    fn thirty_two_bit_png_is_written_as_sixteen() {
        let dir = tempfile::tempdir().unwrap();
        let path = map(BitDepth::ThirtyTwo).save_png(dir.path().join("map.png")).unwrap();
        let img = image::open(path).unwrap();
        assert_eq!(img.color(), image::ColorType::Rgba16);
    }

    #[cfg(feature = "exr")]
    #[test]
    fn exr_keeps_float_precision() {
        let dir = tempfile::tempdir().unwrap();
        let result = map(BitDepth::ThirtyTwo);
        let path = result.save(dir.path().join("map.exr")).unwrap();
        let img = image::open(path).unwrap().into_rgba32f();
        let uv = result.uv_at(3, 7).unwrap();
        assert!((img.get_pixel(3, 7)[0] as f64 - uv.x).abs() < 1e-6);
        assert_eq!(img.get_pixel(3, 7)[3], 1.0);
    }
}
