//! Float images and pyramids for the detector and the flow tracker.
//!
//! Continuous coordinates put pixel `i` on `[i, i + 1)` with its center at
//! `i + 0.5`, matching `uv * size`.

use image::GrayImage;

#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl FloatImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_gray(img: &GrayImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.width + x] = v;
    }

    /// Bilinear sample at a continuous position, clamped to the border.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let fx = (x - 0.5).clamp(0.0, max_x);
        let fy = (y - 0.5).clamp(0.0, max_y);
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let ax = fx - x0 as f32;
        let ay = fy - y0 as f32;

        let top = self.get(x0, y0) * (1.0 - ax) + self.get(x1, y0) * ax;
        let bottom = self.get(x0, y1) * (1.0 - ax) + self.get(x1, y1) * ax;
        top * (1.0 - ay) + bottom * ay
    }

    /// Central-difference gradient at integer pixel `(x, y)`.
    pub fn gradient(&self, x: usize, y: usize) -> (f32, f32) {
        let xl = x.saturating_sub(1);
        let xr = (x + 1).min(self.width - 1);
        let yu = y.saturating_sub(1);
        let yd = (y + 1).min(self.height - 1);
        let gx = (self.get(xr, y) - self.get(xl, y)) / (xr - xl).max(1) as f32;
        let gy = (self.get(x, yd) - self.get(x, yu)) / (yd - yu).max(1) as f32;
        (gx, gy)
    }

    /// Half-resolution image by 2x2 box averaging.
    pub fn downsample(&self) -> FloatImage {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        let mut out = FloatImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let x0 = (2 * x).min(self.width - 1);
                let y0 = (2 * y).min(self.height - 1);
                let x1 = (x0 + 1).min(self.width - 1);
                let y1 = (y0 + 1).min(self.height - 1);
                let v = 0.25 * (self.get(x0, y0) + self.get(x1, y0) + self.get(x0, y1) + self.get(x1, y1));
                out.set(x, y, v);
            }
        }
        out
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f32 && y < self.height as f32
    }
}

/// Coarse-to-fine image pyramid; level 0 is full resolution.
#[derive(Debug, Clone)]
pub struct Pyramid {
    pub levels: Vec<FloatImage>,
}

impl Pyramid {
    /// Build up to `num_levels` levels, stopping before a level would be
    /// smaller than `min_size` pixels on a side.
    pub fn build(base: FloatImage, num_levels: usize, min_size: usize) -> Self {
        let mut levels = vec![base];
        while levels.len() < num_levels.max(1) {
            let Some(last) = levels.last() else { break };
            if last.width() / 2 < min_size || last.height() / 2 < min_size {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn ramp(w: u32, h: u32) -> FloatImage {
        FloatImage::from_gray(&GrayImage::from_fn(w, h, |x, _| Luma([(x * 10) as u8])))
    }

    #[test]
    fn sample_hits_pixel_centers() {
        let img = ramp(8, 4);
        assert_eq!(img.sample(2.5, 1.5), 20.0);
        assert!((img.sample(3.0, 1.5) - 25.0).abs() < 1e-5);
        // Clamped outside.
        assert_eq!(img.sample(-5.0, 1.5), 0.0);
    }

    #[test]
    fn gradient_of_ramp() {
        let img = ramp(8, 4);
        assert_eq!(img.gradient(3, 2), (10.0, 0.0));
    }

    #[test]
    fn pyramid_halves_until_min_size() {
        let pyr = Pyramid::build(ramp(64, 32), 5, 8);
        let sizes: Vec<_> = pyr.levels.iter().map(|l| (l.width(), l.height())).collect();
        assert_eq!(sizes, vec![(64, 32), (32, 16), (16, 8)]);
        // Box average of columns 0 and 1 -> 5.
        assert_eq!(pyr.levels[1].get(0, 0), 5.0);
    }
}
