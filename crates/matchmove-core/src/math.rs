use nalgebra::{Isometry3, Matrix3, Matrix4, Point2, Point3, Vector2, Vector3};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Mat4 = Matrix4<Real>;
pub type Iso3 = Isometry3<Real>;

/// Frame number inside a shot. Sequences may start at any integer, including negatives.
pub type Frame = i64;

pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Summary statistics over a set of non-negative errors.
///
/// `min <= mean <= max` holds whenever `count > 0`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorStats {
    pub mean: Real,
    pub rms: Real,
    pub min: Real,
    pub max: Real,
    pub count: usize,
}

impl ErrorStats {
    /// Accumulate statistics; returns `None` for an empty input.
    pub fn from_errors<I: IntoIterator<Item = Real>>(errors: I) -> Option<Self> {
        let mut sum = 0.0_f64;
        let mut sum_sq = 0.0_f64;
        let mut min = Real::INFINITY;
        let mut max = 0.0_f64;
        let mut count = 0usize;

        for err in errors {
            if !err.is_finite() {
                continue;
            }
            sum += err;
            sum_sq += err * err;
            min = min.min(err);
            max = max.max(err);
            count += 1;
        }

        if count == 0 {
            return None;
        }

        let n = count as Real;
        // Rounding can push the mean a hair outside [min, max] for near-constant inputs.
        let mean = (sum / n).clamp(min, max);
        Some(Self {
            mean,
            rms: (sum_sq / n).sqrt(),
            min,
            max,
            count,
        })
    }
}
