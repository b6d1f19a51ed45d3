//! 2D similarity transforms (Umeyama).

use anyhow::Result;
use matchmove_core::{Pt2, Real, Vec2};
use nalgebra::{Matrix2, Rotation2};
use serde::{Deserialize, Serialize};

/// `dst = scale * R(angle) * src + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Similarity2 {
    pub scale: Real,
    pub angle: Real,
    pub translation: Vec2,
}

impl Similarity2 {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            angle: 0.0,
            translation: Vec2::zeros(),
        }
    }

    pub fn apply(&self, p: &Pt2) -> Pt2 {
        Pt2::from(self.scale * (Rotation2::new(self.angle) * p.coords) + self.translation)
    }
}

/// Least-squares similarity mapping `src` onto `dst` (at least 2 points).
pub fn fit_similarity_2d(src: &[Pt2], dst: &[Pt2]) -> Result<Similarity2> {
    let n = src.len();
    if n < 2 || dst.len() != n {
        anyhow::bail!("need at least 2 matching points, got {n}");
    }
    let nr = n as Real;
    let mu_s = src.iter().fold(Vec2::zeros(), |acc, p| acc + p.coords) / nr;
    let mu_d = dst.iter().fold(Vec2::zeros(), |acc, p| acc + p.coords) / nr;

    let mut cov = Matrix2::<Real>::zeros();
    let mut var_s = 0.0;
    for (s, d) in src.iter().zip(dst) {
        let ds = s.coords - mu_s;
        let dd = d.coords - mu_d;
        cov += dd * ds.transpose();
        var_s += ds.norm_squared();
    }
    cov /= nr;
    var_s /= nr;
    if var_s <= Real::EPSILON {
        anyhow::bail!("source points are coincident");
    }

    // For 2x2 the optimal rotation has a closed form.
    let angle = (cov[(1, 0)] - cov[(0, 1)]).atan2(cov[(0, 0)] + cov[(1, 1)]);
    let rot = Rotation2::new(angle);
    let trace = (rot.matrix().transpose() * cov).trace();
    let scale = trace / var_s;
    if !scale.is_finite() || scale <= 0.0 {
        anyhow::bail!("degenerate similarity fit");
    }

    Ok(Similarity2 {
        scale,
        angle,
        translation: mu_d - scale * (rot * mu_s),
    })
}
