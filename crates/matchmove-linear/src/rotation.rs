//! Rotation between two sets of bearing vectors (Kabsch).

use anyhow::Result;
use matchmove_core::{Mat3, Real, Vec3};
use nalgebra::{Rotation3, UnitQuaternion};

/// Rotation `R` minimising `Σ |dst_i - R src_i|²` over unit bearings.
///
/// Needs at least 3 vectors that are not all parallel. Inputs are
/// normalized internally.
pub fn fit_rotation_3d(src: &[Vec3], dst: &[Vec3]) -> Result<UnitQuaternion<Real>> {
    let n = src.len();
    if n < 3 || dst.len() != n {
        anyhow::bail!("need at least 3 matching bearings, got {n}");
    }

    let mut h = Mat3::zeros();
    for (s, d) in src.iter().zip(dst) {
        let (ns, nd) = (s.norm(), d.norm());
        if ns <= Real::EPSILON || nd <= Real::EPSILON {
            anyhow::bail!("zero-length bearing");
        }
        h += (d / nd) * (s / ns).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or_else(|| anyhow::anyhow!("svd failed in rotation fit"))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow::anyhow!("svd failed in rotation fit"))?;
    if svd.singular_values[1] <= 1e-12 {
        anyhow::bail!("bearings are collinear");
    }
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }
    Ok(UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r)))
}
