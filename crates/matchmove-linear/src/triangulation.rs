use anyhow::Result;
use matchmove_core::{Iso3, Pt2, Pt3, Real};
use nalgebra::DMatrix;

use crate::math::Mat34;

/// `[R | t]` of a camera-from-world pose, for normalized image coordinates.
pub fn camera_matrix(cam_from_world: &Iso3) -> Mat34 {
    cam_from_world.to_homogeneous().fixed_view::<3, 4>(0, 0).into_owned()
}

/// Linear triangulation from two or more views using DLT.
///
/// `cameras` are projection matrices and `points` the matching image
/// coordinates. The point is returned in the world frame of the cameras.
pub fn triangulate_point_linear(cameras: &[Mat34], points: &[Pt2]) -> Result<Pt3> {
    if cameras.len() < 2 {
        anyhow::bail!("need at least 2 views, got {}", cameras.len());
    }
    if cameras.len() != points.len() {
        anyhow::bail!(
            "mismatched number of cameras ({}) and points ({})",
            cameras.len(),
            points.len()
        );
    }

    let mut a = DMatrix::<Real>::zeros(2 * cameras.len(), 4);
    for (i, (p, cam)) in points.iter().zip(cameras).enumerate() {
        a.row_mut(2 * i).copy_from(&(p.x * cam.row(2) - cam.row(0)));
        a.row_mut(2 * i + 1).copy_from(&(p.y * cam.row(2) - cam.row(1)));
    }

    let svd = a.svd(true, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow::anyhow!("svd failed during triangulation"))?;
    let x_h = v_t.row(v_t.nrows() - 1);
    let w = x_h[3];
    if w.abs() <= Real::EPSILON {
        anyhow::bail!("triangulated point at infinity");
    }
    Ok(Pt3::new(x_h[0] / w, x_h[1] / w, x_h[2] / w))
}
