//! Direct Linear Transform pose from 3D-2D correspondences.

use anyhow::Result;
use matchmove_core::{Iso3, Pt2, Pt3, Real};
use nalgebra::{DMatrix, Isometry3, Rotation3, Translation3, UnitQuaternion};

use crate::math::{mat34_from_svd_row, normalize_points_3d};

/// Linear PnP on normalized image coordinates (`K^-1` applied, distortion
/// removed). Needs at least 6 non-coplanar points.
///
/// The 3x3 block of the DLT solution is projected onto SO(3). Returns
/// `T_C_W`, the transform from world to camera coordinates.
pub fn pnp_dlt(world: &[Pt3], normalized: &[Pt2]) -> Result<Iso3> {
    let n = world.len();
    if n < 6 || normalized.len() != n {
        anyhow::bail!("need at least 6 point correspondences, got {n}");
    }

    let (world_n, t_world) = normalize_points_3d(world)
        .ok_or_else(|| anyhow::anyhow!("degenerate 3d point configuration"))?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 12);
    for (i, (pw, pi)) in world_n.iter().zip(normalized).enumerate() {
        let (x, y, z) = (pw.x, pw.y, pw.z);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -u * x;
        a[(r0, 9)] = -u * y;
        a[(r0, 10)] = -u * z;
        a[(r0, 11)] = -u;

        a[(r1, 4)] = x;
        a[(r1, 5)] = y;
        a[(r1, 6)] = z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -v * x;
        a[(r1, 9)] = -v * y;
        a[(r1, 10)] = -v * z;
        a[(r1, 11)] = -v;
    }

    let svd = a.svd(true, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow::anyhow!("svd failed in PnP DLT"))?;
    // P = P_norm * T_world
    let p_mtx = mat34_from_svd_row(&v_t, v_t.nrows() - 1) * t_world;

    let mut r_approx = p_mtx.fixed_view::<3, 3>(0, 0).into_owned();
    let mut s = (r_approx.row(0).norm() + r_approx.row(1).norm() + r_approx.row(2).norm()) / 3.0;
    if r_approx.determinant() < 0.0 {
        s = -s;
    }
    if s.abs() <= Real::EPSILON {
        anyhow::bail!("degenerate DLT solution");
    }
    r_approx /= s;

    let svd = r_approx.svd(true, true);
    let u = svd.u.ok_or_else(|| anyhow::anyhow!("svd failed in PnP DLT"))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow::anyhow!("svd failed in PnP DLT"))?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t = p_mtx.column(3).into_owned() / s;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    let pose = Isometry3::from_parts(Translation3::from(t), rot);

    // A mirrored solution puts the scene behind the camera.
    let in_front = world
        .iter()
        .filter(|p| pose.transform_point(p).z > 0.0)
        .count();
    if in_front * 2 < n {
        anyhow::bail!("DLT pose places most points behind the camera");
    }
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlt_recovers_pose() {
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let gt = Isometry3::from_parts(Translation3::new(0.1, -0.05, 1.0), rot.into());

        let mut world = Vec::new();
        let mut image = Vec::new();
        for z in 0..2 {
            for y in 0..3 {
                for x in 0..4 {
                    let pw = Pt3::new(x as Real * 0.1, y as Real * 0.1, 0.5 + z as Real * 0.1);
                    let pc = gt.transform_point(&pw);
                    world.push(pw);
                    image.push(Pt2::new(pc.x / pc.z, pc.y / pc.z));
                }
            }
        }

        let est = pnp_dlt(&world, &image).unwrap();
        assert!((est.translation.vector - gt.translation.vector).norm() < 1e-6);
        assert!(est.rotation.angle_to(&gt.rotation) < 1e-6);
    }

    #[test]
    fn rejects_too_few_points() {
        let world = vec![Pt3::new(0.0, 0.0, 1.0); 5];
        let image = vec![Pt2::new(0.0, 0.0); 5];
        assert!(pnp_dlt(&world, &image).is_err());
    }
}
