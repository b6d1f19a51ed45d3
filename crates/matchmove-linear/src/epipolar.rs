//! Two-view relative pose from the essential matrix.
//!
//! Convention: `X2 = R * X1 + t` and `x2ᵀ E x1 = 0` with `E = [t]x R`, for
//! points in normalized camera coordinates.

use anyhow::Result;
use matchmove_core::{Iso3, Mat3, Pt2, Pt3, Real, Vec3};
use nalgebra::{DMatrix, Rotation3, Translation3, UnitQuaternion};

use crate::math::{mat3_from_svd_row, normalize_points_2d, pad_to_square};
use crate::triangulation::{camera_matrix, triangulate_point_linear};

/// Normalized 8-point algorithm for the essential matrix.
///
/// Requires at least 8 correspondences. The result is projected onto the
/// essential manifold (singular values `(σ, σ, 0)`).
pub fn essential_8point(pts1: &[Pt2], pts2: &[Pt2]) -> Result<Mat3> {
    let n = pts1.len();
    if pts2.len() != n {
        anyhow::bail!("point count mismatch: {} vs {}", n, pts2.len());
    }
    if n < 8 {
        anyhow::bail!("need at least 8 correspondences, got {n}");
    }

    let (pts1_n, t1) =
        normalize_points_2d(pts1).ok_or_else(|| anyhow::anyhow!("degenerate points in view 1"))?;
    let (pts2_n, t2) =
        normalize_points_2d(pts2).ok_or_else(|| anyhow::anyhow!("degenerate points in view 2"))?;

    let mut a = DMatrix::<Real>::zeros(n, 9);
    for (i, (p1, p2)) in pts1_n.iter().zip(&pts2_n).enumerate() {
        let (x, y, xp, yp) = (p1.x, p1.y, p2.x, p2.y);
        a[(i, 0)] = xp * x;
        a[(i, 1)] = xp * y;
        a[(i, 2)] = xp;
        a[(i, 3)] = yp * x;
        a[(i, 4)] = yp * y;
        a[(i, 5)] = yp;
        a[(i, 6)] = x;
        a[(i, 7)] = y;
        a[(i, 8)] = 1.0;
    }

    let svd = pad_to_square(a).svd(true, true);
    let v_t = svd.v_t.ok_or_else(|| anyhow::anyhow!("svd failed"))?;
    let e_n = mat3_from_svd_row(&v_t, v_t.nrows() - 1);

    let e = t2.transpose() * e_n * t1;
    let e = enforce_essential_constraints(&e)?;
    let norm = e.norm();
    if !norm.is_finite() || norm <= Real::EPSILON {
        anyhow::bail!("degenerate essential matrix");
    }
    Ok(e / norm)
}

fn enforce_essential_constraints(e: &Mat3) -> Result<Mat3> {
    let svd = e.svd(true, true);
    let u = svd.u.ok_or_else(|| anyhow::anyhow!("svd failed"))?;
    let v_t = svd.v_t.ok_or_else(|| anyhow::anyhow!("svd failed"))?;
    let s = 0.5 * (svd.singular_values[0] + svd.singular_values[1]);
    Ok(u * Mat3::from_diagonal(&Vec3::new(s, s, 0.0)) * v_t)
}

/// The four `(R, t)` candidates of an essential matrix; `t` is unit length.
pub fn decompose_essential(e: &Mat3) -> Result<Vec<(Mat3, Vec3)>> {
    let e = enforce_essential_constraints(e)?;
    let svd = e.svd(true, true);
    let mut u = svd.u.ok_or_else(|| anyhow::anyhow!("svd failed"))?;
    let mut v_t = svd.v_t.ok_or_else(|| anyhow::anyhow!("svd failed"))?;
    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }

    let w = Mat3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t: Vec3 = u.column(2).normalize();

    Ok(vec![(r1, t), (r1, -t), (r2, t), (r2, -t)])
}

/// Pose of view 2 relative to view 1, with the correspondences that
/// triangulated in front of both cameras.
#[derive(Debug, Clone)]
pub struct RelativePose {
    /// `cam2_from_cam1`, translation has unit norm.
    pub pose: Iso3,
    pub points_in_front: usize,
    /// Triangulated point in view-1 coordinates, per correspondence; `None`
    /// when it failed or lies behind either camera.
    pub points: Vec<Option<Pt3>>,
}

/// Choose the essential decomposition with the most points in front of
/// both cameras.
pub fn recover_relative_pose(e: &Mat3, pts1: &[Pt2], pts2: &[Pt2]) -> Result<RelativePose> {
    if pts1.len() != pts2.len() {
        anyhow::bail!("point count mismatch: {} vs {}", pts1.len(), pts2.len());
    }
    let p1 = camera_matrix(&Iso3::identity());

    let mut best: Option<RelativePose> = None;
    for (r, t) in decompose_essential(e)? {
        let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
        let pose = Iso3::from_parts(Translation3::from(t), rot);
        let p2 = camera_matrix(&pose);

        let points: Vec<Option<Pt3>> = pts1
            .iter()
            .zip(pts2)
            .map(|(a, b)| {
                let x = triangulate_point_linear(&[p1, p2], &[*a, *b]).ok()?;
                let in_front = x.z > 0.0 && pose.transform_point(&x).z > 0.0;
                in_front.then_some(x)
            })
            .collect();
        let points_in_front = points.iter().flatten().count();

        if best
            .as_ref()
            .map_or(true, |b| points_in_front > b.points_in_front)
        {
            best = Some(RelativePose {
                pose,
                points_in_front,
                points,
            });
        }
    }

    match best {
        Some(b) if b.points_in_front > 0 => Ok(b),
        _ => anyhow::bail!("no decomposition places points in front of both cameras"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::skew;

    fn scene() -> (Iso3, Vec<Pt2>, Vec<Pt2>) {
        let rot = Rotation3::from_euler_angles(0.02, -0.1, 0.03);
        let pose = Iso3::from_parts(Translation3::new(-0.5, 0.05, 0.1), rot.into());
        let mut pts1 = Vec::new();
        let mut pts2 = Vec::new();
        for i in 0..20 {
            let x = -1.5 + 0.15 * i as Real;
            let y = ((i * 7) % 11) as Real * 0.2 - 1.0;
            let z = 4.0 + ((i * 5) % 9) as Real * 0.4;
            let pw = Pt3::new(x, y, z);
            let pc = pose.transform_point(&pw);
            pts1.push(Pt2::new(pw.x / pw.z, pw.y / pw.z));
            pts2.push(Pt2::new(pc.x / pc.z, pc.y / pc.z));
        }
        (pose, pts1, pts2)
    }

    #[test]
    fn eight_point_satisfies_epipolar_constraint() {
        let (_, pts1, pts2) = scene();
        let e = essential_8point(&pts1, &pts2).unwrap();
        for (a, b) in pts1.iter().zip(&pts2) {
            let r = Vec3::new(b.x, b.y, 1.0).dot(&(e * Vec3::new(a.x, a.y, 1.0)));
            assert!(r.abs() < 1e-8, "residual {r}");
        }
    }

    #[test]
    fn recovers_rotation_and_translation_direction() {
        let (gt, pts1, pts2) = scene();
        let e = essential_8point(&pts1, &pts2).unwrap();
        let rel = recover_relative_pose(&e, &pts1, &pts2).unwrap();
        assert_eq!(rel.points_in_front, pts1.len());

        let dr = rel.pose.rotation.inverse() * gt.rotation;
        assert!(dr.angle() < 1e-6);
        let cos_t = rel.pose.translation.vector.dot(&gt.translation.vector.normalize());
        assert!(cos_t > 1.0 - 1e-8);
    }

    #[test]
    fn decomposition_contains_ground_truth() {
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Vec3::new(0.1, 0.02, -0.03);
        let e = skew(&t) * rot.matrix();
        let found = decompose_essential(&e).unwrap().into_iter().any(|(r, t_est)| {
            let ang = Rotation3::from_matrix_unchecked(r.transpose() * rot.matrix()).angle();
            ang < 1e-6 && t_est.dot(&t.normalize()) > 1.0 - 1e-6
        });
        assert!(found);
    }

    #[test]
    fn too_few_points_is_an_error() {
        let pts = vec![Pt2::new(0.0, 0.0); 7];
        assert!(essential_8point(&pts, &pts).is_err());
    }
}
