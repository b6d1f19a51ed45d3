//! Shared helpers for the linear solvers.
//!
//! Hartley normalization conditions DLT design matrices: points are
//! centered and scaled so the mean distance from the origin is `√2` (2D)
//! or `√3` (3D).

use matchmove_core::{Mat3, Mat4, Pt2, Pt3, Real, Vec3};
use nalgebra::{DMatrix, Matrix3x4};

pub type Mat34 = Matrix3x4<Real>;

/// Hartley normalization for 2D points.
///
/// Returns the normalized points and `T` with `p_norm = T * p_h`, or `None`
/// for empty or coincident input.
pub fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as Real;
    let centroid = points.iter().fold(Pt2::origin(), |acc, p| acc + p.coords / n);
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<Real>() / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = Real::sqrt(2.0) / mean_dist;
    let t = Mat3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    let norm = points
        .iter()
        .map(|p| Pt2::from((p - centroid) * scale))
        .collect();
    Some((norm, t))
}

/// Hartley normalization for 3D points, the analog of [`normalize_points_2d`].
pub fn normalize_points_3d(points: &[Pt3]) -> Option<(Vec<Pt3>, Mat4)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as Real;
    let centroid = points.iter().fold(Pt3::origin(), |acc, p| acc + p.coords / n);
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<Real>() / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = Real::sqrt(3.0) / mean_dist;
    let mut t = Mat4::identity() * scale;
    t[(0, 3)] = -scale * centroid.x;
    t[(1, 3)] = -scale * centroid.y;
    t[(2, 3)] = -scale * centroid.z;
    t[(3, 3)] = 1.0;

    let norm = points
        .iter()
        .map(|p| Pt3::from((p - centroid) * scale))
        .collect();
    Some((norm, t))
}

/// Reshape row `row_idx` of `V^T` (9 columns) into a 3x3 matrix.
pub fn mat3_from_svd_row(v_t: &DMatrix<Real>, row_idx: usize) -> Mat3 {
    debug_assert_eq!(v_t.ncols(), 9);
    Mat3::from_fn(|r, c| v_t[(row_idx, 3 * r + c)])
}

/// Reshape row `row_idx` of `V^T` (12 columns) into a 3x4 matrix.
pub fn mat34_from_svd_row(v_t: &DMatrix<Real>, row_idx: usize) -> Mat34 {
    debug_assert_eq!(v_t.ncols(), 12);
    Mat34::from_fn(|r, c| v_t[(row_idx, 4 * r + c)])
}

/// Cross-product matrix `[v]x`.
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Pad a wide design matrix with zero rows so its SVD exposes a full `V^T`.
pub(crate) fn pad_to_square(a: DMatrix<Real>) -> DMatrix<Real> {
    if a.nrows() >= a.ncols() {
        return a;
    }
    let (rows, cols) = a.shape();
    let mut padded = DMatrix::<Real>::zeros(cols, cols);
    padded.view_mut((0, 0), (rows, cols)).copy_from(&a);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_2d_centering() {
        let points = vec![
            Pt2::new(100.0, 200.0),
            Pt2::new(200.0, 300.0),
            Pt2::new(150.0, 250.0),
        ];
        let (norm, t) = normalize_points_2d(&points).unwrap();

        let cx: Real = norm.iter().map(|p| p.x).sum::<Real>() / 3.0;
        let cy: Real = norm.iter().map(|p| p.y).sum::<Real>() / 3.0;
        assert!(cx.abs() < 1e-10 && cy.abs() < 1e-10);

        let mean_dist = norm.iter().map(|p| p.coords.norm()).sum::<Real>() / 3.0;
        assert!((mean_dist - Real::sqrt(2.0)).abs() < 1e-10);

        let mapped = t * Vec3::new(100.0, 200.0, 1.0);
        assert!((mapped.x - norm[0].x).abs() < 1e-10);
    }

    #[test]
    fn normalize_3d_transform_matches_points() {
        let points = vec![
            Pt3::new(1.0, 2.0, 3.0),
            Pt3::new(4.0, 5.0, 6.0),
            Pt3::new(7.0, 8.0, 10.0),
        ];
        let (norm, t) = normalize_points_3d(&points).unwrap();
        for (p, n) in points.iter().zip(&norm) {
            let m = t * p.to_homogeneous();
            assert!((m.xyz() - n.coords).norm() < 1e-10);
        }
    }

    #[test]
    fn coincident_points_do_not_normalize() {
        assert!(normalize_points_2d(&[Pt2::new(1.0, 1.0); 4]).is_none());
        assert!(normalize_points_2d(&[]).is_none());
    }

    #[test]
    fn svd_row_reshape() {
        let mut v_t = DMatrix::zeros(9, 9);
        for i in 0..9 {
            v_t[(8, i)] = (i + 1) as Real;
        }
        let m = mat3_from_svd_row(&v_t, 8);
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m[(2, 2)], 9.0);
    }
}
