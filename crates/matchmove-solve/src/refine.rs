//! Levenberg–Marquardt refinement of camera intrinsics.
//!
//! Each evaluation rebuilds the reconstruction with the candidate
//! intrinsics, so poses and points always match the camera being scored.
//! Residuals use a fixed layout (two rows per observation); observations
//! that cannot be reprojected contribute a constant penalty.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use matchmove_core::{CameraModel, ErrorStats, Frame, Pt2, Real};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

use crate::backend::{Reconstruction, SolverBackend};
use crate::config::IntrinsicsMask;
use crate::observations::TrackObservations;

/// Dense non-linear least squares problem.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Central-difference Jacobian.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut jac = DMatrix::zeros(self.num_residuals(), x.len());
        let mut xp = x.clone();
        for j in 0..x.len() {
            let h = 1e-6 * x[j].abs().max(1.0);
            xp[j] = x[j] + h;
            let rp = self.residuals(&xp);
            xp[j] = x[j] - h;
            let rm = self.residuals(&xp);
            xp[j] = x[j];
            jac.set_column(j, &((rp - rm) / (2.0 * h)));
        }
        jac
    }
}

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
}

impl<P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        Some(self.problem.jacobian(&self.params))
    }
}

/// Plausible ranges for refined intrinsics.
#[derive(Debug, Clone, Copy)]
pub struct IntrinsicsBounds {
    pub focal_px: (Real, Real),
    pub cx: (Real, Real),
    pub cy: (Real, Real),
    pub radial: (Real, Real),
}

impl IntrinsicsBounds {
    /// Focal within 0.2–5× the initial value, principal point inside the
    /// image, `|k| ≤ 1`.
    pub fn around(camera: &CameraModel) -> Self {
        Self {
            focal_px: (0.2 * camera.focal_px, 5.0 * camera.focal_px),
            cx: (0.0, camera.width as Real),
            cy: (0.0, camera.height as Real),
            radial: (-1.0, 1.0),
        }
    }
}

/// Intrinsics selected by an [`IntrinsicsMask`], scored through a full
/// reconstruction.
pub struct IntrinsicsProblem<'a> {
    backend: &'a dyn SolverBackend,
    observations: &'a TrackObservations,
    keyframes: (Frame, Frame),
    base: CameraModel,
    mask: IntrinsicsMask,
    bounds: IntrinsicsBounds,
    layout: Vec<(usize, Frame, Pt2)>,
    penalty: Real,
}

impl<'a> IntrinsicsProblem<'a> {
    pub fn new(
        backend: &'a dyn SolverBackend,
        observations: &'a TrackObservations,
        keyframes: (Frame, Frame),
        base: CameraModel,
        mask: IntrinsicsMask,
    ) -> Self {
        Self {
            backend,
            observations,
            keyframes,
            base,
            mask,
            bounds: IntrinsicsBounds::around(&base),
            layout: observations.iter().collect(),
            penalty: 0.05 * base.width.max(base.height) as Real,
        }
    }

    pub fn pack(&self, camera: &CameraModel) -> DVector<Real> {
        let mut x = Vec::with_capacity(self.mask.num_params());
        if self.mask.focal_length {
            x.push(camera.focal_px);
        }
        if self.mask.principal_point {
            x.push(camera.principal_point.x);
            x.push(camera.principal_point.y);
        }
        if self.mask.radial_distortion {
            x.push(camera.distortion.k1);
            x.push(camera.distortion.k2);
        }
        DVector::from_vec(x)
    }

    /// Camera for a parameter vector, clamped to the bounds.
    pub fn decode(&self, x: &DVector<Real>) -> CameraModel {
        let clamp = |v: Real, (lo, hi): (Real, Real), fallback: Real| {
            if v.is_finite() {
                v.clamp(lo, hi)
            } else {
                fallback
            }
        };
        let mut camera = self.base;
        let mut it = x.iter().copied();
        let b = &self.bounds;
        if self.mask.focal_length {
            let v = it.next().unwrap_or(camera.focal_px);
            camera.focal_px = clamp(v, b.focal_px, self.base.focal_px);
        }
        if self.mask.principal_point {
            let cx = it.next().unwrap_or(camera.principal_point.x);
            let cy = it.next().unwrap_or(camera.principal_point.y);
            camera.principal_point.x = clamp(cx, b.cx, self.base.principal_point.x);
            camera.principal_point.y = clamp(cy, b.cy, self.base.principal_point.y);
        }
        if self.mask.radial_distortion {
            let k1 = it.next().unwrap_or(camera.distortion.k1);
            let k2 = it.next().unwrap_or(camera.distortion.k2);
            camera.distortion.k1 = clamp(k1, b.radial, self.base.distortion.k1);
            camera.distortion.k2 = clamp(k2, b.radial, self.base.distortion.k2);
        }
        camera
    }
}

impl NllsProblem for IntrinsicsProblem<'_> {
    fn num_params(&self) -> usize {
        self.mask.num_params()
    }

    fn num_residuals(&self) -> usize {
        2 * self.layout.len()
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let camera = self.decode(x);
        let mut r = DVector::from_element(self.num_residuals(), self.penalty);
        let Ok(rec) = self.backend.reconstruct(self.observations, &camera, self.keyframes) else {
            return r;
        };
        for (k, (track, frame, pixel)) in self.layout.iter().enumerate() {
            if let Some(res) = rec.residual(&camera, *track, *frame, pixel) {
                r[2 * k] = res.x;
                r[2 * k + 1] = res.y;
            }
        }
        r
    }
}

/// Result of a refinement run.
#[derive(Debug, Clone)]
pub struct RefinedIntrinsics {
    pub camera: CameraModel,
    pub reconstruction: Reconstruction,
    pub stats: ErrorStats,
    pub evaluations: usize,
}

/// Refine the masked intrinsics of `initial`.
///
/// Returns `None` when the mask is empty or the refined camera cannot be
/// reconstructed. The caller decides whether the result is an improvement.
pub fn refine_intrinsics(
    backend: &dyn SolverBackend,
    observations: &TrackObservations,
    keyframes: (Frame, Frame),
    initial: &CameraModel,
    mask: IntrinsicsMask,
    max_iterations: usize,
) -> Option<RefinedIntrinsics> {
    if !mask.any() || observations.num_observations() == 0 {
        return None;
    }
    let problem = IntrinsicsProblem::new(backend, observations, keyframes, *initial, mask);
    let x0 = problem.pack(initial);

    let lm = LevenbergMarquardt::new()
        .with_ftol(1e-10)
        .with_xtol(1e-10)
        .with_gtol(1e-10)
        .with_patience(max_iterations.max(1));
    let (wrapper, report) = lm.minimize(LmWrapper {
        problem: &problem,
        params: x0,
    });
    debug!(
        "intrinsics refinement: {:?} after {} evaluations, cost {:.6}",
        report.termination, report.number_of_evaluations, report.objective_function
    );

    let camera = problem.decode(&wrapper.params);
    let reconstruction = backend.reconstruct(observations, &camera, keyframes).ok()?;
    let stats = ErrorStats::from_errors(
        reconstruction
            .errors(observations, &camera)
            .iter()
            .map(|e| e.error()),
    )?;
    Some(RefinedIntrinsics {
        camera,
        reconstruction,
        stats,
        evaluations: report.number_of_evaluations,
    })
}
