//! Camera reconstruction backends.

use std::collections::BTreeMap;

use anyhow::{ensure, Context, Result};
use log::{debug, warn};
use matchmove_core::{CameraModel, Frame, Iso3, Pt2, Pt3, Real, Vec3};
use matchmove_linear::{
    camera_matrix, essential_8point, fit_rotation_3d, fit_similarity_2d, pnp_dlt, recover_relative_pose,
    triangulate_point_linear,
};
use nalgebra::{Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::config::SolveConfig;
use crate::observations::TrackObservations;

/// Depth at which rotation-only reconstructions place their points.
const NODAL_DEPTH: Real = 10.0;

/// How the camera path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionMethod {
    /// Essential matrix between the keyframes, then resection and triangulation.
    TwoView,
    /// Rotation-only approximation fitted per frame against the first keyframe.
    Nodal,
}

/// Reprojection error of one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationError {
    pub track: usize,
    pub frame: Frame,
    /// Projected minus observed, in pixels.
    pub residual: Pt2,
}

impl ObservationError {
    pub fn error(&self) -> Real {
        self.residual.coords.norm()
    }
}

/// Camera poses and 3-D points for one set of intrinsics.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub method: ReconstructionMethod,
    /// `cam_from_world` per solved frame.
    pub poses: BTreeMap<Frame, Iso3>,
    /// Per track index of the observations; `None` when not reconstructed.
    pub points: Vec<Option<Pt3>>,
    pub warnings: Vec<String>,
}

impl Reconstruction {
    pub fn frames_solved(&self) -> usize {
        self.poses.len()
    }

    pub fn points_solved(&self) -> usize {
        self.points.iter().flatten().count()
    }

    /// Pixel residual of `(track, frame)` observed at `pixel`, if both the
    /// frame and the point are reconstructed and the point projects.
    pub fn residual(&self, camera: &CameraModel, track: usize, frame: Frame, pixel: &Pt2) -> Option<Pt2> {
        let pose = self.poses.get(&frame)?;
        let point = self.points.get(track).copied().flatten()?;
        let projected = camera.project(&pose.transform_point(&point))?;
        Some(Pt2::from(projected - pixel))
    }

    /// Residuals of every reconstructed observation.
    pub fn errors(&self, observations: &TrackObservations, camera: &CameraModel) -> Vec<ObservationError> {
        observations
            .iter()
            .filter_map(|(track, frame, pixel)| {
                self.residual(camera, track, frame, &pixel)
                    .map(|residual| ObservationError { track, frame, residual })
            })
            .collect()
    }
}

/// Recovers camera poses and scene points from 2-D tracks.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Reconstruct with fixed intrinsics, seeded from the keyframe pair.
    fn reconstruct(
        &self,
        observations: &TrackObservations,
        camera: &CameraModel,
        keyframes: (Frame, Frame),
    ) -> Result<Reconstruction>;
}

/// Closed-form reconstruction: two-view initialisation, DLT resection and
/// multi-view triangulation, with a nodal fallback.
#[derive(Debug, Clone)]
pub struct LinearSolverBackend {
    pub min_keyframe_overlap: usize,
    pub min_frame_tracks: usize,
    pub min_parallax_deg: Real,
}

impl Default for LinearSolverBackend {
    fn default() -> Self {
        Self::from_config(&SolveConfig::default())
    }
}

type NormalizedFrames = BTreeMap<Frame, BTreeMap<usize, Pt2>>;

impl LinearSolverBackend {
    pub fn from_config(config: &SolveConfig) -> Self {
        Self {
            min_keyframe_overlap: config.effective_min_keyframe_overlap(),
            min_frame_tracks: config.effective_min_frame_tracks(),
            min_parallax_deg: config.min_parallax_deg.max(0.0),
        }
    }

    fn normalize(observations: &TrackObservations, camera: &CameraModel) -> NormalizedFrames {
        observations
            .frames
            .iter()
            .map(|(f, obs)| {
                let norm = obs
                    .iter()
                    .map(|(i, px)| (*i, camera.normalize(px)))
                    .filter(|(_, n)| n.x.is_finite() && n.y.is_finite())
                    .collect();
                (*f, norm)
            })
            .collect()
    }

    fn two_view(
        &self,
        norm: &NormalizedFrames,
        num_tracks: usize,
        (f1, f2): (Frame, Frame),
    ) -> Result<(BTreeMap<Frame, Iso3>, Vec<Option<Pt3>>)> {
        let (Some(a), Some(b)) = (norm.get(&f1), norm.get(&f2)) else {
            anyhow::bail!("keyframe {f1} or {f2} has no observations");
        };
        let (ids, (pts1, pts2)): (Vec<usize>, (Vec<Pt2>, Vec<Pt2>)) = a
            .iter()
            .filter_map(|(i, p)| b.get(i).map(|q| (*i, (*p, *q))))
            .unzip();
        ensure!(
            ids.len() >= self.min_keyframe_overlap,
            "keyframes {f1} and {f2} share {} tracks, need {}",
            ids.len(),
            self.min_keyframe_overlap
        );

        let e = essential_8point(&pts1, &pts2).context("essential matrix estimation failed")?;
        let rel = recover_relative_pose(&e, &pts1, &pts2)?;
        ensure!(
            rel.points_in_front >= self.min_keyframe_overlap,
            "only {} of {} points triangulate in front of the keyframes",
            rel.points_in_front,
            ids.len()
        );

        let c2 = rel.pose.inverse().translation.vector;
        let mut angles: Vec<Real> = rel
            .points
            .iter()
            .flatten()
            .map(|x| {
                let r1 = x.coords;
                let r2 = x.coords - c2;
                r1.angle(&r2).to_degrees()
            })
            .collect();
        angles.sort_by(Real::total_cmp);
        let median = angles[angles.len() / 2];
        ensure!(
            median >= self.min_parallax_deg,
            "keyframe parallax {median:.3} deg is below {:.3} deg",
            self.min_parallax_deg
        );
        debug!("two-view init {f1}-{f2}: {} points, parallax {median:.2} deg", rel.points_in_front);

        let mut poses = BTreeMap::new();
        poses.insert(f1, Iso3::identity());
        poses.insert(f2, rel.pose);
        let mut points = vec![None; num_tracks];
        for (i, x) in ids.iter().zip(&rel.points) {
            points[*i] = *x;
        }
        Ok((poses, points))
    }

    /// Alternate resection and triangulation until nothing new is solved.
    fn grow(&self, norm: &NormalizedFrames, poses: &mut BTreeMap<Frame, Iso3>, points: &mut [Option<Pt3>]) {
        let mut by_track: Vec<Vec<(Frame, Pt2)>> = vec![Vec::new(); points.len()];
        for (f, obs) in norm {
            for (i, n) in obs {
                if let Some(list) = by_track.get_mut(*i) {
                    list.push((*f, *n));
                }
            }
        }

        loop {
            let mut changed = false;

            for (frame, obs) in norm {
                if poses.contains_key(frame) {
                    continue;
                }
                let (world, image): (Vec<Pt3>, Vec<Pt2>) = obs
                    .iter()
                    .filter_map(|(i, n)| points.get(*i).copied().flatten().map(|x| (x, *n)))
                    .unzip();
                if world.len() < self.min_frame_tracks {
                    continue;
                }
                match pnp_dlt(&world, &image) {
                    Ok(pose) => {
                        poses.insert(*frame, pose);
                        changed = true;
                    }
                    Err(e) => debug!("frame {frame}: resection failed: {e}"),
                }
            }

            for (i, list) in by_track.iter().enumerate() {
                if points[i].is_some() {
                    continue;
                }
                let (cams, views): (Vec<Iso3>, Vec<Pt2>) = list
                    .iter()
                    .filter_map(|(f, n)| poses.get(f).map(|p| (*p, *n)))
                    .unzip();
                if cams.len() < 2 {
                    continue;
                }
                let matrices: Vec<_> = cams.iter().map(camera_matrix).collect();
                let Ok(x) = triangulate_point_linear(&matrices, &views) else {
                    continue;
                };
                if cams.iter().all(|c| c.transform_point(&x).z > 0.0) {
                    points[i] = Some(x);
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }

    /// Rotation-only camera path relative to the first keyframe.
    ///
    /// Frames sharing three or more tracks with the keyframe get a bearing
    /// rotation fit; frames sharing two get a coarse rotation from a 2-D
    /// similarity of the normalized points.
    fn nodal(&self, norm: &NormalizedFrames, num_tracks: usize, f1: Frame) -> Result<(BTreeMap<Frame, Iso3>, Vec<Option<Pt3>>)> {
        let reference = norm
            .get(&f1)
            .with_context(|| format!("keyframe {f1} has no observations"))?;

        let mut poses = BTreeMap::new();
        for (frame, obs) in norm {
            let (src, dst): (Vec<Pt2>, Vec<Pt2>) = reference
                .iter()
                .filter_map(|(i, p)| obs.get(i).map(|q| (*p, *q)))
                .unzip();
            let rotation = if src.len() >= 3 {
                let bearings = |pts: &[Pt2]| -> Vec<Vec3> { pts.iter().map(|p| Vec3::new(p.x, p.y, 1.0)).collect() };
                fit_rotation_3d(&bearings(&src[..]), &bearings(&dst[..])).ok()
            } else {
                fit_similarity_2d(&src, &dst).ok().map(|sim| {
                    let center = Vec3::new(sim.translation.x, sim.translation.y, 1.0).normalize();
                    let align = UnitQuaternion::rotation_between(&Vec3::z(), &center)
                        .unwrap_or_else(UnitQuaternion::identity);
                    align * UnitQuaternion::from_axis_angle(&Vec3::z_axis(), sim.angle)
                })
            };
            if let Some(rotation) = rotation {
                poses.insert(*frame, Iso3::from_parts(Translation3::identity(), rotation));
            }
        }
        ensure!(poses.len() >= 2, "no frame shares enough tracks with keyframe {f1}");

        let mut points = vec![None; num_tracks];
        for (frame, obs) in norm {
            let Some(pose) = poses.get(frame) else { continue };
            for (i, n) in obs {
                if points[*i].is_none() {
                    let ray = Vec3::new(n.x, n.y, 1.0).normalize() * NODAL_DEPTH;
                    points[*i] = Some(pose.inverse_transform_point(&Pt3::from(ray)));
                }
            }
        }
        Ok((poses, points))
    }
}

impl SolverBackend for LinearSolverBackend {
    fn name(&self) -> &str {
        "linear"
    }

    fn reconstruct(
        &self,
        observations: &TrackObservations,
        camera: &CameraModel,
        keyframes: (Frame, Frame),
    ) -> Result<Reconstruction> {
        let norm = Self::normalize(observations, camera);
        let n = observations.num_tracks();
        let mut warnings = Vec::new();

        let (method, poses, points) = match self.two_view(&norm, n, keyframes) {
            Ok((mut poses, mut points)) => {
                self.grow(&norm, &mut poses, &mut points);
                (ReconstructionMethod::TwoView, poses, points)
            }
            Err(e) => {
                let msg = format!("two-view initialisation failed ({e:#}); using a nodal approximation");
                warn!("{msg}");
                warnings.push(msg);
                let (poses, points) = self.nodal(&norm, n, keyframes.0)?;
                (ReconstructionMethod::Nodal, poses, points)
            }
        };

        let unsolved = norm.len() - poses.len();
        if unsolved > 0 {
            warnings.push(format!("{unsolved} of {} frames could not be solved", norm.len()));
        }
        Ok(Reconstruction {
            method,
            poses,
            points,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchmove_core::synthetic::SyntheticScene;
    use matchmove_core::DistortionCoefficients;

    fn observations_of(scene: &SyntheticScene) -> TrackObservations {
        let mut obs = TrackObservations {
            width: scene.camera.width,
            height: scene.camera.height,
            ..TrackObservations::default()
        };
        obs.track_ids = (0..scene.points.len() as u64).map(matchmove_track::TrackId).collect();
        for (i, frame, uv) in scene.observations(0.0, 0) {
            obs.frames
                .entry(frame)
                .or_default()
                .insert(i, scene.camera.uv_to_pixel(&uv));
        }
        obs
    }

    #[test]
    fn two_view_reconstruction_reprojects_exactly() {
        let camera = CameraModel::new(1280, 720, 1000.0, DistortionCoefficients::radial(-0.05, 0.01, 0.0));
        let scene = SyntheticScene::dolly(camera, 25, 1, 30, 3);
        let obs = observations_of(&scene);
        let rec = LinearSolverBackend::default()
            .reconstruct(&obs, &camera, (1, 30))
            .unwrap();
        assert_eq!(rec.method, ReconstructionMethod::TwoView);
        assert_eq!(rec.frames_solved(), 30);
        let errors = rec.errors(&obs, &camera);
        assert_eq!(errors.len(), obs.num_observations());
        assert!(errors.iter().all(|e| e.error() < 1e-4), "max {:?}", errors.iter().map(|e| e.error()).fold(0.0, Real::max));
    }

    #[test]
    fn pure_rotation_falls_back_to_nodal() {
        let camera = CameraModel::new(1280, 720, 1000.0, DistortionCoefficients::ZERO);
        let mut scene = SyntheticScene::dolly(camera, 25, 1, 20, 5);
        scene.poses = (0..20)
            .map(|i| {
                let yaw = UnitQuaternion::from_axis_angle(&Vec3::y_axis(), 0.004 * i as Real);
                Iso3::from_parts(Translation3::identity(), yaw)
            })
            .collect();
        let obs = observations_of(&scene);
        let rec = LinearSolverBackend::default()
            .reconstruct(&obs, &camera, (1, 20))
            .unwrap();
        assert_eq!(rec.method, ReconstructionMethod::Nodal);
        assert!(!rec.warnings.is_empty());
        let errors = rec.errors(&obs, &camera);
        let worst = errors.iter().map(|e| e.error()).fold(0.0, Real::max);
        assert!(worst < 1e-3, "worst nodal residual {worst}");
    }

    #[test]
    fn missing_keyframe_is_an_error() {
        let obs = TrackObservations::default();
        let camera = CameraModel::new(640, 480, 500.0, DistortionCoefficients::ZERO);
        assert!(LinearSolverBackend::default().reconstruct(&obs, &camera, (1, 2)).is_err());
    }
}
