//! The camera solver: validation, keyframes, reconstruction, refinement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use matchmove_core::{
    CameraModel, DistortionCoefficients, ErrorStats, Frame, Iso3, Progress, ProgressCallback, Pt3,
    Real, Vec2, Vec3,
};
use matchmove_track::{TrackId, TrackingSession};
use serde::{Deserialize, Serialize};

use crate::backend::{LinearSolverBackend, Reconstruction, ReconstructionMethod, SolverBackend};
use crate::config::{IntrinsicsMask, SolveConfig};
use crate::observations::TrackObservations;
use crate::refine::refine_intrinsics;

/// Resolution assumed when the footage does not report one.
pub const FALLBACK_RESOLUTION: (u32, u32) = (1920, 1080);

/// Process-unique identity of a [`Solve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SolveId(pub u64);

impl SolveId {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Summary of a solve attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub success: bool,
    /// Reprojection errors in pixels; `min_error <= average_error <= max_error`.
    pub average_error: Real,
    pub min_error: Real,
    pub max_error: Real,
    pub frames_solved: usize,
    pub tracks_used: usize,
    pub keyframes: Option<(Frame, Frame)>,
    pub method: Option<ReconstructionMethod>,
    /// Objective evaluations spent refining intrinsics.
    pub iterations: usize,
    pub message: String,
    pub warnings: Vec<String>,
}

impl SolveReport {
    fn failed(message: impl Into<String>, mut warnings: Vec<String>) -> Self {
        let message = message.into();
        warn!("solve failed: {message}");
        warnings.push(message.clone());
        Self {
            message,
            warnings,
            ..Self::default()
        }
    }
}

/// Intrinsics the solve ended with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolvedIntrinsics {
    pub width: u32,
    pub height: u32,
    pub focal_px: Real,
    pub focal_mm: Real,
    pub sensor_width_mm: Real,
    pub principal_point: Vec2,
    pub distortion: DistortionCoefficients,
}

impl SolvedIntrinsics {
    fn new(camera: &CameraModel, sensor_width_mm: Real) -> Self {
        Self {
            width: camera.width,
            height: camera.height,
            focal_px: camera.focal_px,
            focal_mm: camera.focal_mm(sensor_width_mm),
            sensor_width_mm,
            principal_point: camera.principal_point,
            distortion: camera.distortion,
        }
    }

    pub fn camera(&self) -> CameraModel {
        CameraModel {
            width: self.width,
            height: self.height,
            focal_px: self.focal_px,
            principal_point: self.principal_point,
            distortion: self.distortion,
        }
    }
}

/// Camera of one solved frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameCamera {
    pub frame: Frame,
    pub cam_from_world: Iso3,
}

impl FrameCamera {
    /// Camera center in world coordinates.
    pub fn position(&self) -> Vec3 {
        self.cam_from_world.inverse().translation.vector
    }
}

/// Immutable result of one successful solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solve {
    pub id: SolveId,
    pub report: SolveReport,
    pub intrinsics: SolvedIntrinsics,
    pub cameras: Vec<FrameCamera>,
    pub points: Vec<(TrackId, Pt3)>,
}

impl Solve {
    pub fn camera_at(&self, frame: Frame) -> Option<&FrameCamera> {
        self.cameras
            .binary_search_by_key(&frame, |c| c.frame)
            .ok()
            .map(|i| &self.cameras[i])
    }
}

struct Outcome {
    camera: CameraModel,
    reconstruction: Reconstruction,
    stats: ErrorStats,
    keyframes: (Frame, Frame),
    evaluations: usize,
    warnings: Vec<String>,
}

/// Solves camera motion for the tracks of one session.
///
/// Keeps the latest [`Solve`]; a new solve replaces it without touching
/// copies already handed out.
pub struct CameraSolver<'s> {
    session: Option<&'s TrackingSession>,
    backend: Option<Box<dyn SolverBackend>>,
    config: SolveConfig,
    current: Option<Arc<Solve>>,
}

impl Default for CameraSolver<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'s> CameraSolver<'s> {
    /// Solver using [`LinearSolverBackend`] configured per solve.
    pub fn new() -> Self {
        Self {
            session: None,
            backend: None,
            config: SolveConfig::default(),
            current: None,
        }
    }

    pub fn with_backend(backend: Box<dyn SolverBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new()
        }
    }

    pub fn set_session(&mut self, session: &'s TrackingSession) {
        self.session = Some(session);
    }

    /// Settings of the last solve, used by [`Self::refine_focal_length`].
    pub fn config(&self) -> &SolveConfig {
        &self.config
    }

    pub fn current_solve(&self) -> Option<Arc<Solve>> {
        self.current.clone()
    }

    fn resolution(session: &TrackingSession, warnings: &mut Vec<String>) -> (u32, u32) {
        let (w, h) = (session.footage.width, session.footage.height);
        if w == 0 || h == 0 {
            let msg = format!(
                "footage has no resolution; assuming {}x{}",
                FALLBACK_RESOLUTION.0, FALLBACK_RESOLUTION.1
            );
            warn!("{msg}");
            warnings.push(msg);
            FALLBACK_RESOLUTION
        } else {
            (w, h)
        }
    }

    fn keyframes_for(
        config: &SolveConfig,
        observations: &TrackObservations,
        warnings: &mut Vec<String>,
    ) -> Option<(Frame, Frame)> {
        if !config.auto_keyframe {
            match config.keyframes {
                Some((a, b)) if a != b && observations.overlap(a, b) >= 2 => {
                    return Some((a.min(b), a.max(b)));
                }
                Some((a, b)) => warnings.push(format!(
                    "keyframes ({a}, {b}) share too few tracks; selecting automatically"
                )),
                None => warnings.push("no keyframes given; selecting automatically".to_string()),
            }
        }
        observations.select_keyframes(config.effective_min_keyframe_overlap())
    }

    /// Everything after validation; `Err` carries the failure message.
    fn run(
        &self,
        backend: &dyn SolverBackend,
        config: &SolveConfig,
        observations: &TrackObservations,
        camera: CameraModel,
        progress: &mut Progress<'_>,
        mut warnings: Vec<String>,
    ) -> Result<Outcome, (String, Vec<String>)> {
        let Some(keyframes) = Self::keyframes_for(config, observations, &mut warnings) else {
            return Err(("no pair of frames shares enough tracks to select keyframes".to_string(), warnings));
        };
        progress.report(0.2, "reconstructing");

        let reconstruction = match backend.reconstruct(observations, &camera, keyframes) {
            Ok(rec) => rec,
            Err(e) => return Err((format!("reconstruction failed: {e:#}"), warnings)),
        };
        let errors: Vec<Real> = reconstruction
            .errors(observations, &camera)
            .iter()
            .map(|e| e.error())
            .collect();
        let Some(stats) = ErrorStats::from_errors(errors) else {
            return Err(("no observation could be reprojected".to_string(), warnings));
        };
        progress.report(0.5, "refining");

        let mut outcome = Outcome {
            camera,
            reconstruction,
            stats,
            keyframes,
            evaluations: 0,
            warnings,
        };
        if let Some(refined) = refine_intrinsics(
            backend,
            observations,
            keyframes,
            &camera,
            config.refine_intrinsics,
            config.max_iterations,
        ) {
            outcome.evaluations = refined.evaluations;
            if refined.stats.mean < outcome.stats.mean {
                info!(
                    "refined intrinsics: focal {:.2}px -> {:.2}px, error {:.4}px -> {:.4}px",
                    camera.focal_px, refined.camera.focal_px, outcome.stats.mean, refined.stats.mean
                );
                outcome.camera = refined.camera;
                outcome.reconstruction = refined.reconstruction;
                outcome.stats = refined.stats;
            } else {
                debug!("refinement did not lower the mean error; keeping initial intrinsics");
            }
        }
        progress.report(0.9, "finalizing");
        Ok(outcome)
    }

    /// Solve camera motion for the current session.
    ///
    /// Never fails hard: missing data yields a report with `success = false`
    /// and an explanatory warning.
    pub fn solve(&mut self, config: Option<&SolveConfig>, progress: Option<ProgressCallback<'_>>) -> SolveReport {
        let mut progress = Progress::new(progress);
        let config = config.cloned().unwrap_or_default();
        self.config = config.clone();
        progress.report(0.0, "validating");

        let Some(session) = self.session else {
            return SolveReport::failed("no tracking session set", Vec::new());
        };
        if session.tracks.is_empty() {
            return SolveReport::failed("session has no tracks to solve", Vec::new());
        }

        let mut warnings = Vec::new();
        let (width, height) = Self::resolution(session, &mut warnings);
        let observations = TrackObservations::from_session(session, width, height, None);
        if observations.num_tracks() == 0 {
            return SolveReport::failed("no track has two or more valid points", warnings);
        }
        if observations.num_tracks() < config.recommended_min_tracks {
            warnings.push(format!(
                "only {} usable tracks; at least {} are recommended",
                observations.num_tracks(),
                config.recommended_min_tracks
            ));
        }
        progress.report(0.1, "selecting keyframes");

        if self.backend.is_none() {
            for msg in config.raised_thresholds() {
                warn!("{msg}");
                warnings.push(msg);
            }
        }
        let default_backend = LinearSolverBackend::from_config(&config);
        let backend: &dyn SolverBackend = self.backend.as_deref().unwrap_or(&default_backend);
        let camera = config.initial_camera(width, height);

        let outcome = match self.run(backend, &config, &observations, camera, &mut progress, warnings) {
            Ok(outcome) => outcome,
            Err((message, warnings)) => {
                progress.finish("failed");
                return SolveReport::failed(message, warnings);
            }
        };

        let Outcome {
            camera,
            reconstruction,
            stats,
            keyframes,
            evaluations,
            mut warnings,
        } = outcome;
        warnings.extend(reconstruction.warnings.iter().cloned());
        let frames_solved = reconstruction.frames_solved();
        let tracks_used = reconstruction.points_solved();
        if frames_solved * 2 < observations.frames.len() {
            warnings.push(format!(
                "sparse coverage: {frames_solved} of {} tracked frames solved",
                observations.frames.len()
            ));
        }

        let report = SolveReport {
            success: frames_solved >= 2,
            average_error: stats.mean,
            min_error: stats.min,
            max_error: stats.max,
            frames_solved,
            tracks_used,
            keyframes: Some(keyframes),
            method: Some(reconstruction.method),
            iterations: evaluations,
            message: format!(
                "solved {frames_solved} frames from {tracks_used} tracks, mean error {:.3}px",
                stats.mean
            ),
            warnings,
        };
        info!("{}", report.message);

        let cameras = reconstruction
            .poses
            .iter()
            .map(|(frame, pose)| FrameCamera {
                frame: *frame,
                cam_from_world: *pose,
            })
            .collect();
        let points = reconstruction
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| Some((*observations.track_ids.get(i)?, (*p)?)))
            .collect();
        self.current = Some(Arc::new(Solve {
            id: SolveId::fresh(),
            report: report.clone(),
            intrinsics: SolvedIntrinsics::new(&camera, config.sensor_width_mm),
            cameras,
            points,
        }));
        progress.finish("done");
        report
    }

    /// Refine only the focal length, optionally over a sub-range of frames.
    ///
    /// Uses the sensor width, distortion and thresholds of the last solve
    /// configuration. Returns `initial_focal_mm` unchanged when there is
    /// nothing to refine against.
    pub fn refine_focal_length(&self, initial_focal_mm: Real, frame_range: Option<(Frame, Frame)>) -> Real {
        let Some(session) = self.session else {
            return initial_focal_mm;
        };
        if !(initial_focal_mm.is_finite() && initial_focal_mm > 0.0) {
            return initial_focal_mm;
        }
        let config = SolveConfig {
            focal_length_mm: initial_focal_mm,
            refine_intrinsics: IntrinsicsMask::FOCAL,
            ..self.config.clone()
        };
        let mut warnings = Vec::new();
        let (width, height) = Self::resolution(session, &mut warnings);
        let observations = TrackObservations::from_session(session, width, height, frame_range);
        let Some(keyframes) = Self::keyframes_for(&config, &observations, &mut warnings) else {
            return initial_focal_mm;
        };

        let default_backend = LinearSolverBackend::from_config(&config);
        let backend: &dyn SolverBackend = self.backend.as_deref().unwrap_or(&default_backend);
        let camera = config.initial_camera(width, height);
        let Ok(initial) = backend.reconstruct(&observations, &camera, keyframes) else {
            return initial_focal_mm;
        };
        let Some(before) = ErrorStats::from_errors(initial.errors(&observations, &camera).iter().map(|e| e.error())) else {
            return initial_focal_mm;
        };
        match refine_intrinsics(backend, &observations, keyframes, &camera, IntrinsicsMask::FOCAL, config.max_iterations) {
            Some(refined) if refined.stats.mean < before.mean => refined.camera.focal_mm(config.sensor_width_mm),
            _ => initial_focal_mm,
        }
    }
}
