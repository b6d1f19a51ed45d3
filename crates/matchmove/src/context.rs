use std::path::Path;
use std::sync::Arc;

use image::GrayImage;
use log::{info, warn};
use matchmove_core::{
    import_footage, CameraProfile, CameraProfileManager, Frame, ProgressCallback, Real,
};
use matchmove_solve::{CameraSolver, Solve, SolveConfig, SolveReport};
use matchmove_stmap::{BatchReport, STMapBatchGenerator, STMapGenerator, STMapResult};
use matchmove_track::{PointTracker, TrackingResult, TrackingSession};

use crate::config::{PipelineConfig, PipelineError};

/// Owns the profile registry and pipeline settings for one shot.
///
/// Each stage borrows the tracking session it works on; the context itself
/// holds no per-shot results.
#[derive(Debug, Clone)]
pub struct MatchmoveContext {
    profiles: CameraProfileManager,
    config: PipelineConfig,
}

impl Default for MatchmoveContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchmoveContext {
    /// Built-in profiles and default settings.
    pub fn new() -> Self {
        Self {
            profiles: CameraProfileManager::new(),
            config: PipelineConfig::default(),
        }
    }

    /// Loads `config.custom_profiles` (when set) into the built-in registry
    /// and checks that the selected profile exists.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let mut profiles = CameraProfileManager::new();
        if let Some(path) = &config.custom_profiles {
            let loaded = profiles.load_custom_profiles(path)?;
            info!("loaded {loaded} custom profiles from {}", path.display());
        }
        if let Some(name) = &config.profile {
            if !profiles.contains(name) {
                return Err(PipelineError::UnknownProfile(name.clone()));
            }
        }
        Ok(Self { profiles, config })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        Self::from_config(PipelineConfig::from_json_file(path)?)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    pub fn profiles(&self) -> &CameraProfileManager {
        &self.profiles
    }

    pub fn profiles_mut(&mut self) -> &mut CameraProfileManager {
        &mut self.profiles
    }

    /// The selected camera profile.
    pub fn profile(&self) -> Result<&CameraProfile, PipelineError> {
        let name = self.config.profile.as_deref().ok_or(PipelineError::NoProfile)?;
        self.profiles
            .get(name)
            .ok_or_else(|| PipelineError::UnknownProfile(name.to_string()))
    }

    /// Import footage from disk and start an empty tracking session for it.
    pub fn open_footage(&self, path: impl AsRef<Path>, fps: Real) -> Result<TrackingSession, PipelineError> {
        let footage = import_footage(path, fps)?;
        info!(
            "opened {} ({}x{}, frames {}..={})",
            footage.path.display(),
            footage.width,
            footage.height,
            footage.frame_start,
            footage.frame_end
        );
        Ok(TrackingSession::new(footage, self.config.tracking.clone()))
    }

    /// Automatic tracking over the whole session range with the session's
    /// own tracking settings.
    pub fn track<F>(
        &self,
        session: &mut TrackingSession,
        get_frame: F,
        progress: Option<ProgressCallback<'_>>,
    ) -> TrackingResult
    where
        F: FnMut(Frame) -> Option<GrayImage>,
    {
        let mut tracker = PointTracker::new(session.config.clone());
        tracker.auto_track(session, get_frame, progress)
    }

    /// Solve settings with the lens of the selected profile, if any.
    ///
    /// The profile provides focal length, sensor width and distortion; the
    /// remaining fields come from the configured solve section.
    pub fn solve_config(&self) -> SolveConfig {
        let base = self.config.solve.clone();
        let Some(name) = self.config.profile.as_deref() else {
            return base;
        };
        match self.profiles.get(name) {
            Some(profile) => {
                let lens = SolveConfig::from_profile(profile);
                SolveConfig {
                    focal_length_mm: lens.focal_length_mm,
                    sensor_width_mm: lens.sensor_width_mm,
                    distortion: lens.distortion,
                    ..base
                }
            }
            None => {
                warn!("profile `{name}` not found; solving with configured lens");
                base
            }
        }
    }

    /// Camera solve of `session`. The snapshot is `None` when the solve failed.
    pub fn solve(
        &self,
        session: &TrackingSession,
        progress: Option<ProgressCallback<'_>>,
    ) -> (SolveReport, Option<Arc<Solve>>) {
        let config = self.solve_config();
        let mut solver = CameraSolver::new();
        solver.set_session(session);
        let report = solver.solve(Some(&config), progress);
        let solve = if report.success {
            solver.current_solve()
        } else {
            None
        };
        (report, solve)
    }

    /// ST-map of the selected profile with the configured output settings.
    pub fn stmap(&self, progress: Option<ProgressCallback<'_>>) -> Result<STMapResult, PipelineError> {
        let profile = self.profile()?;
        let generator = STMapGenerator::new(self.config.stmap.clone());
        Ok(generator.generate(profile, progress)?)
    }

    /// ST-maps of the selected profile for several resolutions, written to
    /// `output_dir`.
    pub fn export_stmaps(
        &self,
        resolutions: &[(u32, u32)],
        output_dir: impl AsRef<Path>,
    ) -> Result<BatchReport, PipelineError> {
        let profile = self.profile()?;
        let batch = STMapBatchGenerator::new(self.config.stmap.clone());
        Ok(batch.generate_for_resolutions(&self.profiles, &profile.name, resolutions, output_dir)?)
    }
}
