use std::fs;
use std::path::{Path, PathBuf};

use matchmove_solve::SolveConfig;
use matchmove_stmap::STMapConfig;
use matchmove_track::TrackingConfig;
use serde::{Deserialize, Serialize};

/// Errors raised while loading a [`PipelineConfig`] or preparing a
/// [`crate::MatchmoveContext`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid pipeline config: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Profile(#[from] matchmove_core::ProfileError),
    #[error(transparent)]
    Footage(#[from] matchmove_core::FootageError),
    #[error(transparent)]
    StMap(#[from] matchmove_stmap::StMapError),
    #[error("unknown camera profile `{0}`")]
    UnknownProfile(String),
    #[error("no camera profile selected")]
    NoProfile,
}

/// Settings for a whole tracking, solving and ST-map run.
///
/// Every section falls back to its defaults when missing from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracking: TrackingConfig,
    pub solve: SolveConfig,
    pub stmap: STMapConfig,
    /// Camera profile describing the footage lens.
    pub profile: Option<String>,
    /// Extra profiles merged into the registry at start-up.
    pub custom_profiles: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
