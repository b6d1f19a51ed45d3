use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use matchmove_core::CameraProfileManager;

use crate::config::STMapConfig;
use crate::generator::STMapGenerator;
use crate::StMapError;

/// Files written by a batch run and the resolutions that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Writes one map per resolution for a profile.
#[derive(Debug, Clone, Default)]
pub struct STMapBatchGenerator {
    /// Settings shared by every resolution; width and height are replaced.
    pub base: STMapConfig,
}

impl STMapBatchGenerator {
    pub fn new(base: STMapConfig) -> Self {
        Self { base }
    }

    /// File name used for `profile` at `width × height`.
    pub fn file_name(&self, profile: &str, width: u32, height: u32) -> String {
        let stem: String = profile
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        format!("{stem}_{width}x{height}_stmap.{}", self.base.bit_depth.extension())
    }

    /// Generate and write a map per resolution into `output_dir`.
    ///
    /// An unknown profile or an unusable output directory fails the whole
    /// batch; a failing resolution only adds a warning.
    pub fn generate_for_resolutions(
        &self,
        manager: &CameraProfileManager,
        profile_name: &str,
        resolutions: &[(u32, u32)],
        output_dir: impl AsRef<Path>,
    ) -> Result<BatchReport, StMapError> {
        let profile = manager
            .get(profile_name)
            .ok_or_else(|| StMapError::UnknownProfile(profile_name.to_string()))?;
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir).map_err(|source| StMapError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let mut report = BatchReport::default();
        for &(width, height) in resolutions {
            let generator = STMapGenerator::new(self.base.with_resolution(width, height));
            let path = output_dir.join(self.file_name(&profile.name, width, height));
            match generator
                .generate(profile, None)
                .and_then(|map| map.save(&path))
            {
                Ok(written) => report.written.push(written),
                Err(e) => {
                    let msg = format!("{width}x{height}: {e}");
                    warn!("ST-map batch for {}: {msg}", profile.name);
                    report.warnings.push(msg);
                }
            }
        }
        info!(
            "ST-map batch for {}: {} written, {} failed",
            profile.name,
            report.written.len(),
            report.warnings.len()
        );
        Ok(report)
    }
}
