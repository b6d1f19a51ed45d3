//! JSON persistence for camera profiles.
//!
//! File layout:
//!
//! ```json
//! { "version": 1, "profiles": [ { "name": "...", "k1": -0.1, ... } ] }
//! ```
//!
//! A bare array of records is accepted on load as well.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CameraProfile, ProfileError};

pub const PROFILE_FILE_VERSION: u32 = 1;

/// On-disk representation written by [`write_profiles`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileFile {
    pub version: u32,
    pub profiles: Vec<CameraProfile>,
}

pub(crate) fn read_profiles(path: &Path) -> Result<Vec<CameraProfile>, ProfileError> {
    let text = fs::read_to_string(path).map_err(|source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|source| ProfileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    parse_records(value)
}

/// Parse each record on its own so a malformed entry is skipped instead of
/// failing the whole file.
pub(crate) fn parse_records(value: Value) -> Result<Vec<CameraProfile>, ProfileError> {
    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("profiles") {
            Some(Value::Array(items)) => {
                if let Some(version) = map.get("version").and_then(Value::as_u64) {
                    if version > PROFILE_FILE_VERSION as u64 {
                        warn!("profile file version {version} is newer than {PROFILE_FILE_VERSION}; reading known fields only");
                    }
                }
                items
            }
            _ => return Err(ProfileError::Layout),
        },
        _ => return Err(ProfileError::Layout),
    };

    let mut profiles = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<CameraProfile>(record) {
            Ok(profile) if profile.name.trim().is_empty() => {
                warn!("skipping profile record {idx}: empty name");
            }
            Ok(profile) => profiles.push(profile),
            Err(err) => warn!("skipping malformed profile record {idx}: {err}"),
        }
    }
    Ok(profiles)
}

pub(crate) fn write_profiles(path: &Path, profiles: Vec<CameraProfile>) -> Result<(), ProfileError> {
    let file = ProfileFile {
        version: PROFILE_FILE_VERSION,
        profiles,
    };
    let text = serde_json::to_string_pretty(&file)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ProfileError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, text).map_err(|source| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    })
}
