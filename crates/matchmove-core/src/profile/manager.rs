use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{OnceLock, RwLock};

use log::{debug, info};

use super::catalog::builtin_profiles;
use super::io::{read_profiles, write_profiles};
use super::{CameraProfile, ProfileError};
use crate::lens::DistortionCoefficients;
use crate::Real;

/// Registry of named camera profiles.
///
/// Keys are lowercase profile names. Built-in entries are tracked so that
/// saving can leave them out; adding a profile under a built-in name
/// replaces it and the entry counts as user-supplied from then on.
#[derive(Debug, Clone)]
pub struct CameraProfileManager {
    profiles: BTreeMap<String, CameraProfile>,
    builtin: BTreeSet<String>,
}

impl Default for CameraProfileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraProfileManager {
    /// Registry pre-populated with the built-in catalog.
    pub fn new() -> Self {
        let mut manager = Self::empty();
        for profile in builtin_profiles() {
            let key = profile.name.to_lowercase();
            manager.builtin.insert(key.clone());
            manager.profiles.insert(key, profile);
        }
        manager
    }

    pub fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
            builtin: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Look up a profile: case-insensitive exact name first, then the first
    /// name (in sorted order) containing the query as a substring.
    pub fn get(&self, name: &str) -> Option<&CameraProfile> {
        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        if let Some(profile) = self.profiles.get(&query) {
            return Some(profile);
        }
        self.profiles
            .iter()
            .find(|(key, _)| key.contains(&query))
            .map(|(_, profile)| profile)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin.contains(&name.to_lowercase())
    }

    /// All profiles in name order, optionally restricted to a manufacturer
    /// (case-insensitive).
    pub fn list(&self, manufacturer: Option<&str>) -> Vec<&CameraProfile> {
        let filter = manufacturer.map(str::to_lowercase);
        self.profiles
            .values()
            .filter(|p| match &filter {
                Some(m) => p.manufacturer.to_lowercase() == *m,
                None => true,
            })
            .collect()
    }

    /// Insert or replace a profile; returns the previous entry if any.
    pub fn add(&mut self, profile: CameraProfile) -> Option<CameraProfile> {
        let key = profile.name.to_lowercase();
        self.builtin.remove(&key);
        self.profiles.insert(key, profile)
    }

    /// Remove by exact (case-insensitive) name; reports whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let key = name.to_lowercase();
        self.builtin.remove(&key);
        self.profiles.remove(&key).is_some()
    }

    /// The profile whose sensor is closest to `width x height` mm, provided
    /// both dimensions are within `tolerance` mm.
    pub fn find_matching(&self, width: Real, height: Real, tolerance: Real) -> Option<&CameraProfile> {
        let mut best: Option<(Real, &CameraProfile)> = None;
        for profile in self.profiles.values() {
            let dw = (profile.sensor_width - width).abs();
            let dh = (profile.sensor_height - height).abs();
            if dw > tolerance || dh > tolerance {
                continue;
            }
            let dist = dw + dh;
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, profile));
            }
        }
        best.map(|(_, p)| p)
    }

    pub fn get_distortion_coefficients(&self, name: &str) -> Option<DistortionCoefficients> {
        self.get(name).map(CameraProfile::distortion_coefficients)
    }

    /// Distort a lens coordinate with a named profile; unknown names leave
    /// the input unchanged.
    pub fn apply_distortion(&self, x: Real, y: Real, name: &str) -> (Real, Real) {
        match self.get_distortion_coefficients(name) {
            Some(coeffs) => coeffs.apply(x, y),
            None => {
                debug!("unknown profile {name:?}; distortion not applied");
                (x, y)
            }
        }
    }

    /// Undistort a lens coordinate with a named profile; unknown names leave
    /// the input unchanged.
    pub fn remove_distortion(&self, x: Real, y: Real, name: &str) -> (Real, Real) {
        match self.get_distortion_coefficients(name) {
            Some(coeffs) => coeffs.remove(x, y),
            None => {
                debug!("unknown profile {name:?}; distortion not removed");
                (x, y)
            }
        }
    }

    /// Merge profiles from a JSON file; returns how many records were loaded.
    pub fn load_custom_profiles(&mut self, path: impl AsRef<Path>) -> Result<usize, ProfileError> {
        let path = path.as_ref();
        let profiles = read_profiles(path)?;
        let count = profiles.len();
        for profile in profiles {
            self.add(profile);
        }
        info!("loaded {count} camera profiles from {}", path.display());
        Ok(count)
    }

    /// Write the registry to a JSON file; returns how many records were written.
    pub fn save_profiles(&self, path: impl AsRef<Path>, include_builtin: bool) -> Result<usize, ProfileError> {
        let path = path.as_ref();
        let profiles: Vec<CameraProfile> = self
            .profiles
            .iter()
            .filter(|(key, _)| include_builtin || !self.builtin.contains(*key))
            .map(|(_, p)| p.clone())
            .collect();
        let count = profiles.len();
        write_profiles(path, profiles)?;
        info!("saved {count} camera profiles to {}", path.display());
        Ok(count)
    }
}

/// Process-wide registry with the built-in catalog, created on first use.
///
/// Components take a `&CameraProfileManager` explicitly; this is only a
/// convenience for callers without their own registry.
pub fn default_profile_manager() -> &'static RwLock<CameraProfileManager> {
    static DEFAULT: OnceLock<RwLock<CameraProfileManager>> = OnceLock::new();
    DEFAULT.get_or_init(|| RwLock::new(CameraProfileManager::new()))
}
