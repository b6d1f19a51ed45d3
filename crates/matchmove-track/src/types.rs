use std::collections::{BTreeMap, BTreeSet};

use matchmove_core::{FootageInfo, Frame, Pt2, Real};
use serde::{Deserialize, Serialize};

/// Per-frame state of a tracked point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Ok,
    Keyframe,
    Lost,
}

impl TrackStatus {
    pub fn is_valid(self) -> bool {
        !matches!(self, TrackStatus::Lost)
    }
}

/// One observation of a track. `position` is normalized UV (0–1, v down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub frame: Frame,
    pub position: Pt2,
    pub status: TrackStatus,
    /// Flow residual of the step that produced this point; 0 for detections.
    pub error: Real,
}

impl TrackPoint {
    pub fn new(frame: Frame, position: Pt2, status: TrackStatus) -> Self {
        Self {
            frame,
            position,
            status,
            error: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track_{:04}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("{id} already has a point at frame {frame}")]
    FrameExists { id: TrackId, frame: Frame },
    #[error("{id} is lost next to frame {frame}; a new detection is required")]
    Revive { id: TrackId, frame: Frame },
}

/// Trajectory of one feature.
///
/// Points are append-only: an existing frame is never overwritten and a
/// valid point cannot be added on the far side of a `Lost` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    points: BTreeMap<Frame, TrackPoint>,
    keyframes: BTreeSet<Frame>,
}

impl Track {
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            name: id.to_string(),
            points: BTreeMap::new(),
            keyframes: BTreeSet::new(),
        }
    }

    /// Track with a single detected point.
    pub fn seeded(id: TrackId, point: TrackPoint) -> Self {
        let mut track = Self::new(id);
        track.points.insert(point.frame, point);
        if point.status == TrackStatus::Keyframe {
            track.keyframes.insert(point.frame);
        }
        track
    }

    pub fn insert(&mut self, point: TrackPoint) -> Result<(), TrackError> {
        let frame = point.frame;
        if self.points.contains_key(&frame) {
            return Err(TrackError::FrameExists { id: self.id, frame });
        }
        if point.status.is_valid() {
            let lost_before = self
                .points
                .range(..frame)
                .next_back()
                .is_some_and(|(_, p)| p.status == TrackStatus::Lost);
            let lost_after = self
                .points
                .range(frame..)
                .next()
                .is_some_and(|(_, p)| p.status == TrackStatus::Lost);
            if lost_before || lost_after {
                return Err(TrackError::Revive { id: self.id, frame });
            }
        }
        if point.status == TrackStatus::Keyframe {
            self.keyframes.insert(frame);
        }
        self.points.insert(frame, point);
        Ok(())
    }

    pub fn points(&self) -> impl DoubleEndedIterator<Item = &TrackPoint> {
        self.points.values()
    }

    /// Valid (non-lost) points in frame order.
    pub fn valid_points(&self) -> impl DoubleEndedIterator<Item = &TrackPoint> {
        self.points.values().filter(|p| p.status.is_valid())
    }

    pub fn keyframes(&self) -> &BTreeSet<Frame> {
        &self.keyframes
    }

    pub fn point_at(&self, frame: Frame) -> Option<&TrackPoint> {
        self.points.get(&frame)
    }

    /// UV position at `frame` if the track has a valid point there.
    pub fn position_at(&self, frame: Frame) -> Option<Pt2> {
        self.point_at(frame)
            .filter(|p| p.status.is_valid())
            .map(|p| p.position)
    }

    pub fn is_active_at(&self, frame: Frame) -> bool {
        self.position_at(frame).is_some()
    }

    pub fn first_frame(&self) -> Option<Frame> {
        self.points.keys().next().copied()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.points.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn valid_len(&self) -> usize {
        self.valid_points().count()
    }

    /// Ended by a `Lost` marker at its last frame.
    pub fn is_lost(&self) -> bool {
        self.points
            .values()
            .next_back()
            .is_some_and(|p| p.status == TrackStatus::Lost)
    }
}

/// Which feature detector backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    #[default]
    ShiTomasi,
    Harris,
    Fallback,
}

/// Which optical flow backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    #[default]
    LucasKanade,
    Fallback,
}

/// Tracking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub detector: DetectorKind,
    pub flow: FlowKind,
    /// Hard cap on features per detection.
    pub max_features: usize,
    /// Replenish when fewer tracks than this are active.
    pub min_features: usize,
    pub keyframe_interval: u32,
    pub auto_keyframe: bool,
    pub min_distance_px: Real,
    /// Corner threshold relative to the strongest response.
    pub quality_level: Real,
    /// Harris `k`.
    pub harris_k: Real,
    /// LK patch half-size.
    pub window_radius: u32,
    pub pyramid_levels: u32,
    pub max_iterations: u32,
    /// LK convergence threshold in pixels.
    pub epsilon: Real,
    /// Mean absolute patch difference (0–255) above which a point is lost.
    pub max_error: Real,
    pub seed: u64,
    /// Use the grid detector when the selected detector finds nothing.
    pub fallback_on_empty: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::ShiTomasi,
            flow: FlowKind::LucasKanade,
            max_features: 200,
            min_features: 50,
            keyframe_interval: 10,
            auto_keyframe: true,
            min_distance_px: 10.0,
            quality_level: 0.01,
            harris_k: 0.04,
            window_radius: 7,
            pyramid_levels: 3,
            max_iterations: 30,
            epsilon: 0.01,
            max_error: 30.0,
            seed: 0,
            fallback_on_empty: true,
        }
    }
}

impl TrackingConfig {
    /// Whether points appended at `frame` are keyframe-marked.
    pub fn is_keyframe(&self, frame: Frame) -> bool {
        self.auto_keyframe
            && self.keyframe_interval > 0
            && frame.rem_euclid(self.keyframe_interval as Frame) == 0
    }

    pub fn status_for(&self, frame: Frame) -> TrackStatus {
        if self.is_keyframe(frame) {
            TrackStatus::Keyframe
        } else {
            TrackStatus::Ok
        }
    }
}

/// Tracks of one shot plus the footage and settings that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSession {
    pub footage: FootageInfo,
    pub config: TrackingConfig,
    pub tracks: Vec<Track>,
    next_id: u64,
}

impl TrackingSession {
    pub fn new(footage: FootageInfo, config: TrackingConfig) -> Self {
        Self {
            footage,
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn next_track_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Smallest id not yet handed out by this session.
    pub fn peek_next_id(&self) -> u64 {
        self.next_id
    }

    pub fn add_track(&mut self, track: Track) {
        self.next_id = self.next_id.max(track.id.0 + 1);
        self.tracks.push(track);
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn active_tracks_at(&self, frame: Frame) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.is_active_at(frame)).collect()
    }

    pub fn active_count_at(&self, frame: Frame) -> usize {
        self.tracks.iter().filter(|t| t.is_active_at(frame)).count()
    }
}

/// Outcome of a tracking run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingResult {
    pub success: bool,
    pub frames_tracked: usize,
    pub tracks_lost: usize,
    pub tracks_created: usize,
    /// Tracks touched by the run.
    pub tracks: Vec<TrackId>,
    pub message: String,
    pub warnings: Vec<String>,
}
