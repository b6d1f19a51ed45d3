//! Multi-frame point tracking.
//!
//! [`PointTracker`] seeds tracks with the detector engine, propagates them
//! frame by frame with the KLT tracker and replenishes them when too many
//! are lost. Frames are processed strictly in temporal order: each step
//! starts from the positions resolved by the previous one.

use image::GrayImage;
use log::{debug, info, warn};
use matchmove_core::{Frame, Progress, ProgressCallback, Pt2, Real};

use crate::detector::FeatureDetectorEngine;
use crate::klt::KltTracker;
use crate::types::{
    Track, TrackId, TrackPoint, TrackStatus, TrackingConfig, TrackingResult, TrackingSession,
};

/// Stages of [`PointTracker::auto_track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoTrackState {
    /// Initial tracks detected on the first readable frame.
    Seeded,
    /// Propagating active tracks to the next frame.
    Tracking,
    /// Detecting new tracks on the current frame.
    Replenishing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

fn pixel_to_uv(p: Pt2, image: &GrayImage) -> Pt2 {
    Pt2::new(p.x / image.width() as Real, p.y / image.height() as Real)
}

fn uv_to_pixel(p: Pt2, image: &GrayImage) -> Pt2 {
    Pt2::new(p.x * image.width() as Real, p.y * image.height() as Real)
}

/// Smallest normalized distance between a new detection and an existing
/// track, whatever the frame size.
pub const MIN_EXCLUSION_UV: Real = 0.005;

fn detector_settings_differ(a: &TrackingConfig, b: &TrackingConfig) -> bool {
    a.detector != b.detector
        || a.quality_level != b.quality_level
        || a.harris_k != b.harris_k
        || a.min_distance_px != b.min_distance_px
        || a.seed != b.seed
        || a.fallback_on_empty != b.fallback_on_empty
}

fn flow_settings_differ(a: &TrackingConfig, b: &TrackingConfig) -> bool {
    a.flow != b.flow
        || a.window_radius != b.window_radius
        || a.pyramid_levels != b.pyramid_levels
        || a.max_iterations != b.max_iterations
        || a.epsilon != b.epsilon
        || a.max_error != b.max_error
        || a.seed != b.seed
}

/// Detector + flow tracker driven over a frame range.
pub struct PointTracker {
    config: TrackingConfig,
    detector: FeatureDetectorEngine,
    klt: KltTracker,
    next_id: u64,
}

impl PointTracker {
    pub fn new(config: TrackingConfig) -> Self {
        let detector = FeatureDetectorEngine::from_config(&config);
        let klt = KltTracker::from_config(&config);
        Self::with_backends(config, detector, klt)
    }

    /// Tracker over caller-supplied detector and flow backends.
    pub fn with_backends(config: TrackingConfig, detector: FeatureDetectorEngine, klt: KltTracker) -> Self {
        Self {
            config,
            detector,
            klt,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Adopt `config`.
    ///
    /// The detector and flow backends are rebuilt only when their own
    /// settings changed; a new feature cap alone keeps the current detector.
    pub fn set_config(&mut self, config: TrackingConfig) {
        if config == self.config {
            return;
        }
        if detector_settings_differ(&config, &self.config) {
            self.detector = FeatureDetectorEngine::from_config(&config);
        } else {
            self.detector.set_max_features(config.max_features);
        }
        if flow_settings_differ(&config, &self.config) {
            self.klt = KltTracker::from_config(&config);
        }
        debug!(
            "tracker reconfigured: max {} / min {} features",
            config.max_features, config.min_features
        );
        self.config = config;
    }

    fn allocate_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Detect features at `frame` and wrap each one in a new single-point
    /// track.
    ///
    /// With `exclude_existing`, candidates closer than `min_distance_px` or
    /// [`MIN_EXCLUSION_UV`] to any of those tracks' positions at `frame` are
    /// discarded.
    pub fn detect_features(
        &mut self,
        frame: Frame,
        image: &GrayImage,
        exclude_existing: Option<&[Track]>,
    ) -> Vec<Track> {
        let (tracks, _) = self.detect_tracks(frame, image, exclude_existing, self.detector.max_features());
        tracks
    }

    fn detect_tracks(
        &mut self,
        frame: Frame,
        image: &GrayImage,
        exclude_existing: Option<&[Track]>,
        wanted: usize,
    ) -> (Vec<Track>, Vec<String>) {
        let detection = self.detector.detect(image, frame);
        let occupied: Vec<Pt2> = exclude_existing
            .unwrap_or(&[])
            .iter()
            .filter_map(|t| t.position_at(frame))
            .collect();
        let radius = self.config.min_distance_px.max(1.0);

        let status = self.config.status_for(frame);
        let mut tracks = Vec::new();
        for feature in &detection.features {
            if tracks.len() >= wanted {
                break;
            }
            let uv = pixel_to_uv(feature.position, image);
            let too_close = occupied.iter().any(|p| {
                (p - uv).norm() < MIN_EXCLUSION_UV
                    || (uv_to_pixel(*p, image) - feature.position).norm() < radius
            });
            if too_close {
                continue;
            }
            let id = self.allocate_id();
            tracks.push(Track::seeded(id, TrackPoint::new(frame, uv, status)));
        }
        debug!(
            "frame {frame}: {} of {} detections kept ({:?})",
            tracks.len(),
            detection.features.len(),
            detection.detector
        );
        (tracks, detection.warnings)
    }

    /// Propagate valid points from `prev_frame` to `next_frame`.
    ///
    /// Tracks that already hold a point at `next_frame` are left alone.
    fn step(
        &self,
        tracks: &mut [Track],
        prev_frame: Frame,
        prev: &GrayImage,
        next_frame: Frame,
        next: &GrayImage,
        result: &mut TrackingResult,
    ) {
        let mut indices = Vec::new();
        let mut points = Vec::new();
        for (i, track) in tracks.iter().enumerate() {
            if track.point_at(next_frame).is_some() {
                continue;
            }
            if let Some(uv) = track.position_at(prev_frame) {
                indices.push(i);
                points.push(uv_to_pixel(uv, prev));
            }
        }
        if indices.is_empty() {
            return;
        }

        let flow = self.klt.track(prev, next, &points);
        let status = self.config.status_for(next_frame);
        for (k, &i) in indices.iter().enumerate() {
            let track = &mut tracks[i];
            let point = if flow.status[k] {
                TrackPoint {
                    error: flow.errors[k],
                    ..TrackPoint::new(next_frame, pixel_to_uv(flow.points[k], next), status)
                }
            } else {
                let last = pixel_to_uv(points[k], prev);
                TrackPoint {
                    error: flow.errors[k],
                    ..TrackPoint::new(next_frame, last, TrackStatus::Lost)
                }
            };
            let lost = point.status == TrackStatus::Lost;
            match track.insert(point) {
                Ok(()) => {
                    if lost {
                        result.tracks_lost += 1;
                    }
                    if !result.tracks.contains(&track.id) {
                        result.tracks.push(track.id);
                    }
                }
                Err(e) => result.warnings.push(e.to_string()),
            }
        }
    }

    fn track_range<F>(
        &self,
        tracks: &mut [Track],
        start_frame: Frame,
        end_frame: Frame,
        mut get_frame: F,
        direction: Direction,
    ) -> TrackingResult
    where
        F: FnMut(Frame) -> Option<GrayImage>,
    {
        let mut result = TrackingResult::default();
        let ordered = match direction {
            Direction::Forward => start_frame <= end_frame,
            Direction::Backward => start_frame >= end_frame,
        };
        if !ordered {
            result.message = format!("{direction:?} tracking cannot run from {start_frame} to {end_frame}");
            result.warnings.push(result.message.clone());
            return result;
        }
        if tracks.is_empty() {
            result.message = "no tracks to propagate".to_string();
            result.warnings.push(result.message.clone());
            return result;
        }
        let Some(mut prev) = get_frame(start_frame) else {
            result.message = format!("start frame {start_frame} is unavailable");
            result.warnings.push(result.message.clone());
            return result;
        };

        let frames: Vec<Frame> = match direction {
            Direction::Forward => (start_frame + 1..=end_frame).collect(),
            Direction::Backward => (end_frame..start_frame).rev().collect(),
        };
        let mut prev_frame = start_frame;
        for frame in frames {
            let Some(next) = get_frame(frame) else {
                let msg = format!("frame {frame} is unavailable; skipped");
                warn!("{msg}");
                result.warnings.push(msg);
                continue;
            };
            self.step(tracks, prev_frame, &prev, frame, &next, &mut result);
            result.frames_tracked += 1;
            prev = next;
            prev_frame = frame;
        }

        result.success = true;
        result.message = format!(
            "tracked {} frames {direction:?}, {} tracks lost",
            result.frames_tracked, result.tracks_lost
        );
        result
    }

    /// Track from `start_frame` forward to `end_frame` (inclusive).
    pub fn track_forward<F>(&self, tracks: &mut [Track], start_frame: Frame, end_frame: Frame, get_frame: F) -> TrackingResult
    where
        F: FnMut(Frame) -> Option<GrayImage>,
    {
        self.track_range(tracks, start_frame, end_frame, get_frame, Direction::Forward)
    }

    /// Track from `start_frame` backward to `end_frame` (inclusive).
    pub fn track_backward<F>(&self, tracks: &mut [Track], start_frame: Frame, end_frame: Frame, get_frame: F) -> TrackingResult
    where
        F: FnMut(Frame) -> Option<GrayImage>,
    {
        self.track_range(tracks, start_frame, end_frame, get_frame, Direction::Backward)
    }

    /// Detect, track and replenish over the whole footage range of `session`.
    ///
    /// Runs with `session.config`, which replaces the tracker's own config
    /// for this and later calls. New tracks are appended to
    /// `session.tracks`. Unreadable frames are skipped with a warning;
    /// tracking resumes from the last readable one.
    pub fn auto_track<F>(
        &mut self,
        session: &mut TrackingSession,
        mut get_frame: F,
        progress: Option<ProgressCallback<'_>>,
    ) -> TrackingResult
    where
        F: FnMut(Frame) -> Option<GrayImage>,
    {
        self.set_config(session.config.clone());
        let mut progress = Progress::new(progress);
        let mut result = TrackingResult::default();
        let (first, last) = (session.footage.frame_start, session.footage.frame_end);
        if last < first {
            result.message = format!("empty frame range {first}..{last}");
            result.warnings.push(result.message.clone());
            return result;
        }
        self.next_id = self.next_id.max(session.peek_next_id());
        let total = (last - first) as usize;

        // The first readable frame seeds the session.
        let mut seed = None;
        for frame in first..=last {
            match get_frame(frame) {
                Some(image) => {
                    seed = Some((frame, image));
                    break;
                }
                None => {
                    let msg = format!("frame {frame} is unavailable; skipped");
                    warn!("{msg}");
                    result.warnings.push(msg);
                }
            }
        }
        let Some((mut prev_frame, mut prev)) = seed else {
            result.message = "no readable frames".to_string();
            return result;
        };

        progress.report(0.0, "detecting");
        let (seeded, warnings) = self.detect_tracks(
            prev_frame,
            &prev,
            Some(session.tracks.as_slice()),
            self.config.max_features,
        );
        result.warnings.extend(warnings);
        result.tracks_created += seeded.len();
        for track in seeded {
            result.tracks.push(track.id);
            session.add_track(track);
        }

        let mut state = AutoTrackState::Seeded;
        let mut frame = prev_frame;
        loop {
            state = match state {
                AutoTrackState::Seeded => {
                    debug!("seeded {} tracks at frame {prev_frame}", result.tracks_created);
                    if session.active_count_at(prev_frame) == 0 {
                        result.warnings.push(format!("no features found at frame {prev_frame}"));
                    }
                    AutoTrackState::Tracking
                }
                AutoTrackState::Tracking => {
                    frame += 1;
                    if frame > last {
                        AutoTrackState::Done
                    } else if let Some(next) = get_frame(frame) {
                        self.step(&mut session.tracks, prev_frame, &prev, frame, &next, &mut result);
                        result.frames_tracked += 1;
                        prev = next;
                        prev_frame = frame;
                        progress.report_span(0.0, 1.0, (frame - first) as usize, total, "tracking");
                        if session.active_count_at(frame) < self.config.min_features {
                            AutoTrackState::Replenishing
                        } else {
                            AutoTrackState::Tracking
                        }
                    } else {
                        let msg = format!("frame {frame} is unavailable; skipped");
                        warn!("{msg}");
                        result.warnings.push(msg);
                        AutoTrackState::Tracking
                    }
                }
                AutoTrackState::Replenishing => {
                    let active = session.active_count_at(prev_frame);
                    let wanted = self
                        .config
                        .max_features
                        .max(self.config.min_features)
                        .saturating_sub(active);
                    let (fresh, warnings) =
                        self.detect_tracks(prev_frame, &prev, Some(session.tracks.as_slice()), wanted);
                    result.warnings.extend(warnings);
                    debug!("frame {prev_frame}: {active} active, {} new tracks", fresh.len());
                    result.tracks_created += fresh.len();
                    for track in fresh {
                        result.tracks.push(track.id);
                        session.add_track(track);
                    }
                    progress.report_span(0.0, 1.0, (prev_frame - first) as usize, total, "replenishing");
                    AutoTrackState::Tracking
                }
                AutoTrackState::Done => break,
            };
        }

        result.success = !session.tracks.is_empty();
        result.message = format!(
            "{} frames tracked, {} tracks created, {} lost",
            result.frames_tracked, result.tracks_created, result.tracks_lost
        );
        info!("auto track: {}", result.message);
        progress.finish("done");
        result
    }
}
