//! Track observations regrouped per frame for the solver.

use std::collections::BTreeMap;

use matchmove_core::{Frame, Pt2, Real};
use matchmove_track::{TrackId, TrackingSession};

/// Pixel observations of every usable track, grouped by frame.
///
/// Tracks are addressed by their index into [`Self::track_ids`].
#[derive(Debug, Clone, Default)]
pub struct TrackObservations {
    pub width: u32,
    pub height: u32,
    pub track_ids: Vec<TrackId>,
    pub frames: BTreeMap<Frame, BTreeMap<usize, Pt2>>,
}

impl TrackObservations {
    /// Collect valid points of tracks with at least two of them, optionally
    /// restricted to an inclusive frame range.
    pub fn from_session(
        session: &TrackingSession,
        width: u32,
        height: u32,
        frame_range: Option<(Frame, Frame)>,
    ) -> Self {
        let in_range = |f: Frame| frame_range.map_or(true, |(a, b)| f >= a.min(b) && f <= a.max(b));
        let (w, h) = (width as Real, height as Real);

        let mut out = Self {
            width,
            height,
            ..Self::default()
        };
        for track in &session.tracks {
            let points: Vec<_> = track
                .valid_points()
                .filter(|p| in_range(p.frame))
                .filter(|p| p.position.x.is_finite() && p.position.y.is_finite())
                .collect();
            if points.len() < 2 {
                continue;
            }
            let idx = out.track_ids.len();
            out.track_ids.push(track.id);
            for p in points {
                let pixel = Pt2::new(p.position.x * w, p.position.y * h);
                out.frames.entry(p.frame).or_default().insert(idx, pixel);
            }
        }
        out
    }

    pub fn num_tracks(&self) -> usize {
        self.track_ids.len()
    }

    pub fn num_observations(&self) -> usize {
        self.frames.values().map(BTreeMap::len).sum()
    }

    /// Number of tracks seen in both frames.
    pub fn overlap(&self, a: Frame, b: Frame) -> usize {
        match (self.frames.get(&a), self.frames.get(&b)) {
            (Some(fa), Some(fb)) => fa.keys().filter(|k| fb.contains_key(k)).count(),
            _ => 0,
        }
    }

    /// `(track index, frame, pixel)` for every observation, in frame order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Frame, Pt2)> + '_ {
        self.frames
            .iter()
            .flat_map(|(f, obs)| obs.iter().map(move |(i, p)| (*i, *f, *p)))
    }

    /// Keyframe pair spanning the widest stretch of well-tracked footage.
    ///
    /// The first keyframe is the first frame observing at least
    /// `min_overlap` tracks. The second is the last later frame still sharing
    /// `min_overlap` tracks with it, or else the later frame sharing the most
    /// (at least two).
    pub fn select_keyframes(&self, min_overlap: usize) -> Option<(Frame, Frame)> {
        let min_overlap = min_overlap.max(2);
        let f1 = self
            .frames
            .iter()
            .find(|(_, obs)| obs.len() >= min_overlap)
            .map(|(f, _)| *f)?;

        let mut last_good = None;
        let mut best: Option<(usize, Frame)> = None;
        for &f in self.frames.keys().filter(|f| **f > f1) {
            let shared = self.overlap(f1, f);
            if shared >= min_overlap {
                last_good = Some(f);
            }
            if shared >= 2 && best.map_or(true, |(n, _)| shared >= n) {
                best = Some((shared, f));
            }
        }
        last_good
            .or(best.map(|(_, f)| f))
            .map(|f2| (f1, f2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchmove_core::FootageInfo;
    use matchmove_track::{Track, TrackPoint, TrackStatus, TrackingConfig};

    fn session_with(spans: &[(Frame, Frame)]) -> TrackingSession {
        let mut session = TrackingSession::new(FootageInfo::new(1, 50, 100, 50), TrackingConfig::default());
        for &(a, b) in spans {
            let id = session.next_track_id();
            let mut track = Track::new(id);
            for f in a..=b {
                track
                    .insert(TrackPoint::new(f, Pt2::new(0.5, 0.25), TrackStatus::Ok))
                    .unwrap();
            }
            session.add_track(track);
        }
        session
    }

    #[test]
    fn short_tracks_are_dropped_and_pixels_scaled() {
        let session = session_with(&[(1, 1), (1, 3)]);
        let obs = TrackObservations::from_session(&session, 100, 50, None);
        assert_eq!(obs.num_tracks(), 1);
        assert_eq!(obs.num_observations(), 3);
        assert_eq!(obs.frames[&2][&0], Pt2::new(50.0, 12.5));
    }

    #[test]
    fn frame_range_filters_points() {
        let session = session_with(&[(1, 10), (5, 20)]);
        let obs = TrackObservations::from_session(&session, 100, 50, Some((8, 6)));
        assert_eq!(obs.num_tracks(), 2);
        assert_eq!(obs.frames.keys().copied().collect::<Vec<_>>(), vec![6, 7, 8]);
    }

    #[test]
    fn keyframes_span_coverage() {
        let mut spans = vec![(1, 40); 8];
        spans.push((30, 50));
        let session = session_with(&spans);
        let obs = TrackObservations::from_session(&session, 100, 50, None);
        assert_eq!(obs.select_keyframes(8), Some((1, 40)));
        assert_eq!(obs.select_keyframes(9), Some((30, 40)));
        assert_eq!(obs.select_keyframes(10), None);
    }

    #[test]
    fn keyframes_fall_back_to_best_overlap() {
        let session = session_with(&[(1, 5), (1, 5), (1, 5), (1, 3)]);
        let obs = TrackObservations::from_session(&session, 100, 50, None);
        assert_eq!(obs.select_keyframes(3), Some((1, 5)));
        assert_eq!(obs.select_keyframes(4), Some((1, 3)));

        let session = session_with(&[(0, 1), (0, 1), (1, 5), (1, 5), (1, 5)]);
        let obs = TrackObservations::from_session(&session, 100, 50, None);
        assert_eq!(obs.select_keyframes(5), Some((1, 5)));
    }
}
