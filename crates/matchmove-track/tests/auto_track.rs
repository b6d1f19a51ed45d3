use image::GrayImage;
use matchmove_core::synthetic::{random_blob_centers, render_blobs};
use matchmove_core::{Frame, FootageInfo, ProgressCallback, Pt2, Vec2};
use matchmove_track::{
    DetectorKind, FeatureDetectorBackend, FeatureDetectorEngine, FeaturePoint, FlowKind,
    KltTracker, PointTracker, Track, TrackId, TrackPoint, TrackStatus, TrackingConfig,
    TrackingSession, MIN_EXCLUSION_UV,
};

/// Reports fixed pixel positions on every frame.
struct FixedPoints(Vec<Pt2>);

impl FeatureDetectorBackend for FixedPoints {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Fallback
    }

    fn detect(&self, _image: &GrayImage, _frame: Frame, max_features: usize) -> Vec<FeaturePoint> {
        self.0
            .iter()
            .take(max_features)
            .map(|&position| FeaturePoint {
                position,
                strength: 1.0,
                scale: 1.0,
                orientation: 0.0,
            })
            .collect()
    }
}

fn fallback_session(frames: i64, min_features: usize) -> TrackingSession {
    let config = TrackingConfig {
        detector: DetectorKind::Fallback,
        flow: FlowKind::Fallback,
        min_features,
        ..TrackingConfig::default()
    };
    TrackingSession::new(FootageInfo::new(1, frames, 320, 240), config)
}

#[test]
fn auto_track_keeps_minimum_track_count() {
    let mut session = fallback_session(20, 30);
    let mut tracker = PointTracker::new(session.config.clone());

    let mut fractions = Vec::new();
    let mut cb = |f: f64, _: &str| fractions.push(f);
    let result = tracker.auto_track(
        &mut session,
        |_| Some(GrayImage::new(320, 240)),
        Some(&mut cb as ProgressCallback),
    );

    assert!(result.success, "{}", result.message);
    assert!(result.tracks.len() >= 30);
    assert_eq!(result.frames_tracked, 19);
    assert!(session.active_count_at(20) >= 30);
    assert_eq!(fractions.last().copied(), Some(1.0));
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn auto_track_replenishes_below_minimum() {
    let mut session = fallback_session(30, 190);
    session.config.max_features = 200;
    let mut tracker = PointTracker::new(session.config.clone());
    let result = tracker.auto_track(&mut session, |_| Some(GrayImage::new(320, 240)), None);

    assert!(result.success);
    assert!(result.tracks_created > 200, "created {}", result.tracks_created);
    assert_eq!(result.tracks_created, session.track_count());

    let mut ids: Vec<TrackId> = session.tracks.iter().map(|t| t.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), session.track_count());
}

#[test]
fn auto_track_without_frames_fails_softly() {
    let mut session = fallback_session(5, 10);
    let mut tracker = PointTracker::new(session.config.clone());
    let result = tracker.auto_track(&mut session, |_| None, None);
    assert!(!result.success);
    assert_eq!(result.warnings.len(), 5);
    assert!(session.tracks.is_empty());
}

#[test]
fn detection_skips_existing_track_positions() {
    let config = TrackingConfig {
        detector: DetectorKind::Fallback,
        flow: FlowKind::Fallback,
        max_features: 400,
        ..TrackingConfig::default()
    };
    let mut tracker = PointTracker::new(config);
    let image = GrayImage::new(320, 240);
    let center = Pt2::new(0.5, 0.5);
    let existing = [Track::seeded(
        TrackId(999),
        TrackPoint::new(1, center, TrackStatus::Ok),
    )];

    let fresh = tracker.detect_features(1, &image, Some(&existing[..]));
    assert!(!fresh.is_empty());
    for track in &fresh {
        let uv = track.position_at(1).expect("seeded point");
        assert!((uv - center).norm() >= 0.005, "{} at {uv}", track.id);
    }
}

#[test]
fn detection_exclusion_scales_with_large_frames() {
    let config = TrackingConfig {
        detector: DetectorKind::Fallback,
        flow: FlowKind::Fallback,
        ..TrackingConfig::default()
    };
    // 15 px right of center is inside min_distance_px's reach on small
    // frames but only 0.0039 UV away on a 3840 px wide one.
    let near = Pt2::new(1935.0, 1080.0);
    let far = Pt2::new(2400.0, 1080.0);
    let detector = FeatureDetectorEngine::new(Box::new(FixedPoints(vec![near, far])), 10);
    let klt = KltTracker::from_config(&config);
    let mut tracker = PointTracker::with_backends(config, detector, klt);

    let image = GrayImage::new(3840, 2160);
    let center = Pt2::new(0.5, 0.5);
    let existing = [Track::seeded(TrackId(7), TrackPoint::new(1, center, TrackStatus::Ok))];

    let fresh = tracker.detect_features(1, &image, Some(&existing[..]));
    assert_eq!(fresh.len(), 1);
    let uv = fresh[0].position_at(1).expect("seeded point");
    assert!((uv - center).norm() >= MIN_EXCLUSION_UV, "kept {uv}");
    assert!((uv.x - 0.625).abs() < 1e-12);
}

#[test]
fn auto_track_follows_session_config() {
    let mut session = fallback_session(6, 30);
    session.config.max_features = 40;
    let mut tracker = PointTracker::new(TrackingConfig {
        detector: DetectorKind::Fallback,
        flow: FlowKind::Fallback,
        ..TrackingConfig::default()
    });
    assert_eq!(tracker.config().max_features, 200);

    let result = tracker.auto_track(&mut session, |_| Some(GrayImage::new(320, 240)), None);

    assert!(result.success, "{}", result.message);
    assert_eq!(tracker.config(), &session.config);
    assert!(session.active_count_at(1) <= 40, "seeded {}", session.active_count_at(1));
    assert!(session.active_count_at(1) >= 30);
    assert!(result.tracks_created < 200, "created {}", result.tracks_created);
}

#[test]
fn lucas_kanade_tracks_moving_blobs() {
    let centers = random_blob_centers(240, 180, 20, 30.0, 5);
    let velocity = Vec2::new(1.2, 0.7);
    let frame_image = |f: i64| {
        let moved: Vec<Pt2> = centers.iter().map(|c| c + velocity * f as f64).collect();
        render_blobs(240, 180, &moved, 3.0)
    };

    let config = TrackingConfig {
        max_features: 30,
        min_distance_px: 12.0,
        ..TrackingConfig::default()
    };
    let mut tracker = PointTracker::new(config);
    let mut tracks = tracker.detect_features(0, &frame_image(0), None);
    assert!(!tracks.is_empty());

    let result = tracker.track_forward(&mut tracks, 0, 5, |f| Some(frame_image(f)));
    assert!(result.success);
    assert_eq!(result.frames_tracked, 5);

    let survivors: Vec<&Track> = tracks.iter().filter(|t| t.is_active_at(5)).collect();
    assert!(survivors.len() * 2 >= tracks.len());
    for track in survivors {
        let start = track.position_at(0).expect("seed");
        let end = track.position_at(5).expect("tracked");
        let moved_px = Vec2::new((end.x - start.x) * 240.0, (end.y - start.y) * 180.0);
        assert!((moved_px - velocity * 5.0).norm() < 1.0, "{} moved {moved_px}", track.id);
    }
}
