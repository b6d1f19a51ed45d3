use std::fs;

use image::GrayImage;
use matchmove::prelude::*;
use matchmove::solve::IntrinsicsMask;
use matchmove::synthetic::{random_blob_centers, render_blobs, SyntheticScene};
use matchmove::track::{DetectorKind, FlowKind, Track, TrackPoint, TrackStatus};
use matchmove::{Vec2, STMapBatchGenerator};
use tempfile::tempdir;

fn lens_profile() -> CameraProfile {
    let mut profile = CameraProfile::new("test_lens_35");
    profile.manufacturer = "Test".into();
    profile.focal_length = 35.0;
    profile.sensor_width = 36.0;
    profile.with_distortion(DistortionCoefficients::radial(-0.05, 0.0, 0.0))
}

fn session_from(scene: &SyntheticScene) -> TrackingSession {
    let last = scene.first_frame + scene.poses.len() as i64 - 1;
    let footage = FootageInfo::new(scene.first_frame, last, scene.camera.width, scene.camera.height);
    let mut session = TrackingSession::new(footage, TrackingConfig::default());
    let mut tracks: Vec<Track> = (0..scene.points.len())
        .map(|_| Track::new(session.next_track_id()))
        .collect();
    for (point, frame, uv) in scene.observations(0.2, 3) {
        tracks[point]
            .insert(TrackPoint::new(frame, uv, TrackStatus::Ok))
            .expect("one observation per frame");
    }
    for track in tracks.into_iter().filter(|t| !t.is_empty()) {
        session.add_track(track);
    }
    session
}

#[test]
fn distorted_shot_solves_with_profile_lens() {
    let profile = lens_profile();
    let camera = CameraModel::from_focal_mm(1920, 1080, 35.0, 36.0, profile.distortion_coefficients());
    let scene = SyntheticScene::dolly(camera, 30, 1001, 40, 11);
    let session = session_from(&scene);

    let mut ctx = MatchmoveContext::new();
    ctx.profiles_mut().add(profile);
    ctx.config_mut().profile = Some("test_lens_35".into());
    ctx.config_mut().solve.refine_intrinsics = IntrinsicsMask::NONE;

    let mut stages = Vec::new();
    let mut cb = |f: f64, stage: &str| stages.push((f, stage.to_string()));
    let (report, solve) = ctx.solve(&session, Some(&mut cb as ProgressCallback));

    assert!(report.success, "{report:?}");
    assert!(report.average_error < 1.0, "mean error {}", report.average_error);
    assert_eq!(stages.last().map(|s| s.0), Some(1.0));

    let solve = solve.expect("successful solve keeps a snapshot");
    assert_eq!(solve.intrinsics.distortion.k1, -0.05);
    assert!((solve.intrinsics.focal_mm - 35.0).abs() < 1e-9);
    assert!(solve.camera_at(1020).is_some());
}

#[test]
fn config_file_drives_profiles_and_stmaps() {
    let dir = tempdir().unwrap();
    let profiles_path = dir.path().join("profiles.json");
    fs::write(
        &profiles_path,
        r#"{ "version": 1, "profiles": [
            { "name": "studio_a", "manufacturer": "Studio", "focal_length": 24.0, "k1": -0.1 }
        ] }"#,
    )
    .unwrap();

    let config_path = dir.path().join("shot.json");
    let config = format!(
        r#"{{
            "profile": "studio_a",
            "custom_profiles": {},
            "stmap": {{ "width": 64, "height": 36, "bit_depth": "16" }}
        }}"#,
        serde_json::to_string(&profiles_path).unwrap()
    );
    fs::write(&config_path, config).unwrap();

    let ctx = MatchmoveContext::from_json_file(&config_path).unwrap();
    assert_eq!(ctx.profile().unwrap().focal_length, 24.0);
    assert_eq!(ctx.solve_config().focal_length_mm, 24.0);

    let map = ctx.stmap(None).unwrap();
    assert_eq!((map.width(), map.height()), (64, 36));
    let corner = map.uv_at(0, 0).unwrap();
    assert!(corner.x != 0.5 / 64.0, "barrel profile must move the corner");

    let out = dir.path().join("maps");
    let report = ctx.export_stmaps(&[(64, 36), (32, 18)], &out).unwrap();
    assert_eq!(report.written.len(), 2, "{:?}", report.warnings);
    let expected = STMapBatchGenerator::new(ctx.config().stmap.clone()).file_name("studio_a", 32, 18);
    assert!(out.join(expected).exists());
}

#[test]
fn fallback_tracking_through_context() {
    let mut ctx = MatchmoveContext::new();
    ctx.config_mut().tracking = TrackingConfig {
        detector: DetectorKind::Fallback,
        flow: FlowKind::Fallback,
        min_features: 20,
        ..TrackingConfig::default()
    };
    let mut session = TrackingSession::new(FootageInfo::new(1, 12, 320, 240), ctx.config().tracking.clone());

    let mut fractions = Vec::new();
    let mut cb = |f: f64, _: &str| fractions.push(f);
    let result = ctx.track(&mut session, |_| Some(GrayImage::new(320, 240)), Some(&mut cb as ProgressCallback));

    assert!(result.success, "{}", result.message);
    assert_eq!(result.frames_tracked, 11);
    assert!(session.active_count_at(12) >= 20);
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn image_sequence_is_tracked_from_disk() {
    let dir = tempdir().unwrap();
    let centers = random_blob_centers(240, 180, 15, 30.0, 21);
    let velocity = Vec2::new(1.0, -0.5);
    for frame in 1..=4_i64 {
        let moved: Vec<Pt2> = centers.iter().map(|c| c + velocity * frame as f64).collect();
        render_blobs(240, 180, &moved, 3.0)
            .save(dir.path().join(format!("plate.{frame:04}.png")))
            .unwrap();
    }
    let first = dir.path().join("plate.0001.png");

    let mut ctx = MatchmoveContext::new();
    ctx.config_mut().tracking.max_features = 30;
    ctx.config_mut().tracking.min_features = 1;
    ctx.config_mut().tracking.min_distance_px = 12.0;

    let mut session = ctx.open_footage(&first, 25.0).unwrap();
    assert_eq!((session.footage.frame_start, session.footage.frame_end), (1, 4));
    assert_eq!((session.footage.width, session.footage.height), (240, 180));

    let frames = SequenceFrames::new(matchmove::core::scan_image_sequence(&first).unwrap());
    let result = ctx.track(&mut session, |f| frames.read(f), None);

    assert!(result.success, "{}", result.message);
    assert_eq!(result.frames_tracked, 3);
    assert!(session.active_count_at(4) > 0);
}
