use matchmove_core::{CameraProfile, CameraProfileManager, DistortionCoefficients};
use matchmove_stmap::{BitDepth, STMapBatchGenerator, STMapConfig, STMapGenerator, StMapError};

fn generator(width: u32, height: u32) -> STMapGenerator {
    STMapGenerator::new(STMapConfig {
        width,
        height,
        ..STMapConfig::default()
    })
}

#[test]
fn generic_profile_center_is_half() {
    let manager = CameraProfileManager::new();
    let map = generator(101, 57)
        .generate_from_name(&manager, "generic", None)
        .unwrap();
    let uv = map.uv_at(50, 28).unwrap();
    assert!((uv.x - 0.5).abs() < 0.01 && (uv.y - 0.5).abs() < 0.01);
}

#[test]
fn radial_map_is_point_symmetric() {
    let mut profile = CameraProfile::new("radial");
    profile.k1 = -0.2;
    profile.k2 = 0.05;
    for encode_undistort in [true, false] {
        let map = STMapGenerator::new(STMapConfig {
            width: 48,
            height: 27,
            encode_undistort,
            ..STMapConfig::default()
        })
        .generate(&profile, None)
        .unwrap();
        for (x, y) in [(0, 0), (5, 20), (47, 3), (23, 13)] {
            let a = map.uv_at(x, y).unwrap();
            let b = map.uv_at(47 - x, 26 - y).unwrap();
            assert!((a.x + b.x - 1.0).abs() < 1e-5, "u at ({x}, {y})");
            assert!((a.y + b.y - 1.0).abs() < 1e-5, "v at ({x}, {y})");
        }
    }
}

#[test]
fn progress_reaches_completion() {
    let mut last = 0.0;
    let mut calls = 0;
    let mut cb = |f: f64, _: &str| {
        assert!(f >= last);
        last = f;
        calls += 1;
    };
    generator(32, 200)
        .generate_from_coefficients(DistortionCoefficients::radial(0.1, 0.0, 0.0), Some(&mut cb as matchmove_core::ProgressCallback))
        .unwrap();
    assert!(calls >= 2);
    assert_eq!(last, 1.0);
}

#[test]
fn unknown_profile_is_an_error() {
    let manager = CameraProfileManager::new();
    let err = generator(16, 16)
        .generate_from_name(&manager, "no_such_camera_xyz", None)
        .unwrap_err();
    assert!(matches!(err, StMapError::UnknownProfile(ref n) if n == "no_such_camera_xyz"));

    let dir = tempfile::tempdir().unwrap();
    let batch = STMapBatchGenerator::default();
    assert!(batch
        .generate_for_resolutions(&manager, "no_such_camera_xyz", &[(8, 8)], dir.path())
        .is_err());
}

#[test]
fn batch_writes_each_resolution_and_reports_failures() -> anyhow::Result<()> {
    let manager = CameraProfileManager::new();
    let dir = tempfile::tempdir()?;
    let batch = STMapBatchGenerator::new(STMapConfig {
        bit_depth: BitDepth::Eight,
        ..STMapConfig::default()
    });
    let report = batch.generate_for_resolutions(
        &manager,
        "gopro_hero12_wide",
        &[(64, 36), (0, 10), (32, 18)],
        dir.path().join("maps"),
    )?;
    assert_eq!(report.written.len(), 2);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("0x10"));
    for path in &report.written {
        assert!(path.exists(), "{} missing", path.display());
    }
    assert!(report.written[0]
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("gopro_hero12_wide_64x36")));
    Ok(())
}
