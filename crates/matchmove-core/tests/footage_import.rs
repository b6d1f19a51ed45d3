use image::GrayImage;
use matchmove_core::{import_footage, read_metadata, scan_image_sequence, FootageError, FootageKind};
use tempfile::tempdir;

fn write_frame(dir: &std::path::Path, name: &str) {
    GrayImage::new(64, 48).save(dir.join(name)).unwrap();
}

#[test]
fn sequence_with_gap_is_scanned() {
    let dir = tempdir().unwrap();
    for frame in [1001, 1002, 1004, 1005] {
        write_frame(dir.path(), &format!("plate_v2.{frame:04}.png"));
    }
    // Different padding and prefix are not part of the sequence.
    write_frame(dir.path(), "plate_v2.01003.png");
    write_frame(dir.path(), "other.1003.png");

    let seq = scan_image_sequence(dir.path().join("plate_v2.1002.png")).unwrap();
    assert_eq!(seq.prefix, "plate_v2.");
    assert_eq!(seq.suffix, ".png");
    assert_eq!(seq.padding, 4);
    assert_eq!((seq.frame_start, seq.frame_end), (1001, 1005));
    assert_eq!(seq.missing_frames, vec![1003]);
    assert_eq!((seq.width, seq.height), (64, 48));
    assert_eq!(seq.pattern(), "plate_v2.%04d.png");

    let info = import_footage(dir.path().join("plate_v2.1001.png"), 25.0).unwrap();
    assert!(info.is_sequence);
    assert_eq!(info.kind, FootageKind::ImageSequence);
    assert_eq!(info.frame_count(), 5);
    assert_eq!(info.fps, 25.0);
    assert_eq!((info.width, info.height), (64, 48));
}

#[test]
fn metadata_reads_header() {
    let dir = tempdir().unwrap();
    for frame in 1..=3 {
        write_frame(dir.path(), &format!("bg_{frame:03}.png"));
    }
    let meta = read_metadata(dir.path().join("bg_001.png"), 0.0).unwrap();
    assert_eq!(meta.frame_count, 3);
    assert_eq!(meta.fps, 24.0);
    assert_eq!(meta.bit_depth, 8);
    assert!(!meta.has_alpha);
    assert!((meta.duration_seconds - 0.125).abs() < 1e-12);
}

#[test]
fn still_and_video_and_errors() {
    let dir = tempdir().unwrap();
    write_frame(dir.path(), "still.png");
    let still = import_footage(dir.path().join("still.png"), 24.0).unwrap();
    assert_eq!(still.kind, FootageKind::StillImage);
    assert_eq!(still.frame_count(), 1);

    let clip = dir.path().join("clip.mov");
    std::fs::write(&clip, b"not really a movie").unwrap();
    let video = import_footage(&clip, 23.976).unwrap();
    assert_eq!(video.kind, FootageKind::Video);
    assert!(!video.is_sequence);
    assert_eq!(read_metadata(&clip, 23.976).unwrap().codec, "prores");

    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "hello").unwrap();
    assert!(matches!(
        import_footage(&notes, 24.0),
        Err(FootageError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        import_footage(dir.path().join("nope.0001.exr"), 24.0),
        Err(FootageError::NotFound(_))
    ));
}
