use image::GrayImage;
use log::warn;
use matchmove_core::{Frame, ImageSequenceInfo};

/// Reads grayscale frames of an image sequence on demand.
///
/// Missing or undecodable frames come back as `None` so the tracker can
/// skip them with a warning.
#[derive(Debug, Clone)]
pub struct SequenceFrames {
    sequence: ImageSequenceInfo,
}

impl SequenceFrames {
    pub fn new(sequence: ImageSequenceInfo) -> Self {
        Self { sequence }
    }

    pub fn sequence(&self) -> &ImageSequenceInfo {
        &self.sequence
    }

    pub fn read(&self, frame: Frame) -> Option<GrayImage> {
        if frame < self.sequence.frame_start
            || frame > self.sequence.frame_end
            || self.sequence.missing_frames.contains(&frame)
        {
            return None;
        }
        let path = self.sequence.frame_path(frame);
        match image::open(&path) {
            Ok(img) => Some(img.to_luma8()),
            Err(e) => {
                warn!("cannot decode frame {frame} ({}): {e}", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchmove_core::scan_image_sequence;

    #[test]
    fn reads_present_frames_only() {
        let dir = tempfile::tempdir().unwrap();
        for frame in [1, 2, 4] {
            GrayImage::from_pixel(8, 6, image::Luma([frame as u8 * 10]))
                .save(dir.path().join(format!("plate.{frame:04}.png")))
                .unwrap();
        }
        let seq = scan_image_sequence(dir.path().join("plate.0001.png")).unwrap();
        let frames = SequenceFrames::new(seq);

        let img = frames.read(2).unwrap();
        assert_eq!(img.dimensions(), (8, 6));
        assert_eq!(img.get_pixel(0, 0)[0], 20);
        assert!(frames.read(3).is_none());
        assert!(frames.read(5).is_none());
    }
}
