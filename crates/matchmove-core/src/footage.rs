//! Footage import: image sequences and video containers on disk.
//!
//! Sequences are described by their first (or any) frame. The last run of
//! digits in the file stem is the frame number and its width the padding;
//! siblings in the same directory with the same prefix, suffix and padding
//! form the sequence. Video containers are recognised by extension only and
//! are reported with container defaults, without decoding.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use image::ImageDecoder;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{Frame, Real};

pub const DEFAULT_FPS: Real = 24.0;

const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "mxf", "avi", "mkv", "webm", "r3d", "braw"];
const FRAME_EXTENSIONS: &[&str] = &["exr", "dpx", "png", "jpg", "jpeg", "tif", "tiff", "cin"];

#[derive(Debug, thiserror::Error)]
pub enum FootageError {
    #[error("footage not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported footage format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("no frame number in file name: {0}")]
    NoFrameNumber(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootageKind {
    ImageSequence,
    StillImage,
    Video,
}

/// What the tracker and solver need to know about a shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootageInfo {
    pub path: PathBuf,
    pub kind: FootageKind,
    pub is_sequence: bool,
    pub frame_start: Frame,
    pub frame_end: Frame,
    pub fps: Real,
    pub width: u32,
    pub height: u32,
}

impl FootageInfo {
    /// Footage description without a backing file, e.g. for frames supplied
    /// by a caller-side accessor.
    pub fn new(frame_start: Frame, frame_end: Frame, width: u32, height: u32) -> Self {
        Self {
            path: PathBuf::new(),
            kind: FootageKind::ImageSequence,
            is_sequence: true,
            frame_start,
            frame_end,
            fps: DEFAULT_FPS,
            width,
            height,
        }
    }

    pub fn frame_count(&self) -> usize {
        if self.frame_end < self.frame_start {
            0
        } else {
            (self.frame_end - self.frame_start + 1) as usize
        }
    }

    pub fn frames(&self) -> impl DoubleEndedIterator<Item = Frame> {
        self.frame_start..=self.frame_end
    }

    pub fn contains(&self, frame: Frame) -> bool {
        (self.frame_start..=self.frame_end).contains(&frame)
    }
}

/// A numbered image sequence found on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSequenceInfo {
    pub directory: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub padding: usize,
    pub frame_start: Frame,
    pub frame_end: Frame,
    pub missing_frames: Vec<Frame>,
    pub width: u32,
    pub height: u32,
}

impl ImageSequenceInfo {
    /// `printf`-style pattern, e.g. `plate.%04d.exr`.
    pub fn pattern(&self) -> String {
        format!("{}%0{}d{}", self.prefix, self.padding, self.suffix)
    }

    pub fn frame_path(&self, frame: Frame) -> PathBuf {
        let name = format!(
            "{}{:0width$}{}",
            self.prefix,
            frame,
            self.suffix,
            width = self.padding
        );
        self.directory.join(name)
    }

    pub fn frame_count(&self) -> usize {
        (self.frame_end - self.frame_start + 1) as usize - self.missing_frames.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: Real,
    pub frame_count: usize,
    pub duration_seconds: Real,
    pub codec: String,
    pub colorspace: String,
    pub bit_depth: u8,
    pub has_alpha: bool,
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_video(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext)
}

fn is_frame(ext: &str) -> bool {
    FRAME_EXTENSIONS.contains(&ext)
}

fn check_exists(path: &Path) -> Result<(), FootageError> {
    if path.exists() {
        Ok(())
    } else {
        Err(FootageError::NotFound(path.to_path_buf()))
    }
}

fn sanitize_fps(fps: Real) -> Real {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        DEFAULT_FPS
    }
}

/// Split a file name into `(prefix, digits, suffix)` around the last run of
/// digits in its stem.
fn split_frame_number(file_name: &str) -> Option<(&str, &str, &str)> {
    let stem_end = file_name.rfind('.').unwrap_or(file_name.len());
    let stem = &file_name[..stem_end];
    let end = stem.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = stem[..end]
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(0, |(i, c)| i + c.len_utf8());
    Some((&file_name[..start], &file_name[start..end], &file_name[end..]))
}

struct HeaderInfo {
    width: u32,
    height: u32,
    bit_depth: u8,
    has_alpha: bool,
}

/// Read resolution and pixel format from an image header, if the format is
/// one the image crate decodes.
fn read_header(path: &Path) -> Option<HeaderInfo> {
    let reader = image::ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    let decoder = match reader.into_decoder() {
        Ok(d) => d,
        Err(err) => {
            debug!("no header decoder for {}: {err}", path.display());
            return None;
        }
    };
    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    let channels = color.channel_count().max(1) as u16;
    Some(HeaderInfo {
        width,
        height,
        bit_depth: (color.bits_per_pixel() / channels) as u8,
        has_alpha: color.has_alpha(),
    })
}

/// Scan the directory of `path` for the numbered sequence it belongs to.
pub fn scan_image_sequence(path: impl AsRef<Path>) -> Result<ImageSequenceInfo, FootageError> {
    let path = path.as_ref();
    check_exists(path)?;
    let ext = extension_of(path).unwrap_or_default();
    if !is_frame(&ext) {
        return Err(FootageError::UnsupportedFormat(path.to_path_buf()));
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FootageError::NoFrameNumber(path.to_path_buf()))?;
    let (prefix, digits, suffix) =
        split_frame_number(file_name).ok_or_else(|| FootageError::NoFrameNumber(path.to_path_buf()))?;
    let padding = digits.len();

    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let entries = fs::read_dir(&directory).map_err(|source| FootageError::Io {
        path: directory.clone(),
        source,
    })?;

    let mut frames = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|source| FootageError::Io {
            path: directory.clone(),
            source,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(raw) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
        else {
            continue;
        };
        if raw.len() != padding || !raw.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(frame) = raw.parse::<Frame>() {
            frames.insert(frame);
        }
    }

    // The seed file always matches its own pattern.
    let (Some(&frame_start), Some(&frame_end)) = (frames.first(), frames.last()) else {
        return Err(FootageError::NoFrameNumber(path.to_path_buf()));
    };
    let missing_frames: Vec<Frame> = (frame_start..=frame_end)
        .filter(|f| !frames.contains(f))
        .collect();
    if !missing_frames.is_empty() {
        warn!(
            "sequence {prefix}{}{suffix} has {} missing frames",
            "#".repeat(padding),
            missing_frames.len()
        );
    }

    let header = read_header(path);
    Ok(ImageSequenceInfo {
        directory,
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
        padding,
        frame_start,
        frame_end,
        missing_frames,
        width: header.as_ref().map_or(0, |h| h.width),
        height: header.as_ref().map_or(0, |h| h.height),
    })
}

/// Import a video file or any frame of an image sequence.
///
/// Non-positive or non-finite `fps` falls back to [`DEFAULT_FPS`].
pub fn import_footage(path: impl AsRef<Path>, fps: Real) -> Result<FootageInfo, FootageError> {
    let path = path.as_ref();
    check_exists(path)?;
    let fps = sanitize_fps(fps);
    let ext = extension_of(path).unwrap_or_default();

    if is_video(&ext) {
        let meta = read_metadata(path, fps)?;
        return Ok(FootageInfo {
            path: path.to_path_buf(),
            kind: FootageKind::Video,
            is_sequence: false,
            frame_start: 1,
            frame_end: meta.frame_count.max(1) as Frame,
            fps,
            width: meta.width,
            height: meta.height,
        });
    }
    if !is_frame(&ext) {
        return Err(FootageError::UnsupportedFormat(path.to_path_buf()));
    }

    match scan_image_sequence(path) {
        Ok(seq) => Ok(FootageInfo {
            path: path.to_path_buf(),
            kind: FootageKind::ImageSequence,
            is_sequence: true,
            frame_start: seq.frame_start,
            frame_end: seq.frame_end,
            fps,
            width: seq.width,
            height: seq.height,
        }),
        Err(FootageError::NoFrameNumber(_)) => {
            let header = read_header(path);
            Ok(FootageInfo {
                path: path.to_path_buf(),
                kind: FootageKind::StillImage,
                is_sequence: false,
                frame_start: 1,
                frame_end: 1,
                fps,
                width: header.as_ref().map_or(0, |h| h.width),
                height: header.as_ref().map_or(0, |h| h.height),
            })
        }
        Err(err) => Err(err),
    }
}

/// Richer description of a footage file.
///
/// Image formats report what their header exposes. Video containers carry
/// container defaults: zero resolution and frame count, since no decoding
/// backend is linked.
pub fn read_metadata(path: impl AsRef<Path>, fps: Real) -> Result<VideoMetadata, FootageError> {
    let path = path.as_ref();
    check_exists(path)?;
    let fps = sanitize_fps(fps);
    let ext = extension_of(path).unwrap_or_default();

    if is_video(&ext) {
        let codec = match ext.as_str() {
            "mov" => "prores",
            "mxf" => "dnxhd",
            "r3d" => "redcode",
            "braw" => "braw",
            "webm" => "vp9",
            _ => "h264",
        };
        debug!("{}: video container, metadata from defaults", path.display());
        return Ok(VideoMetadata {
            path: path.to_path_buf(),
            width: 0,
            height: 0,
            fps,
            frame_count: 0,
            duration_seconds: 0.0,
            codec: codec.to_string(),
            colorspace: "rec709".to_string(),
            bit_depth: 8,
            has_alpha: false,
        });
    }
    if !is_frame(&ext) {
        return Err(FootageError::UnsupportedFormat(path.to_path_buf()));
    }

    let frame_count = match scan_image_sequence(path) {
        Ok(seq) => seq.frame_count(),
        Err(FootageError::NoFrameNumber(_)) => 1,
        Err(err) => return Err(err),
    };
    let header = read_header(path);
    let colorspace = if ext == "exr" { "linear" } else if ext == "dpx" || ext == "cin" { "log" } else { "srgb" };
    Ok(VideoMetadata {
        path: path.to_path_buf(),
        width: header.as_ref().map_or(0, |h| h.width),
        height: header.as_ref().map_or(0, |h| h.height),
        fps,
        frame_count,
        duration_seconds: frame_count as Real / fps,
        codec: ext.clone(),
        colorspace: colorspace.to_string(),
        bit_depth: header.as_ref().map_or(if ext == "exr" { 16 } else { 8 }, |h| h.bit_depth),
        has_alpha: header.as_ref().is_some_and(|h| h.has_alpha),
    })
}
