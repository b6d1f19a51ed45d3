//! ST-map generation.
//!
//! An ST-map stores, for every output pixel, the normalized UV of the
//! source-plate position to sample (red = u, green = v, origin top-left).
//! Maps are evaluated in centered lens coordinates with the distortion
//! model of `matchmove-core`, so a zero-distortion profile yields the
//! identity map and a purely radial one is point-symmetric about the
//! image center.
//!
//! PNG and OpenEXR writers sit behind the `png` and `exr` features; without
//! them the writers fall back to a JSON metadata file.

mod batch;
mod config;
mod generator;
mod io;

pub use batch::{BatchReport, STMapBatchGenerator};
pub use config::{BitDepth, STMapConfig};
pub use generator::{STMapGenerator, STMapResult};
pub use io::STMapMetadata;

use std::path::PathBuf;

/// Errors from map generation and output.
#[derive(Debug, thiserror::Error)]
pub enum StMapError {
    #[error("unknown camera profile `{0}`")]
    UnknownProfile(String),
    #[error("invalid ST-map resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
    #[error("failed to encode ST-map image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize ST-map metadata: {0}")]
    Json(#[from] serde_json::Error),
}
