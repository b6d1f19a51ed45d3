use matchmove_core::Real;
use serde::{Deserialize, Serialize};

/// Channel depth of written maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitDepth {
    #[serde(rename = "8")]
    Eight,
    #[default]
    #[serde(rename = "16")]
    Sixteen,
    /// Float. PNG output falls back to 16-bit.
    #[serde(rename = "32")]
    ThirtyTwo,
}

impl BitDepth {
    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
            BitDepth::ThirtyTwo => 32,
        }
    }

    /// File extension [`crate::STMapBatchGenerator`] writes at this depth.
    pub fn extension(self) -> &'static str {
        match self {
            BitDepth::ThirtyTwo => "exr",
            _ => "png",
        }
    }
}

/// ST-map output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct STMapConfig {
    pub width: u32,
    pub height: u32,
    pub bit_depth: BitDepth,
    /// Store distorted source coordinates per undistorted output pixel
    /// (forward distortion). Otherwise store the inverse mapping.
    pub encode_undistort: bool,
    /// Extra sampled area around the frame; `0.1` covers 10 % more on each axis.
    pub overscan: Real,
}

impl Default for STMapConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            bit_depth: BitDepth::default(),
            encode_undistort: true,
            overscan: 0.0,
        }
    }
}

impl STMapConfig {
    pub fn with_resolution(&self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self.clone()
        }
    }
}
