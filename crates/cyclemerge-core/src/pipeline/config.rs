use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_BLOCK_SIZE, DEFAULT_MATCH_RATIO, DEFAULT_MAX_BLOCK_SHIFT, DEFAULT_MAX_KEYPOINTS,
    DEFAULT_MAX_PYRAMID_LEVELS, DEFAULT_MIN_BLOCK_CONFIDENCE, DEFAULT_MIN_INLIERS,
    DEFAULT_MIN_LEVEL_SIZE, DEFAULT_RANSAC_ITERATIONS, DEFAULT_RANSAC_SEED,
    DEFAULT_RANSAC_THRESHOLD, DEFAULT_THUMBNAIL_SIZE, DEFAULT_TILE_SIZE,
};
use crate::error::{CycleMergeError, Result};
use crate::selection::DuplicatePolicy;

/// TIFF tiles must be a multiple of 16 on each edge.
const TILE_ALIGNMENT: usize = 16;

/// Highest working level accepted for alignment.
const MAX_WORKING_LEVEL: usize = 8;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub pyramid: PyramidConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory holding one image per cycle.
    pub dir: PathBuf,
    /// Filename pattern; `{a,b}` alternatives are expanded.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Index of the reference cycle in sorted filename order.
    #[serde(default)]
    pub reference_index: usize,
    /// Optional CSV with one marker name per output channel.
    #[serde(default)]
    pub markers: Option<PathBuf>,
    /// Pixel size in micrometres, used when the reference cycle has none.
    #[serde(default)]
    pub pixel_size: Option<f64>,
}

fn default_pattern() -> String {
    "*.{ome.tif,ome.tiff}".into()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            pattern: default_pattern(),
            reference_index: 0,
            markers: None,
            pixel_size: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default = "default_tile_size")]
    pub tile_size: usize,
}

fn default_tile_size() -> usize {
    DEFAULT_TILE_SIZE
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("registered.ome.tif"),
            compression: Compression::default(),
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

/// Lossless tile compression of the output file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    /// Adobe Deflate (zlib stream).
    #[default]
    Zlib,
    Lzw,
}

impl Compression {
    /// TIFF Compression tag value.
    pub fn tiff_code(self) -> u16 {
        match self {
            Self::None => 1,
            Self::Lzw => 5,
            Self::Zlib => 8,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Zlib => write!(f, "zlib"),
            Self::Lzw => write!(f, "lzw"),
        }
    }
}

/// What to do with a moving cycle whose coarse alignment fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentFailurePolicy {
    #[default]
    Abort,
    Skip,
}

impl fmt::Display for AlignmentFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Registration channel of the reference cycle.
    pub reference_channel: usize,
    /// Registration channel of every moving cycle.
    pub moving_channel: usize,
    /// Pyramid level (2^level reduction) the transform is estimated at.
    pub level: usize,
    /// Longer edge of the coarse-stage thumbnail.
    pub thumbnail_size: usize,
    pub max_keypoints: usize,
    pub match_ratio: f32,
    pub ransac_threshold: f64,
    pub ransac_iterations: usize,
    pub ransac_seed: u64,
    pub min_inliers: usize,
    /// Fine-stage block edge, in working-level pixels.
    pub block_size: usize,
    pub min_block_confidence: f64,
    pub max_block_shift: f64,
    pub on_failure: AlignmentFailurePolicy,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            reference_channel: 0,
            moving_channel: 0,
            level: 0,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            max_keypoints: DEFAULT_MAX_KEYPOINTS,
            match_ratio: DEFAULT_MATCH_RATIO,
            ransac_threshold: DEFAULT_RANSAC_THRESHOLD,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
            ransac_seed: DEFAULT_RANSAC_SEED,
            min_inliers: DEFAULT_MIN_INLIERS,
            block_size: DEFAULT_BLOCK_SIZE,
            min_block_confidence: DEFAULT_MIN_BLOCK_CONFIDENCE,
            max_block_shift: DEFAULT_MAX_BLOCK_SHIFT,
            on_failure: AlignmentFailurePolicy::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// `cycle:ch,ch;cycle:ch` string; unset keeps every channel.
    pub channels: Option<String>,
    pub duplicates: DuplicatePolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidConfig {
    pub max_levels: usize,
    /// Smallest shorter edge a reduced level may have.
    pub min_level_size: usize,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            max_levels: DEFAULT_MAX_PYRAMID_LEVELS,
            min_level_size: DEFAULT_MIN_LEVEL_SIZE,
        }
    }
}

fn invalid(msg: String) -> CycleMergeError {
    CycleMergeError::InvalidConfig(msg)
}

impl RegistrationConfig {
    /// Check parameter ranges. Runs before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if self.input.pattern.trim().is_empty() {
            return Err(invalid("input.pattern must not be empty".into()));
        }
        if let Some(size) = self.input.pixel_size {
            if !(size.is_finite() && size > 0.0) {
                return Err(invalid(format!(
                    "input.pixel_size must be positive, got {}",
                    size
                )));
            }
        }

        let tile = self.output.tile_size;
        if tile == 0 || tile % TILE_ALIGNMENT != 0 {
            return Err(invalid(format!(
                "output.tile_size must be a positive multiple of {}, got {}",
                TILE_ALIGNMENT, tile
            )));
        }

        let a = &self.alignment;
        if a.level > MAX_WORKING_LEVEL {
            return Err(invalid(format!(
                "alignment.level must be in [0, {}], got {}",
                MAX_WORKING_LEVEL, a.level
            )));
        }
        if a.thumbnail_size < 64 {
            return Err(invalid(format!(
                "alignment.thumbnail_size must be at least 64, got {}",
                a.thumbnail_size
            )));
        }
        if a.max_keypoints < 3 {
            return Err(invalid(format!(
                "alignment.max_keypoints must be at least 3, got {}",
                a.max_keypoints
            )));
        }
        if !(a.match_ratio > 0.0 && a.match_ratio <= 1.0) {
            return Err(invalid(format!(
                "alignment.match_ratio must be in (0, 1], got {}",
                a.match_ratio
            )));
        }
        if !(a.ransac_threshold > 0.0) || a.ransac_iterations == 0 {
            return Err(invalid(
                "alignment.ransac_threshold and alignment.ransac_iterations must be positive"
                    .into(),
            ));
        }
        if a.min_inliers < 3 {
            return Err(invalid(format!(
                "alignment.min_inliers must be at least 3, got {}",
                a.min_inliers
            )));
        }
        if a.block_size < 32 {
            return Err(invalid(format!(
                "alignment.block_size must be at least 32, got {}",
                a.block_size
            )));
        }
        if !(a.max_block_shift >= 0.0) {
            return Err(invalid(format!(
                "alignment.max_block_shift must not be negative, got {}",
                a.max_block_shift
            )));
        }

        if self.pyramid.max_levels == 0 {
            return Err(invalid("pyramid.max_levels must be at least 1".into()));
        }
        Ok(())
    }
}
