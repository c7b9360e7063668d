use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CycleMergeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("No files found in {dir} matching {pattern}")]
    NoInput { dir: PathBuf, pattern: String },

    #[error("ref-index {index} is out of range [0, {count}) for {count} cycles")]
    IndexRange { index: usize, count: usize },

    #[error("cycle index {index} in channel selection is out of range [0, {count})")]
    CycleRange { index: usize, count: usize },

    #[error(
        "channel {channel} selected for cycle {cycle} is out of range [0, {channel_count})"
    )]
    ChannelRange {
        cycle: usize,
        channel: usize,
        channel_count: usize,
    },

    #[error("No channels specified for cycle {cycle} in channel selection")]
    EmptyChannelList { cycle: usize },

    #[error("Invalid channel selection block '{block}': {reason}")]
    InvalidSelection { block: String, reason: String },

    #[error("channel {channel} is selected more than once for cycle {cycle}")]
    DuplicateChannel { cycle: usize, channel: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "Insufficient features to align cycle {cycle}: {reference_keypoints} reference / \
         {moving_keypoints} moving keypoints, {matches} matches, {inliers} inliers"
    )]
    InsufficientFeatures {
        cycle: usize,
        reference_keypoints: usize,
        moving_keypoints: usize,
        matches: usize,
        inliers: usize,
    },

    #[error(
        "Registered channel {channel} of cycle {cycle} is {width}x{height}, \
         expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        cycle: usize,
        channel: usize,
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },

    #[error("No pixel size found in {0} and no fallback configured")]
    MissingCalibration(PathBuf),

    #[error("Unsupported pixel type in {path}: {detail}")]
    UnsupportedPixelType { path: PathBuf, detail: String },

    #[error("Invalid cycle image {path}: {detail}")]
    InvalidCycle { path: PathBuf, detail: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pyramid file {path}: {detail}")]
    InvalidPyramid { path: PathBuf, detail: String },
}

impl CycleMergeError {
    /// True for errors raised by validation before any image is opened.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::IndexRange { .. }
                | Self::CycleRange { .. }
                | Self::ChannelRange { .. }
                | Self::EmptyChannelList { .. }
                | Self::InvalidSelection { .. }
                | Self::DuplicateChannel { .. }
                | Self::InvalidConfig(_)
                | Self::Pattern(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CycleMergeError>;
