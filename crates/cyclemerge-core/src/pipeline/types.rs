use std::path::PathBuf;

use serde::Serialize;

use crate::align::CycleAlignment;
use crate::concat::ChannelMap;
use crate::cycle::{CalibrationMetadata, PixelType};
use crate::pyramid::LevelDims;

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Discovery,
    Alignment,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovery => write!(f, "Discovering cycles"),
            Self::Alignment => write!(f, "Aligning cycles"),
            Self::Writing => write!(f, "Writing registered channels"),
        }
    }
}

/// What a finished registration run hands back to its caller.
#[derive(Clone, Debug, Serialize)]
pub struct RegistrationOutput {
    pub path: PathBuf,
    /// Output channel order with origin and display name.
    pub channel_map: ChannelMap,
    pub width: usize,
    pub height: usize,
    pub pixel_type: PixelType,
    pub levels: Vec<LevelDims>,
    pub calibration: CalibrationMetadata,
    /// Moving cycles left out because their alignment failed.
    pub skipped_cycles: Vec<usize>,
    #[serde(skip)]
    pub alignments: Vec<CycleAlignment>,
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (cycles or channels), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when `run_registration` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
