use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use cyclemerge_core::consts::{
    DEFAULT_MAX_PYRAMID_LEVELS, DEFAULT_MIN_LEVEL_SIZE, DEFAULT_THUMBNAIL_SIZE, DEFAULT_TILE_SIZE,
};
use cyclemerge_core::pipeline::config::{
    AlignmentConfig, AlignmentFailurePolicy, Compression, InputConfig, OutputConfig, PyramidConfig,
    RegistrationConfig, SelectionConfig,
};
use cyclemerge_core::pipeline::{run_registration_reported, PipelineStage, ProgressReporter};
use cyclemerge_core::selection::DuplicatePolicy;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::summary::{print_registration_summary, print_result_summary};

#[derive(Clone, ValueEnum)]
pub enum CompressionArg {
    None,
    Zlib,
    Lzw,
}

#[derive(Clone, ValueEnum)]
pub enum FailurePolicyArg {
    Abort,
    Skip,
}

#[derive(Args)]
pub struct RegisterArgs {
    /// Directory holding one image per cycle
    pub dir: Option<PathBuf>,

    /// Registration config file (TOML); replaces all other options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Filename pattern, `{a,b}` alternatives allowed
    #[arg(long, default_value = "*.{ome.tif,ome.tiff}")]
    pub pattern: String,

    /// Index of the reference cycle in sorted filename order
    #[arg(long, default_value = "0")]
    pub ref_index: usize,

    /// Registration channel of the reference cycle
    #[arg(long, default_value = "0")]
    pub reference_channel: usize,

    /// Registration channel of the moving cycles
    #[arg(long, default_value = "0")]
    pub moving_channel: usize,

    /// Pyramid level the transforms are estimated at
    #[arg(long, default_value = "0")]
    pub level: usize,

    /// Longer edge of the coarse alignment thumbnail
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE)]
    pub thumbnail_size: usize,

    /// Channels to keep, e.g. "0:0,1;2:3" (default: all)
    #[arg(long)]
    pub channels: Option<String>,

    /// Fail when a channel is selected twice for one cycle
    #[arg(long)]
    pub reject_duplicates: bool,

    /// What to do when a moving cycle cannot be aligned
    #[arg(long, value_enum, default_value = "abort")]
    pub on_failure: FailurePolicyArg,

    /// Tile compression
    #[arg(long, value_enum, default_value = "zlib")]
    pub compression: CompressionArg,

    /// Maximum number of pyramid levels
    #[arg(long, default_value_t = DEFAULT_MAX_PYRAMID_LEVELS)]
    pub max_levels: usize,

    /// Smallest shorter edge of a reduced level
    #[arg(long, default_value_t = DEFAULT_MIN_LEVEL_SIZE)]
    pub min_level_size: usize,

    /// Tile edge length (multiple of 16)
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: usize,

    /// CSV with one marker name per output channel
    #[arg(long)]
    pub markers: Option<PathBuf>,

    /// Pixel size in micrometres when the reference cycle has none
    #[arg(long)]
    pub pixel_size: Option<f64>,

    /// Output file path
    #[arg(short, long, default_value = "registered.ome.tif")]
    pub output: PathBuf,
}

/// Drives one indicatif bar across pipeline stages.
struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:28} [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        Ok(Self { bar })
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        self.bar.set_message(stage.to_string());
        self.bar.set_length(total_items.unwrap_or(0) as u64);
        self.bar.set_position(0);
    }

    fn advance(&self, items_done: usize) {
        self.bar.set_position(items_done as u64);
    }
}

pub fn run(args: &RegisterArgs) -> Result<()> {
    let config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        debug!(path = %config_path.display(), "Loading registration config");
        toml::from_str(&contents).context("Invalid registration config")?
    } else {
        build_config_from_args(args)?
    };

    print_registration_summary(&config);

    let reporter = Arc::new(BarReporter::new()?);
    let result = run_registration_reported(&config, reporter.clone());
    reporter.bar.finish_and_clear();
    let output = match result {
        Err(e) if e.is_configuration() => bail!("Invalid registration parameters: {}", e),
        result => result.with_context(|| {
            format!("Registration of {} failed", config.input.dir.display())
        })?,
    };

    print_result_summary(&output);
    Ok(())
}

fn build_config_from_args(args: &RegisterArgs) -> Result<RegistrationConfig> {
    let Some(ref dir) = args.dir else {
        bail!("an input directory or --config is required");
    };

    let compression = match args.compression {
        CompressionArg::None => Compression::None,
        CompressionArg::Zlib => Compression::Zlib,
        CompressionArg::Lzw => Compression::Lzw,
    };
    let on_failure = match args.on_failure {
        FailurePolicyArg::Abort => AlignmentFailurePolicy::Abort,
        FailurePolicyArg::Skip => AlignmentFailurePolicy::Skip,
    };
    let duplicates = if args.reject_duplicates {
        DuplicatePolicy::Reject
    } else {
        DuplicatePolicy::Allow
    };

    Ok(RegistrationConfig {
        input: InputConfig {
            dir: dir.clone(),
            pattern: args.pattern.clone(),
            reference_index: args.ref_index,
            markers: args.markers.clone(),
            pixel_size: args.pixel_size,
        },
        output: OutputConfig {
            path: args.output.clone(),
            compression,
            tile_size: args.tile_size,
        },
        alignment: AlignmentConfig {
            reference_channel: args.reference_channel,
            moving_channel: args.moving_channel,
            level: args.level,
            thumbnail_size: args.thumbnail_size,
            on_failure,
            ..Default::default()
        },
        selection: SelectionConfig {
            channels: args.channels.clone(),
            duplicates,
        },
        pyramid: PyramidConfig {
            max_levels: args.max_levels,
            min_level_size: args.min_level_size,
        },
    })
}
