use std::sync::Arc;

use tracing::{info, warn};

use crate::align::{AlignmentEstimator, CycleAlignment, Transform};
use crate::catalog::{check_reference_index, discover, CycleCatalog};
use crate::concat::{check_dimensions, plan_stack};
use crate::error::{CycleMergeError, Result};
use crate::io::cycle_reader::CycleReader;
use crate::io::{markers, ome_xml};
use crate::io::{PyramidTiffWriter, PyramidWriterOptions};
use crate::pyramid::{plan_levels, Pyramid};
use crate::resample::resample_channel;
use crate::selection::ChannelSelection;

use super::config::{AlignmentFailurePolicy, RegistrationConfig};
use super::types::{NoOpReporter, PipelineStage, ProgressReporter, RegistrationOutput};

/// Registration channels must exist in the cycles that provide them.
fn check_registration_channels(catalog: &CycleCatalog, config: &RegistrationConfig) -> Result<()> {
    let reference = catalog.reference();
    let wanted = config.alignment.reference_channel;
    if wanted >= reference.channel_count {
        return Err(CycleMergeError::ChannelRange {
            cycle: reference.index,
            channel: wanted,
            channel_count: reference.channel_count,
        });
    }
    let wanted = config.alignment.moving_channel;
    if let Some(cycle) = catalog.moving().find(|c| wanted >= c.channel_count) {
        return Err(CycleMergeError::ChannelRange {
            cycle: cycle.index,
            channel: wanted,
            channel_count: cycle.channel_count,
        });
    }
    Ok(())
}

/// Estimate every moving cycle's transform before any output is written.
///
/// Returns one alignment per cycle (`None` for skipped cycles) and the
/// skipped cycle indices.
fn align_cycles(
    catalog: &CycleCatalog,
    readers: &[CycleReader],
    config: &RegistrationConfig,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<(Vec<Option<CycleAlignment>>, Vec<usize>)> {
    let reference_index = catalog.reference_index();
    let mut alignments: Vec<Option<CycleAlignment>> = vec![None; catalog.len()];
    alignments[reference_index] = Some(CycleAlignment::reference(reference_index));
    let mut skipped = Vec::new();

    let moving: Vec<usize> = catalog.moving().map(|c| c.index).collect();
    if moving.is_empty() {
        return Ok((alignments, skipped));
    }

    reporter.begin_stage(PipelineStage::Alignment, Some(moving.len()));
    let reference_plane =
        readers[reference_index].read_channel(config.alignment.reference_channel)?;
    let estimator = AlignmentEstimator::new(&reference_plane, &config.alignment);
    drop(reference_plane);

    for (done, &cycle) in moving.iter().enumerate() {
        let plane = readers[cycle].read_channel(config.alignment.moving_channel)?;
        match estimator.estimate(cycle, &plane) {
            Ok(alignment) => alignments[cycle] = Some(alignment),
            Err(e @ CycleMergeError::InsufficientFeatures { .. }) => {
                if config.alignment.on_failure == AlignmentFailurePolicy::Skip {
                    warn!(cycle, error = %e, "Alignment failed, cycle excluded from the output");
                    skipped.push(cycle);
                } else {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
        reporter.advance(done + 1);
    }
    reporter.finish_stage();

    Ok((alignments, skipped))
}

/// Run the full registration with a thread-safe progress reporter.
pub fn run_registration_reported(
    config: &RegistrationConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RegistrationOutput> {
    config.validate()?;

    // Everything that can be checked without pixel data is checked first.
    reporter.begin_stage(PipelineStage::Discovery, None);
    let paths = discover(&config.input.dir, &config.input.pattern)?;
    check_reference_index(config.input.reference_index, paths.len())?;
    let selection = ChannelSelection::from_option(config.selection.channels.as_deref(), paths.len())?;

    let readers = paths
        .iter()
        .map(|p| CycleReader::open(p))
        .collect::<Result<Vec<_>>>()?;
    let cycles = readers
        .iter()
        .enumerate()
        .map(|(index, r)| r.to_cycle(index))
        .collect();
    let catalog = CycleCatalog::new(cycles, config.input.reference_index)?;
    let selected = selection.resolve(&catalog.channel_counts(), config.selection.duplicates)?;
    check_registration_channels(&catalog, config)?;
    let calibration = catalog.calibration(config.input.pixel_size)?;
    reporter.finish_stage();

    let reference = catalog.reference();
    let (width, height, pixel_type) = (reference.width, reference.height, reference.pixel_type);
    info!(
        cycles = catalog.len(),
        reference = reference.index,
        width,
        height,
        pixel_type = %pixel_type,
        pixel_size_x = calibration.pixel_size_x,
        pixel_size_y = calibration.pixel_size_y,
        unit = %calibration.unit,
        "Reading cycles"
    );

    let (alignments, skipped_cycles) = align_cycles(&catalog, &readers, config, &reporter)?;
    let transforms: Vec<Transform> = alignments
        .iter()
        .map(|a| a.as_ref().map_or_else(Transform::identity, |a| a.full_resolution_transform()))
        .collect();

    let mut channel_map = plan_stack(&selected, &skipped_cycles);
    if let Some(names) = markers::channel_names(config.input.markers.as_deref(), channel_map.len()) {
        channel_map.apply_names(&names);
    }

    let levels = plan_levels(
        width,
        height,
        config.pyramid.max_levels,
        config.pyramid.min_level_size,
    );
    info!(
        channels = channel_map.len(),
        levels = levels.len(),
        skipped = skipped_cycles.len(),
        compression = %config.output.compression,
        "Writing pyramid"
    );

    let description = ome_xml::build(width, height, pixel_type, &calibration, &channel_map.names());
    let options = PyramidWriterOptions {
        tile_size: config.output.tile_size,
        compression: config.output.compression,
        software: format!("cyclemerge {}", env!("CARGO_PKG_VERSION")),
    };
    let mut writer = PyramidTiffWriter::create(
        &config.output.path,
        width,
        height,
        pixel_type,
        calibration,
        description,
        options,
    )?;

    reporter.begin_stage(PipelineStage::Writing, Some(channel_map.len()));
    for (done, origin) in channel_map.iter().enumerate() {
        let source = readers[origin.cycle].read_channel(origin.source_channel)?;
        let mut registered = resample_channel(source, &transforms[origin.cycle], width, height);
        registered.par_mapv_inplace(|v| pixel_type.quantize(v));
        check_dimensions(origin, &registered, width, height)?;

        writer.write_channel(Pyramid::new(
            registered,
            config.pyramid.max_levels,
            config.pyramid.min_level_size,
        ))?;
        reporter.advance(done + 1);
    }
    writer.finish()?;
    reporter.finish_stage();

    info!(
        path = %config.output.path.display(),
        channels = channel_map.len(),
        "Registration complete"
    );

    Ok(RegistrationOutput {
        path: config.output.path.clone(),
        channel_map,
        width,
        height,
        pixel_type,
        levels,
        calibration,
        skipped_cycles,
        alignments: alignments.into_iter().flatten().collect(),
    })
}

/// Run the full registration without progress reporting.
pub fn run_registration(config: &RegistrationConfig) -> Result<RegistrationOutput> {
    let reporter = Arc::new(NoOpReporter);
    run_registration_reported(config, reporter)
}
