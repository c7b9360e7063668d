use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use cyclemerge_core::catalog::CycleCatalog;
use cyclemerge_core::cycle::Cycle;
use cyclemerge_core::error::CycleMergeError;
use cyclemerge_core::io::{CycleReader, PyramidLayout};

#[derive(Args)]
pub struct InfoArgs {
    /// Cycle directory, cycle image, or registered pyramid
    pub path: PathBuf,

    /// Filename pattern used when `path` is a directory
    #[arg(long, default_value = "*.{ome.tif,ome.tiff}")]
    pub pattern: String,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    if args.path.is_dir() {
        let catalog = CycleCatalog::open(&args.path, &args.pattern, 0)
            .with_context(|| format!("Failed to read cycles in {}", args.path.display()))?;
        println!("Directory:   {}", args.path.display());
        println!("Cycles:      {}", catalog.len());
        for cycle in catalog.cycles() {
            println!();
            print_cycle(cycle);
        }
        return Ok(());
    }

    match PyramidLayout::read(&args.path) {
        Ok(layout) => print_layout(&args.path, &layout),
        Err(CycleMergeError::InvalidPyramid { .. }) => {
            let reader = CycleReader::open(&args.path)?;
            print_cycle(&reader.to_cycle(0));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn print_cycle(cycle: &Cycle) {
    println!("File:        {}", cycle.source.display());
    println!("Channels:    {}", cycle.channel_count);
    println!("Dimensions:  {}x{}", cycle.width, cycle.height);
    println!("Pixel type:  {}", cycle.pixel_type);
    match cycle.calibration {
        Some(cal) => println!(
            "Pixel size:  {} x {} {}",
            cal.pixel_size_x, cal.pixel_size_y, cal.unit
        ),
        None => println!("Pixel size:  unknown"),
    }
    let total_mb = (cycle.plane_bytes() * cycle.channel_count) as f64 / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", total_mb);
}

fn print_layout(path: &std::path::Path, layout: &PyramidLayout) {
    println!("File:        {}", path.display());
    println!("Channels:    {}", layout.channel_count());
    println!("Levels:      {}", layout.level_count());
    println!(
        "Samples:     {} bit, format {}",
        layout.bits_per_sample, layout.sample_format
    );
    if let Some(cal) = layout.calibration() {
        println!(
            "Pixel size:  {} x {} {}",
            cal.pixel_size_x, cal.pixel_size_y, cal.unit
        );
    }

    if let Some(first) = layout.channels.first() {
        println!();
        for (level, dims) in first.levels.iter().enumerate() {
            println!(
                "  Level {}:   {}x{} ({} tiles of {}x{}, compression {})",
                level,
                dims.width,
                dims.height,
                dims.tiles,
                dims.tile_width,
                dims.tile_height,
                dims.compression
            );
        }
    }

    let names = layout.channel_names();
    if !names.is_empty() {
        println!();
        for (i, name) in names.iter().enumerate() {
            println!("  Channel {}: {}", i, name);
        }
    }
}
