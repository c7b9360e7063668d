mod common;

use std::path::Path;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use cyclemerge_core::cycle::{CalibrationMetadata, LengthUnit, PixelType};
use cyclemerge_core::io::{ome_xml, CycleReader, PyramidLayout, PyramidTiffWriter, PyramidWriterOptions};
use cyclemerge_core::pipeline::config::Compression;
use cyclemerge_core::pyramid::{plan_levels, Pyramid};

use common::texture;

const MAX_LEVELS: usize = 4;
const MIN_SIZE: usize = 16;

fn write_stack(path: &Path, planes: &[Array2<f32>], pixel_type: PixelType, compression: Compression) {
    let (h, w) = planes[0].dim();
    let calibration = CalibrationMetadata::isotropic(0.325, LengthUnit::Micrometer);
    let names: Vec<String> = (0..planes.len()).map(|i| format!("marker {}", i)).collect();
    let description = ome_xml::build(w, h, pixel_type, &calibration, &names);
    let options = PyramidWriterOptions {
        tile_size: 32,
        compression,
        software: "cyclemerge test".into(),
    };

    let mut writer =
        PyramidTiffWriter::create(path, w, h, pixel_type, calibration, description, options).unwrap();
    for plane in planes {
        writer
            .write_channel(Pyramid::new(plane.clone(), MAX_LEVELS, MIN_SIZE))
            .unwrap();
    }
    assert_eq!(writer.channels_written(), planes.len());
    writer.finish().unwrap();
}

fn round_trip(compression: Compression) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.ome.tif");
    // Edges that are not tile multiples exercise the zero padding.
    let planes = vec![texture(100, 70, 1), texture(100, 70, 2)];
    write_stack(&path, &planes, PixelType::U16, compression);

    let reader = CycleReader::open(&path).unwrap();
    assert_eq!(reader.channel_count(), 2);
    assert_eq!(reader.dimensions(), (100, 70));
    assert_eq!(reader.pixel_type(), PixelType::U16);
    for (i, plane) in planes.iter().enumerate() {
        assert_eq!(&reader.read_channel(i).unwrap(), plane, "channel {}", i);
    }

    let layout = PyramidLayout::read(&path).unwrap();
    assert_eq!(layout.channel_count(), 2);
    for channel in &layout.channels {
        assert_eq!(channel.levels[0].compression, compression.tiff_code());
    }
}

#[test]
fn test_round_trip_uncompressed() {
    round_trip(Compression::None);
}

#[test]
fn test_round_trip_zlib() {
    round_trip(Compression::Zlib);
}

#[test]
fn test_round_trip_lzw() {
    round_trip(Compression::Lzw);
}

#[test]
fn test_float_samples_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("float.ome.tif");
    let plane = Array2::from_shape_fn((40, 50), |(r, c)| r as f32 * 0.25 - c as f32 * 1.5);
    write_stack(&path, &[plane.clone()], PixelType::F32, Compression::Zlib);

    let reader = CycleReader::open(&path).unwrap();
    assert_eq!(reader.pixel_type(), PixelType::F32);
    assert_eq!(reader.read_channel(0).unwrap(), plane);
}

#[test]
fn test_layout_has_sub_resolutions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pyr.ome.tif");
    let planes = vec![texture(150, 90, 3), texture(150, 90, 4), texture(150, 90, 5)];
    write_stack(&path, &planes, PixelType::U16, Compression::Zlib);

    let layout = PyramidLayout::read(&path).unwrap();
    let plan = plan_levels(150, 90, MAX_LEVELS, MIN_SIZE);
    assert_eq!(layout.channel_count(), 3);
    assert_eq!(layout.level_count(), plan.len());
    assert_eq!(layout.bits_per_sample, 16);
    assert_eq!(layout.sample_format, 1);

    for channel in &layout.channels {
        for (level, dims) in channel.levels.iter().zip(&plan) {
            assert_eq!((level.width, level.height), (dims.width as u64, dims.height as u64));
            assert_eq!((level.tile_width, level.tile_height), (32, 32));
            let tiles = dims.width.div_ceil(32) * dims.height.div_ceil(32);
            assert_eq!(level.tiles, tiles);
        }
    }

    assert_eq!(layout.channel_names(), vec!["marker 0", "marker 1", "marker 2"]);
    let cal = layout.calibration().unwrap();
    assert_eq!(cal.pixel_size_x, 0.325);
    assert_eq!(cal.unit, LengthUnit::Micrometer);
}

#[test]
fn test_calibration_read_back_from_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.ome.tif");
    write_stack(&path, &[texture(64, 64, 6)], PixelType::U16, Compression::None);

    let reader = CycleReader::open(&path).unwrap();
    let cal = reader.calibration().unwrap();
    assert_abs_diff_eq!(cal.pixel_size_x, 0.325, epsilon = 1e-9);
    assert_abs_diff_eq!(cal.pixel_size_y, 0.325, epsilon = 1e-9);
}

#[test]
fn test_unfinished_writer_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.ome.tif");
    let calibration = CalibrationMetadata::isotropic(1.0, LengthUnit::Micrometer);
    let options = PyramidWriterOptions {
        tile_size: 16,
        compression: Compression::None,
        software: "cyclemerge test".into(),
    };

    {
        let mut writer = PyramidTiffWriter::create(
            &path,
            20,
            20,
            PixelType::U8,
            calibration,
            String::new(),
            options,
        )
        .unwrap();
        writer
            .write_channel(Pyramid::new(Array2::zeros((20, 20)), 1, 1))
            .unwrap();
        assert!(path.with_file_name("out.ome.tif.part").exists());
    }

    assert!(!path.exists());
    assert!(!path.with_file_name("out.ome.tif.part").exists());
    // Parent directories are created up front.
    assert!(dir.path().join("nested").is_dir());
}

#[test]
fn test_mismatched_channel_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.ome.tif");
    let calibration = CalibrationMetadata::isotropic(1.0, LengthUnit::Micrometer);
    let options = PyramidWriterOptions {
        tile_size: 16,
        compression: Compression::None,
        software: "cyclemerge test".into(),
    };
    let mut writer =
        PyramidTiffWriter::create(&path, 20, 20, PixelType::U8, calibration, String::new(), options)
            .unwrap();
    let err = writer
        .write_channel(Pyramid::new(Array2::zeros((10, 20)), 1, 1))
        .unwrap_err();
    assert!(matches!(err, cyclemerge_core::error::CycleMergeError::Write { .. }));
}
