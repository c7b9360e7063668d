#![allow(dead_code)]

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ndarray::{s, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use cyclemerge_core::cycle::{CalibrationMetadata, LengthUnit, PixelType};
use cyclemerge_core::io::ome_xml;
use cyclemerge_core::pipeline::config::{InputConfig, OutputConfig, RegistrationConfig};

pub const PIXEL_SIZE: f64 = 0.65;

/// Smooth blob texture with plenty of corner-like structure.
///
/// Values stay inside the u16 range so quantized copies are exact.
pub fn texture(width: usize, height: usize, seed: u64) -> Array2<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Array2::<f32>::from_elem((height, width), 2000.0);
    let blobs = width * height / 400;

    for _ in 0..blobs {
        let cx = rng.random_range(0.0..width as f32);
        let cy = rng.random_range(0.0..height as f32);
        let sigma = rng.random_range(1.5f32..4.5);
        let amplitude = rng.random_range(3000.0f32..12000.0);
        let reach = (3.0 * sigma).ceil() as isize;

        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let (x, y) = (cx as isize + dx, cy as isize + dy);
                if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
                    continue;
                }
                let rx = x as f32 - cx;
                let ry = y as f32 - cy;
                data[[y as usize, x as usize]] +=
                    amplitude * (-(rx * rx + ry * ry) / (2.0 * sigma * sigma)).exp();
            }
        }
    }
    data.mapv_inplace(|v| v.round().min(60_000.0));
    data
}

/// Uniform white noise with no structure to match against.
pub fn noise(width: usize, height: usize, seed: u64) -> Array2<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((height, width), || {
        rng.random_range(0u16..40_000) as f32
    })
}

/// Window of `plane` starting at column `x0`, row `y0`.
pub fn crop(plane: &Array2<f32>, x0: usize, y0: usize, width: usize, height: usize) -> Array2<f32> {
    plane.slice(s![y0..y0 + height, x0..x0 + width]).to_owned()
}

/// `channels` independent textures of one cycle, each cut from a larger
/// canvas at (`x0`, `y0`). Cutting every cycle from the same canvases gives
/// cycles that differ by a pure translation.
pub fn cycle_planes(
    canvases: &[Array2<f32>],
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
) -> Vec<Array2<f32>> {
    canvases
        .iter()
        .map(|c| crop(c, x0, y0, width, height))
        .collect()
}

pub fn canvases(count: usize, width: usize, height: usize, seed: u64) -> Vec<Array2<f32>> {
    (0..count)
        .map(|i| texture(width, height, seed + i as u64))
        .collect()
}

/// Write a multi-page 16-bit cycle image. With `pixel_size`, the first page
/// carries OME-XML with the physical pixel size in `um`.
pub fn write_cycle(path: &Path, planes: &[Array2<f32>], pixel_size: Option<f64>) {
    let (h, w) = planes[0].dim();
    let file = BufWriter::new(File::create(path).expect("create cycle file"));
    let mut encoder = TiffEncoder::new(file).expect("tiff encoder");

    let description = pixel_size.map(|size| {
        let calibration = CalibrationMetadata::isotropic(size, LengthUnit::Micrometer);
        let names: Vec<String> = (0..planes.len()).map(|i| format!("c{}", i)).collect();
        // TIFF ASCII fields are 7-bit; `um` reads back as micrometres.
        ome_xml::build(w, h, PixelType::U16, &calibration, &names).replace('\u{b5}', "u")
    });

    for (i, plane) in planes.iter().enumerate() {
        let samples: Vec<u16> = plane
            .iter()
            .map(|&v| v.round().clamp(0.0, 65_535.0) as u16)
            .collect();
        let mut image = encoder
            .new_image::<colortype::Gray16>(w as u32, h as u32)
            .expect("new page");
        if i == 0 {
            if let Some(ref xml) = description {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, xml.as_str())
                    .expect("description");
            }
        }
        image.write_data(&samples).expect("page data");
    }
}

/// Write a single-page 32-bit float cycle image without calibration.
pub fn write_cycle_f32(path: &Path, planes: &[Array2<f32>]) {
    let (h, w) = planes[0].dim();
    let file = BufWriter::new(File::create(path).expect("create cycle file"));
    let mut encoder = TiffEncoder::new(file).expect("tiff encoder");
    for plane in planes {
        let samples: Vec<f32> = plane.iter().copied().collect();
        encoder
            .write_image::<colortype::Gray32Float>(w as u32, h as u32, &samples)
            .expect("page data");
    }
}

/// Config tuned for small synthetic cycles.
pub fn small_config(dir: &Path, output: PathBuf) -> RegistrationConfig {
    let mut config = RegistrationConfig {
        input: InputConfig {
            dir: dir.to_path_buf(),
            ..Default::default()
        },
        output: OutputConfig {
            path: output,
            tile_size: 64,
            ..Default::default()
        },
        ..Default::default()
    };
    config.alignment.block_size = 64;
    config.pyramid.min_level_size = 32;
    config
}

/// Root-mean-square distance between two point lists.
pub fn rms(a: &[(f64, f64)], b: &[(f64, f64)]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(p, q)| (p.0 - q.0).powi(2) + (p.1 - q.1).powi(2))
        .sum();
    (sum / a.len() as f64).sqrt()
}
