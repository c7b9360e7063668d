use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use ndarray::Array2;
use num_traits::ToPrimitive;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::consts::MICRONS_PER_CM;
use crate::cycle::{CalibrationMetadata, Cycle, LengthUnit, PixelType, Plane};
use crate::error::{CycleMergeError, Result};
use crate::io::ome_xml;

/// TIFF ResolutionUnit values.
const RESOLUTION_UNIT_INCH: u32 = 2;
const RESOLUTION_UNIT_CENTIMETER: u32 = 3;
const MICRONS_PER_INCH: f64 = 25_400.0;

/// Memory-mapped reader for one multi-channel cycle image.
///
/// Each full-resolution TIFF page is one channel. Reduced-resolution pages
/// (NewSubfileType bit 0 set) are skipped, so both flat multi-page files and
/// pyramids that keep their levels in the main IFD chain are accepted.
pub struct CycleReader {
    mmap: Mmap,
    path: PathBuf,
    /// IFD positions of the channel pages.
    pages: Vec<usize>,
    width: usize,
    height: usize,
    pixel_type: PixelType,
    calibration: Option<CalibrationMetadata>,
}

impl CycleReader {
    /// Open a cycle image and parse the headers of all its pages.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let mut decoder = Decoder::new(Cursor::new(&mmap[..]))?.with_limits(Limits::unlimited());
        let calibration = read_calibration(&mut decoder);

        let mut pages = Vec::new();
        let mut dims: Option<(usize, usize)> = None;
        let mut pixel_type: Option<PixelType> = None;
        let mut ifd = 0usize;

        loop {
            let reduced = decoder
                .find_tag(Tag::NewSubfileType)?
                .and_then(|v| v.into_u32().ok())
                .map(|v| v & 1 == 1)
                .unwrap_or(false);

            if !reduced {
                let (w, h) = decoder.dimensions()?;
                let (w, h) = (w as usize, h as usize);
                match dims {
                    None => dims = Some((w, h)),
                    Some(expected) if expected != (w, h) => {
                        return Err(CycleMergeError::InvalidCycle {
                            path: path.to_path_buf(),
                            detail: format!(
                                "page {} is {}x{}, expected {}x{}",
                                ifd, w, h, expected.0, expected.1
                            ),
                        });
                    }
                    Some(_) => {}
                }
                let page_type = probe_pixel_type(&mut decoder, path)?;
                match pixel_type {
                    None => pixel_type = Some(page_type),
                    Some(t) if t != page_type => {
                        return Err(CycleMergeError::InvalidCycle {
                            path: path.to_path_buf(),
                            detail: format!("page {} is {}, expected {}", ifd, page_type, t),
                        });
                    }
                    Some(_) => {}
                }
                pages.push(ifd);
            }

            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
            ifd += 1;
        }

        let (width, height) = dims.ok_or_else(|| CycleMergeError::InvalidCycle {
            path: path.to_path_buf(),
            detail: "no full-resolution pages".into(),
        })?;
        let pixel_type = pixel_type.unwrap_or(PixelType::U16);

        debug!(
            path = %path.display(),
            channels = pages.len(),
            width,
            height,
            pixel_type = %pixel_type,
            "Opened cycle image"
        );

        drop(decoder);
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            pages,
            width,
            height,
            pixel_type,
            calibration,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channel_count(&self) -> usize {
        self.pages.len()
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn calibration(&self) -> Option<CalibrationMetadata> {
        self.calibration
    }

    /// Describe this file as the cycle at `index` of the catalog.
    pub fn to_cycle(&self, index: usize) -> Cycle {
        Cycle {
            index,
            source: self.path.clone(),
            channel_count: self.channel_count(),
            width: self.width,
            height: self.height,
            pixel_type: self.pixel_type,
            calibration: self.calibration,
        }
    }

    /// Decode one channel plane at full resolution.
    pub fn read_channel(&self, channel: usize) -> Result<Plane> {
        let ifd = *self
            .pages
            .get(channel)
            .ok_or_else(|| CycleMergeError::InvalidCycle {
                path: self.path.clone(),
                detail: format!(
                    "channel {} requested, file has {}",
                    channel,
                    self.channel_count()
                ),
            })?;

        let mut decoder =
            Decoder::new(Cursor::new(&self.mmap[..]))?.with_limits(Limits::unlimited());
        for _ in 0..ifd {
            decoder.next_image()?;
        }

        let (h, w) = (self.height, self.width);
        let plane = match decoder.read_image()? {
            DecodingResult::U8(buf) => plane_from_samples(&buf, h, w),
            DecodingResult::U16(buf) => plane_from_samples(&buf, h, w),
            DecodingResult::F32(buf) => plane_from_samples(&buf, h, w),
            other => {
                return Err(CycleMergeError::UnsupportedPixelType {
                    path: self.path.clone(),
                    detail: format!("{:?}", std::mem::discriminant(&other)),
                });
            }
        };

        plane.ok_or_else(|| CycleMergeError::InvalidCycle {
            path: self.path.clone(),
            detail: format!("channel {} has an unexpected sample count", channel),
        })
    }
}

fn plane_from_samples<T: ToPrimitive + Copy>(buf: &[T], h: usize, w: usize) -> Option<Plane> {
    if buf.len() != h * w {
        return None;
    }
    let samples: Vec<f32> = buf.iter().map(|v| v.to_f32().unwrap_or(0.0)).collect();
    Array2::from_shape_vec((h, w), samples).ok()
}

fn probe_pixel_type<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<PixelType> {
    let float = decoder
        .find_tag(Tag::SampleFormat)?
        .and_then(|v| v.into_u32().ok())
        .map(|v| v == 3)
        .unwrap_or(false);

    match (decoder.colortype()?, float) {
        (ColorType::Gray(8), false) => Ok(PixelType::U8),
        (ColorType::Gray(16), false) => Ok(PixelType::U16),
        (ColorType::Gray(32), true) => Ok(PixelType::F32),
        (other, _) => Err(CycleMergeError::UnsupportedPixelType {
            path: path.to_path_buf(),
            detail: format!("{:?}", other),
        }),
    }
}

/// Read the pixel size from OME-XML, falling back to the resolution tags.
fn read_calibration<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<CalibrationMetadata> {
    if let Ok(description) = decoder.get_tag_ascii_string(Tag::ImageDescription) {
        if let Some(calibration) = ome_xml::parse_calibration(&description) {
            return Some(calibration);
        }
    }

    let unit = decoder
        .find_tag(Tag::ResolutionUnit)
        .ok()
        .flatten()
        .and_then(|v| v.into_u32().ok())?;
    let per_unit = match unit {
        RESOLUTION_UNIT_CENTIMETER => MICRONS_PER_CM,
        RESOLUTION_UNIT_INCH => MICRONS_PER_INCH,
        _ => return None,
    };

    let x = resolution_tag(decoder, Tag::XResolution)?;
    let y = resolution_tag(decoder, Tag::YResolution).unwrap_or(x);
    Some(CalibrationMetadata {
        pixel_size_x: per_unit / x,
        pixel_size_y: per_unit / y,
        unit: LengthUnit::Micrometer,
    })
}

fn resolution_tag<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Option<f64> {
    let value = decoder.find_tag(tag).ok().flatten()?;
    let pixels_per_unit = match value {
        tiff::decoder::ifd::Value::Rational(n, d) if d != 0 => n as f64 / d as f64,
        other => other.into_f64().ok()?,
    };
    (pixels_per_unit > 0.0).then_some(pixels_per_unit)
}
