use std::fmt;
use std::path::PathBuf;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A single channel plane, row-major, shape = (height, width).
///
/// Samples keep their native numeric range (0..=65535 for 16-bit data).
pub type Plane = Array2<f32>;

/// Sample type of a cycle image, preserved in the output file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelType {
    U8,
    U16,
    F32,
}

impl PixelType {
    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::F32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        self.bits_per_sample() as usize / 8
    }

    /// TIFF SampleFormat tag value (1 = unsigned int, 3 = IEEE float).
    pub fn tiff_sample_format(self) -> u16 {
        match self {
            Self::U8 | Self::U16 => 1,
            Self::F32 => 3,
        }
    }

    /// OME-XML `Pixels/@Type` value.
    pub fn ome_name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::F32 => "float",
        }
    }

    /// Convert a resampled value back into this type's representable range.
    pub fn quantize(self, value: f32) -> f32 {
        match self {
            Self::U8 => value.round().clamp(0.0, u8::MAX as f32),
            Self::U16 => value.round().clamp(0.0, u16::MAX as f32),
            Self::F32 => value,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ome_name())
    }
}

/// Physical length unit of a pixel size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    Nanometer,
    #[default]
    Micrometer,
    Millimeter,
    Centimeter,
}

impl LengthUnit {
    /// Parse an OME unit symbol ("µm", "um", "nm", ...).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "nm" => Some(Self::Nanometer),
            "µm" | "um" | "\u{3bc}m" | "micron" => Some(Self::Micrometer),
            "mm" => Some(Self::Millimeter),
            "cm" => Some(Self::Centimeter),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Nanometer => "nm",
            Self::Micrometer => "\u{b5}m",
            Self::Millimeter => "mm",
            Self::Centimeter => "cm",
        }
    }

    /// Size of one unit in micrometres.
    pub fn in_microns(self) -> f64 {
        match self {
            Self::Nanometer => 1e-3,
            Self::Micrometer => 1.0,
            Self::Millimeter => 1e3,
            Self::Centimeter => 1e4,
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Physical calibration of the output image.
///
/// Captured once from the reference cycle at native resolution. Coarser
/// pyramid levels reuse it unchanged; their effective pixel size is
/// `pixel_size * downsample_factor`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetadata {
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
    pub unit: LengthUnit,
}

impl CalibrationMetadata {
    pub const AXES: &'static str = "CYX";

    pub fn isotropic(pixel_size: f64, unit: LengthUnit) -> Self {
        Self {
            pixel_size_x: pixel_size,
            pixel_size_y: pixel_size,
            unit,
        }
    }
}

/// One imaging round: a multi-channel whole-slide image on disk.
#[derive(Clone, Debug)]
pub struct Cycle {
    /// Position in the sorted discovery order.
    pub index: usize,
    pub source: PathBuf,
    pub channel_count: usize,
    pub width: usize,
    pub height: usize,
    pub pixel_type: PixelType,
    /// Pixel size read from the file, if any.
    pub calibration: Option<CalibrationMetadata>,
}

impl Cycle {
    /// Uncompressed size of one channel plane in bytes.
    pub fn plane_bytes(&self) -> usize {
        self.width * self.height * self.pixel_type.bytes_per_sample()
    }
}
