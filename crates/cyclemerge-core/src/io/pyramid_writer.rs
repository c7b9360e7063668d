//! Streaming BigTIFF writer for the OME-TIFF SubIFD pyramid layout.
//!
//! Each output channel is one main IFD holding full resolution; its reduced
//! levels are SubIFDs of that IFD. Channels are written one at a time, so
//! only one channel's pyramid is ever in memory.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use ndarray::ArrayView2;
use rayon::prelude::*;
use tracing::debug;

use crate::cycle::{CalibrationMetadata, PixelType};
use crate::error::{CycleMergeError, Result};
use crate::pipeline::config::Compression;
use crate::pyramid::PyramidLevel;

const BIGTIFF_MAGIC: u16 = 43;
const HEADER_SIZE: u64 = 16;
const ENTRY_SIZE: u64 = 20;

// Field types.
const ASCII: u16 = 2;
const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;
const LONG8: u16 = 16;
const IFD8: u16 = 18;

// Tags.
const NEW_SUBFILE_TYPE: u16 = 254;
const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const PHOTOMETRIC: u16 = 262;
const IMAGE_DESCRIPTION: u16 = 270;
const SAMPLES_PER_PIXEL: u16 = 277;
const X_RESOLUTION: u16 = 282;
const Y_RESOLUTION: u16 = 283;
const PLANAR_CONFIG: u16 = 284;
const RESOLUTION_UNIT: u16 = 296;
const SOFTWARE: u16 = 305;
const TILE_WIDTH: u16 = 322;
const TILE_LENGTH: u16 = 323;
const TILE_OFFSETS: u16 = 324;
const TILE_BYTE_COUNTS: u16 = 325;
const SUB_IFDS: u16 = 330;
const SAMPLE_FORMAT: u16 = 339;

const RESOLUTION_UNIT_CENTIMETER: u16 = 3;
const RATIONAL_DENOMINATOR: u32 = 1000;

/// One IFD entry with its value already encoded little-endian.
struct Entry {
    tag: u16,
    field_type: u16,
    count: u64,
    data: Vec<u8>,
}

impl Entry {
    fn short(tag: u16, value: u16) -> Self {
        Self {
            tag,
            field_type: SHORT,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            field_type: LONG,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    fn ascii(tag: u16, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            field_type: ASCII,
            count: data.len() as u64,
            data,
        }
    }

    fn rational(tag: u16, value: f64) -> Self {
        let num = (value * RATIONAL_DENOMINATOR as f64)
            .round()
            .clamp(1.0, u32::MAX as f64) as u32;
        let mut data = num.to_le_bytes().to_vec();
        data.extend_from_slice(&RATIONAL_DENOMINATOR.to_le_bytes());
        Self {
            tag,
            field_type: RATIONAL,
            count: 1,
            data,
        }
    }

    fn u64_array(tag: u16, field_type: u16, values: &[u64]) -> Self {
        Self {
            tag,
            field_type,
            count: values.len() as u64,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }
}

/// Tile layout and encoding of the output file.
#[derive(Clone, Debug)]
pub struct PyramidWriterOptions {
    pub tile_size: usize,
    pub compression: Compression,
    pub software: String,
}

/// Writer for one output file. Created as `<path>.part`, renamed by
/// [`PyramidTiffWriter::finish`], deleted if dropped unfinished.
pub struct PyramidTiffWriter {
    out: BufWriter<File>,
    path: PathBuf,
    part_path: PathBuf,
    options: PyramidWriterOptions,
    width: usize,
    height: usize,
    pixel_type: PixelType,
    calibration: CalibrationMetadata,
    description: Option<String>,
    /// Bytes written so far; the file is append-only apart from pointer patches.
    position: u64,
    /// File position of the "next IFD" pointer to patch.
    next_ifd_slot: u64,
    channels_written: usize,
    finished: bool,
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

impl PyramidTiffWriter {
    /// Create the partial output file and write the BigTIFF header.
    ///
    /// `description` (OME-XML) is stored on the first channel's IFD.
    pub fn create(
        path: &Path,
        width: usize,
        height: usize,
        pixel_type: PixelType,
        calibration: CalibrationMetadata,
        description: String,
        options: PyramidWriterOptions,
    ) -> Result<Self> {
        let write_err = |source: io::Error| CycleMergeError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let part_path = part_path(path);
        let file = File::create(&part_path).map_err(write_err)?;

        let mut writer = Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            part_path,
            options,
            width,
            height,
            pixel_type,
            calibration,
            description: Some(description),
            position: 0,
            next_ifd_slot: 8,
            channels_written: 0,
            finished: false,
        };
        let header = writer.write_header();
        writer.check(header)?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channels_written(&self) -> usize {
        self.channels_written
    }

    fn check<T>(&self, result: io::Result<T>) -> Result<T> {
        result.map_err(|source| CycleMergeError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Append `bytes`, returning the offset they start at.
    fn emit(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let offset = self.position;
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(offset)
    }

    fn write_header(&mut self) -> io::Result<()> {
        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(b"II");
        header.write_u16::<LittleEndian>(BIGTIFF_MAGIC)?;
        header.write_u16::<LittleEndian>(8)?;
        header.write_u16::<LittleEndian>(0)?;
        header.write_u64::<LittleEndian>(0)?;
        self.emit(&header)?;
        Ok(())
    }

    /// Write every level of one channel. Levels must arrive in order,
    /// starting at full resolution.
    pub fn write_channel<I>(&mut self, levels: I) -> Result<()>
    where
        I: IntoIterator<Item = PyramidLevel>,
    {
        let result = self.write_channel_inner(levels.into_iter());
        self.check(result)?;
        self.channels_written += 1;
        Ok(())
    }

    fn write_channel_inner(&mut self, mut levels: impl Iterator<Item = PyramidLevel>) -> io::Result<()> {
        let base = levels
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "channel without levels"))?;
        if base.data.dim() != (self.height, self.width) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "full-resolution level does not match the output size",
            ));
        }
        let (base_offsets, base_counts) = self.write_tiles(base.data.view())?;
        drop(base);

        let mut sub_ifds = Vec::new();
        for level in levels {
            let (offsets, counts) = self.write_tiles(level.data.view())?;
            let (h, w) = level.data.dim();
            let entries = self.level_entries(w, h, true, &offsets, &counts, None);
            let (ifd_offset, _) = self.write_ifd(entries)?;
            debug!(level = level.level, width = w, height = h, tiles = offsets.len(), "Wrote sub-resolution");
            sub_ifds.push(ifd_offset);
        }

        let description = self.description.take();
        let mut entries = self.level_entries(
            self.width,
            self.height,
            false,
            &base_offsets,
            &base_counts,
            description.as_deref(),
        );
        if !sub_ifds.is_empty() {
            entries.push(Entry::u64_array(SUB_IFDS, IFD8, &sub_ifds));
            entries.sort_by_key(|e| e.tag);
        }
        let (ifd_offset, next_slot) = self.write_ifd(entries)?;

        self.out.seek(SeekFrom::Start(self.next_ifd_slot))?;
        self.out.write_u64::<LittleEndian>(ifd_offset)?;
        self.out.seek(SeekFrom::Start(self.position))?;
        self.next_ifd_slot = next_slot;
        Ok(())
    }

    fn level_entries(
        &self,
        width: usize,
        height: usize,
        reduced: bool,
        offsets: &[u64],
        counts: &[u64],
        description: Option<&str>,
    ) -> Vec<Entry> {
        let tile = self.options.tile_size as u32;
        let mut entries = vec![
            Entry::long(NEW_SUBFILE_TYPE, u32::from(reduced)),
            Entry::long(IMAGE_WIDTH, width as u32),
            Entry::long(IMAGE_LENGTH, height as u32),
            Entry::short(BITS_PER_SAMPLE, self.pixel_type.bits_per_sample()),
            Entry::short(COMPRESSION, self.options.compression.tiff_code()),
            Entry::short(PHOTOMETRIC, 1),
        ];
        if let Some(text) = description {
            entries.push(Entry::ascii(IMAGE_DESCRIPTION, text));
        }
        entries.push(Entry::short(SAMPLES_PER_PIXEL, 1));
        if !reduced {
            let unit = self.calibration.unit.in_microns();
            let per_cm = |size: f64| crate::consts::MICRONS_PER_CM / (size * unit);
            entries.push(Entry::rational(X_RESOLUTION, per_cm(self.calibration.pixel_size_x)));
            entries.push(Entry::rational(Y_RESOLUTION, per_cm(self.calibration.pixel_size_y)));
        }
        entries.push(Entry::short(PLANAR_CONFIG, 1));
        if !reduced {
            entries.push(Entry::short(RESOLUTION_UNIT, RESOLUTION_UNIT_CENTIMETER));
        }
        entries.push(Entry::ascii(SOFTWARE, &self.options.software));
        entries.push(Entry::long(TILE_WIDTH, tile));
        entries.push(Entry::long(TILE_LENGTH, tile));
        entries.push(Entry::u64_array(TILE_OFFSETS, LONG8, offsets));
        entries.push(Entry::u64_array(TILE_BYTE_COUNTS, LONG8, counts));
        entries.push(Entry::short(SAMPLE_FORMAT, self.pixel_type.tiff_sample_format()));
        entries
    }

    /// Encode and append all tiles of one level, row-major.
    fn write_tiles(&mut self, data: ArrayView2<'_, f32>) -> io::Result<(Vec<u64>, Vec<u64>)> {
        let (h, w) = data.dim();
        let tile = self.options.tile_size;
        let (tiles_down, tiles_across) = (h.div_ceil(tile), w.div_ceil(tile));
        let pixel_type = self.pixel_type;
        let compression = self.options.compression;

        let encoded: Vec<io::Result<Vec<u8>>> = (0..tiles_down * tiles_across)
            .into_par_iter()
            .map(|i| {
                let (ty, tx) = (i / tiles_across, i % tiles_across);
                let raw = tile_bytes(data, ty * tile, tx * tile, tile, pixel_type);
                compress(&raw, compression)
            })
            .collect();

        let mut offsets = Vec::with_capacity(encoded.len());
        let mut counts = Vec::with_capacity(encoded.len());
        for bytes in encoded {
            let bytes = bytes?;
            offsets.push(self.emit(&bytes)?);
            counts.push(bytes.len() as u64);
        }
        Ok((offsets, counts))
    }

    /// Append an IFD (out-of-line values first). Returns the IFD offset and
    /// the position of its "next IFD" field.
    fn write_ifd(&mut self, entries: Vec<Entry>) -> io::Result<(u64, u64)> {
        let mut values = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.data.len() > 8 {
                self.pad_to_word()?;
                values.push(Some(self.emit(&entry.data)?));
            } else {
                values.push(None);
            }
        }

        let mut ifd = Vec::with_capacity(16 + entries.len() * ENTRY_SIZE as usize);
        ifd.write_u64::<LittleEndian>(entries.len() as u64)?;
        for (entry, value) in entries.iter().zip(values) {
            ifd.write_u16::<LittleEndian>(entry.tag)?;
            ifd.write_u16::<LittleEndian>(entry.field_type)?;
            ifd.write_u64::<LittleEndian>(entry.count)?;
            match value {
                Some(offset) => ifd.write_u64::<LittleEndian>(offset)?,
                None => {
                    let mut inline = [0u8; 8];
                    inline[..entry.data.len()].copy_from_slice(&entry.data);
                    ifd.extend_from_slice(&inline);
                }
            }
        }
        ifd.write_u64::<LittleEndian>(0)?;

        self.pad_to_word()?;
        let ifd_offset = self.emit(&ifd)?;
        let next_slot = ifd_offset + 8 + entries.len() as u64 * ENTRY_SIZE;
        Ok((ifd_offset, next_slot))
    }

    fn pad_to_word(&mut self) -> io::Result<()> {
        let pad = ((8 - self.position % 8) % 8) as usize;
        self.emit(&[0u8; 8][..pad])?;
        Ok(())
    }

    /// Flush and move the finished file into place.
    pub fn finish(mut self) -> Result<()> {
        let flushed = self.out.flush().and_then(|_| self.out.get_ref().sync_all());
        self.check(flushed)?;
        let renamed = fs::rename(&self.part_path, &self.path);
        self.check(renamed)?;
        self.finished = true;
        debug!(path = %self.path.display(), channels = self.channels_written, "Output complete");
        Ok(())
    }
}

impl Drop for PyramidTiffWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = fs::remove_file(&self.part_path);
        }
    }
}

/// Raw little-endian samples of one zero-padded tile.
fn tile_bytes(
    data: ArrayView2<'_, f32>,
    row0: usize,
    col0: usize,
    tile: usize,
    pixel_type: PixelType,
) -> Vec<u8> {
    let (h, w) = data.dim();
    let mut out = Vec::with_capacity(tile * tile * pixel_type.bytes_per_sample());
    for r in row0..row0 + tile {
        for c in col0..col0 + tile {
            let v = if r < h && c < w {
                pixel_type.quantize(data[[r, c]])
            } else {
                0.0
            };
            match pixel_type {
                PixelType::U8 => out.push(v as u8),
                PixelType::U16 => out.extend_from_slice(&(v as u16).to_le_bytes()),
                PixelType::F32 => out.extend_from_slice(&v.to_le_bytes()),
            }
        }
    }
    out
}

fn compress(raw: &[u8], compression: Compression) -> io::Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(raw.to_vec()),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(raw)?;
            encoder.finish()
        }
        Compression::Lzw => weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(raw)
            .map_err(io::Error::other),
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    #[test]
    fn edge_tiles_are_zero_padded() {
        let data = Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c + 1) as f32);
        let bytes = tile_bytes(data.view(), 0, 4, 4, PixelType::U8);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &[5, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[15, 0, 0, 0]);
        assert!(bytes[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/tmp/out/registered.ome.tif")),
            PathBuf::from("/tmp/out/registered.ome.tif.part")
        );
    }
}
