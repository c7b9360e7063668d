use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;

use crate::cycle::CalibrationMetadata;
use crate::error::{CycleMergeError, Result};
use crate::io::ome_xml;

/// Geometry of one stored resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelLayout {
    pub width: u64,
    pub height: u64,
    pub tile_width: u64,
    pub tile_height: u64,
    pub compression: u16,
    pub tiles: usize,
}

/// Full resolution plus SubIFD levels of one output channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelLayout {
    pub levels: Vec<LevelLayout>,
}

/// Structure of a pyramidal BigTIFF as written by the pyramid writer.
#[derive(Clone, Debug)]
pub struct PyramidLayout {
    pub channels: Vec<ChannelLayout>,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub description: Option<String>,
}

type Fields = BTreeMap<u16, (u16, u64, u64)>;

struct IfdReader<'a> {
    cursor: Cursor<&'a [u8]>,
    path: &'a Path,
}

impl<'a> IfdReader<'a> {
    fn invalid(&self, detail: impl Into<String>) -> CycleMergeError {
        CycleMergeError::InvalidPyramid {
            path: self.path.to_path_buf(),
            detail: detail.into(),
        }
    }

    /// Entries of the IFD at `offset` plus the next IFD offset.
    ///
    /// Each entry keeps `(type, count, raw value field)`.
    fn read_ifd(&mut self, offset: u64) -> Result<(Fields, u64)> {
        self.cursor.seek(SeekFrom::Start(offset))?;
        let count = self.cursor.read_u64::<LittleEndian>()?;
        let mut fields = Fields::new();
        for _ in 0..count {
            let tag = self.cursor.read_u16::<LittleEndian>()?;
            let field_type = self.cursor.read_u16::<LittleEndian>()?;
            let n = self.cursor.read_u64::<LittleEndian>()?;
            let value = self.cursor.read_u64::<LittleEndian>()?;
            fields.insert(tag, (field_type, n, value));
        }
        let next = self.cursor.read_u64::<LittleEndian>()?;
        Ok((fields, next))
    }

    fn element_size(field_type: u16) -> Option<u64> {
        match field_type {
            1 | 2 | 7 => Some(1),
            3 => Some(2),
            4 => Some(4),
            5 | 16 | 18 => Some(8),
            _ => None,
        }
    }

    /// Raw bytes of a field, inline or out of line.
    fn bytes(&mut self, field: (u16, u64, u64)) -> Result<Vec<u8>> {
        let (field_type, count, value) = field;
        let size = Self::element_size(field_type)
            .ok_or_else(|| self.invalid(format!("unsupported field type {}", field_type)))?
            * count;
        if size <= 8 {
            return Ok(value.to_le_bytes()[..size as usize].to_vec());
        }
        let mut buf = vec![0u8; size as usize];
        self.cursor.seek(SeekFrom::Start(value))?;
        self.cursor.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn integers(&mut self, fields: &Fields, tag: u16) -> Result<Vec<u64>> {
        let field = *fields
            .get(&tag)
            .ok_or_else(|| self.invalid(format!("missing tag {}", tag)))?;
        let bytes = self.bytes(field)?;
        let mut rdr = Cursor::new(bytes.as_slice());
        (0..field.1)
            .map(|_| {
                let v = match field.0 {
                    3 => rdr.read_u16::<LittleEndian>()? as u64,
                    4 => rdr.read_u32::<LittleEndian>()? as u64,
                    16 | 18 => rdr.read_u64::<LittleEndian>()?,
                    other => return Err(self.invalid(format!("tag {} has type {}", tag, other))),
                };
                Ok(v)
            })
            .collect()
    }

    fn integer(&mut self, fields: &Fields, tag: u16) -> Result<u64> {
        self.integers(fields, tag)?
            .first()
            .copied()
            .ok_or_else(|| self.invalid(format!("empty tag {}", tag)))
    }

    fn level(&mut self, fields: &Fields) -> Result<LevelLayout> {
        Ok(LevelLayout {
            width: self.integer(fields, 256)?,
            height: self.integer(fields, 257)?,
            tile_width: self.integer(fields, 322)?,
            tile_height: self.integer(fields, 323)?,
            compression: self.integer(fields, 259)? as u16,
            tiles: self.integers(fields, 324)?.len(),
        })
    }
}

impl PyramidLayout {
    /// Walk the main IFD chain and each IFD's SubIFDs.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let mut reader = IfdReader {
            cursor: Cursor::new(&mmap[..]),
            path,
        };

        let mut magic = [0u8; 2];
        reader.cursor.read_exact(&mut magic)?;
        let version = reader.cursor.read_u16::<LittleEndian>()?;
        if &magic != b"II" || version != 43 {
            return Err(reader.invalid("not a little-endian BigTIFF"));
        }
        reader.cursor.seek(SeekFrom::Start(8))?;
        let mut offset = reader.cursor.read_u64::<LittleEndian>()?;

        let mut channels = Vec::new();
        let mut description = None;
        let mut bits_per_sample = 0;
        let mut sample_format = 1;
        let mut visited = 0usize;

        while offset != 0 {
            visited += 1;
            if visited > 1_000_000 || offset as usize >= mmap.len() {
                return Err(reader.invalid("IFD chain is corrupt"));
            }
            let (fields, next) = reader.read_ifd(offset)?;

            if channels.is_empty() {
                bits_per_sample = reader.integer(&fields, 258)? as u16;
                if fields.contains_key(&339) {
                    sample_format = reader.integer(&fields, 339)? as u16;
                }
                if let Some(&field) = fields.get(&270) {
                    let bytes = reader.bytes(field)?;
                    let text = String::from_utf8_lossy(&bytes);
                    description = Some(text.trim_end_matches('\0').to_string());
                }
            }

            let mut levels = vec![reader.level(&fields)?];
            if fields.contains_key(&330) {
                for sub in reader.integers(&fields, 330)? {
                    let (sub_fields, _) = reader.read_ifd(sub)?;
                    levels.push(reader.level(&sub_fields)?);
                }
            }
            channels.push(ChannelLayout { levels });
            offset = next;
        }

        Ok(Self {
            channels,
            bits_per_sample,
            sample_format,
            description,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Levels per channel (taken from the first channel).
    pub fn level_count(&self) -> usize {
        self.channels.first().map_or(0, |c| c.levels.len())
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.description
            .as_deref()
            .map(ome_xml::parse_channel_names)
            .unwrap_or_default()
    }

    pub fn calibration(&self) -> Option<CalibrationMetadata> {
        self.description.as_deref().and_then(ome_xml::parse_calibration)
    }
}
