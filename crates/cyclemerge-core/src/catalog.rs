use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cycle::{CalibrationMetadata, Cycle, LengthUnit};
use crate::error::{CycleMergeError, Result};
use crate::io::cycle_reader::CycleReader;

/// Expand `{a,b}` alternatives into one pattern per combination.
///
/// Groups may appear more than once (`{a,b}_{x,y}` gives four patterns).
/// Unbalanced braces are left as written.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|c| open + c) else {
        return vec![pattern.to_string()];
    };

    let (head, alternatives, tail) = (
        &pattern[..open],
        &pattern[open + 1..close],
        &pattern[close + 1..],
    );
    let rest = expand_braces(tail);
    alternatives
        .split(',')
        .flat_map(|alt| rest.iter().map(move |t| format!("{}{}{}", head, alt, t)))
        .collect()
}

/// Files in `dir` matching `pattern`, sorted by file name.
///
/// Never opens a file. Fails with `NoInput` when nothing matches.
pub fn discover(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut found = Vec::new();

    for alternative in expand_braces(pattern) {
        let full = format!("{}/{}", base.trim_end_matches('/'), alternative);
        for entry in glob::glob(&full)? {
            let path = entry.map_err(|e| CycleMergeError::Io(e.into()))?;
            if path.is_file() {
                found.push(path);
            }
        }
    }

    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
    found.dedup();

    if found.is_empty() {
        return Err(CycleMergeError::NoInput {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    debug!(dir = %dir.display(), pattern, files = found.len(), "Discovered cycle files");
    Ok(found)
}

pub fn check_reference_index(index: usize, count: usize) -> Result<()> {
    if index >= count {
        return Err(CycleMergeError::IndexRange { index, count });
    }
    Ok(())
}

/// Ordered cycles of one registration run; exactly one is the reference.
#[derive(Clone, Debug)]
pub struct CycleCatalog {
    cycles: Vec<Cycle>,
    reference: usize,
}

impl CycleCatalog {
    /// Discover, validate the reference index, then probe every header.
    pub fn open(dir: &Path, pattern: &str, reference_index: usize) -> Result<Self> {
        let paths = discover(dir, pattern)?;
        check_reference_index(reference_index, paths.len())?;
        Self::from_paths(&paths, reference_index)
    }

    /// Probe the given files (already in cycle order).
    pub fn from_paths(paths: &[PathBuf], reference_index: usize) -> Result<Self> {
        check_reference_index(reference_index, paths.len())?;
        let cycles = paths
            .iter()
            .enumerate()
            .map(|(index, path)| CycleReader::open(path).map(|r| r.to_cycle(index)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(cycles, reference_index)
    }

    /// Catalog over already probed cycles, indexed by position.
    pub fn new(cycles: Vec<Cycle>, reference_index: usize) -> Result<Self> {
        check_reference_index(reference_index, cycles.len())?;
        for cycle in &cycles {
            info!(
                cycle = cycle.index,
                file = %cycle.source.display(),
                channels = cycle.channel_count,
                width = cycle.width,
                height = cycle.height,
                pixel_type = %cycle.pixel_type,
                reference = cycle.index == reference_index,
                "Cycle"
            );
        }

        Ok(Self {
            cycles,
            reference: reference_index,
        })
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    pub fn reference_index(&self) -> usize {
        self.reference
    }

    pub fn reference(&self) -> &Cycle {
        &self.cycles[self.reference]
    }

    /// Non-reference cycles in ascending order.
    pub fn moving(&self) -> impl Iterator<Item = &Cycle> {
        let reference = self.reference;
        self.cycles.iter().filter(move |c| c.index != reference)
    }

    pub fn channel_counts(&self) -> Vec<usize> {
        self.cycles.iter().map(|c| c.channel_count).collect()
    }

    /// Pixel size of the reference cycle, or `fallback` (micrometres).
    pub fn calibration(&self, fallback: Option<f64>) -> Result<CalibrationMetadata> {
        let reference = self.reference();
        reference
            .calibration
            .or_else(|| fallback.map(|size| CalibrationMetadata::isotropic(size, LengthUnit::Micrometer)))
            .ok_or_else(|| CycleMergeError::MissingCalibration(reference.source.clone()))
    }
}
