use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;
use tracing::debug;

use super::phase_correlation::phase_correlate;

/// Blocks narrower than this (trailing partial blocks) are not correlated.
const MIN_BLOCK_EDGE: usize = 32;

/// Acceptance rules for per-block shifts.
#[derive(Clone, Copy, Debug)]
pub struct BlockRules {
    pub block_size: usize,
    pub min_confidence: f64,
    pub max_shift: f64,
}

/// Per-block residual translations on a regular grid.
///
/// Values are sampled at block centres and interpolated bilinearly in
/// between; outside the outermost centres the nearest value is held.
/// Rejected blocks hold a zero residual.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplacementGrid {
    /// Block centre columns, ascending.
    pub centres_x: Vec<f64>,
    /// Block centre rows, ascending.
    pub centres_y: Vec<f64>,
    /// Shape `(centres_y.len(), centres_x.len())`.
    pub dx: Array2<f64>,
    pub dy: Array2<f64>,
    pub valid: Array2<bool>,
}

impl DisplacementGrid {
    pub fn valid_blocks(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn total_blocks(&self) -> usize {
        self.valid.len()
    }

    /// Residual `(dx, dy)` at an arbitrary point.
    pub fn offset_at(&self, x: f64, y: f64) -> (f64, f64) {
        let (r0, r1, fy) = find_interval(&self.centres_y, y);
        let (c0, c1, fx) = find_interval(&self.centres_x, x);
        let lerp = |g: &Array2<f64>| {
            g[[r0, c0]] * (1.0 - fx) * (1.0 - fy)
                + g[[r0, c1]] * fx * (1.0 - fy)
                + g[[r1, c0]] * (1.0 - fx) * fy
                + g[[r1, c1]] * fx * fy
        };
        (lerp(&self.dx), lerp(&self.dy))
    }

    /// Same grid expressed on a grid `factor` times finer.
    pub fn upscaled(&self, factor: f64) -> DisplacementGrid {
        let centre = (factor - 1.0) / 2.0;
        DisplacementGrid {
            centres_x: self.centres_x.iter().map(|&c| factor * c + centre).collect(),
            centres_y: self.centres_y.iter().map(|&c| factor * c + centre).collect(),
            dx: self.dx.mapv(|v| v * factor),
            dy: self.dy.mapv(|v| v * factor),
            valid: self.valid.clone(),
        }
    }
}

/// Bracketing indices and fraction for `val` in ascending `positions`.
fn find_interval(positions: &[f64], val: f64) -> (usize, usize, f64) {
    let n = positions.len();
    if n == 0 || val <= positions[0] {
        return (0, 0, 0.0);
    }
    if val >= positions[n - 1] {
        return (n - 1, n - 1, 0.0);
    }
    let hi = positions.partition_point(|&p| p <= val);
    let lo = hi - 1;
    let span = positions[hi] - positions[lo];
    let frac = if span > 0.0 {
        (val - positions[lo]) / span
    } else {
        0.0
    };
    (lo, hi, frac)
}

/// Start offsets and lengths of blocks tiling `len` pixels.
fn block_spans(len: usize, block: usize) -> Vec<(usize, usize)> {
    (0..len)
        .step_by(block.max(1))
        .map(|start| (start, block.min(len - start)))
        .collect()
}

/// Estimate residual shifts between the reference and the affinely
/// pre-warped moving plane, block by block.
///
/// Returns `None` when no block passes the acceptance rules.
pub fn estimate_block_shifts(
    reference: ArrayView2<'_, f32>,
    warped: ArrayView2<'_, f32>,
    rules: &BlockRules,
) -> Option<DisplacementGrid> {
    let (h, w) = reference.dim();
    if warped.dim() != (h, w) || h == 0 || w == 0 {
        return None;
    }
    let rows = block_spans(h, rules.block_size);
    let cols = block_spans(w, rules.block_size);

    let cells: Vec<(usize, usize)> = (0..rows.len())
        .flat_map(|r| (0..cols.len()).map(move |c| (r, c)))
        .collect();

    let shifts: Vec<Option<(f64, f64)>> = cells
        .par_iter()
        .map(|&(r, c)| {
            let (y0, bh) = rows[r];
            let (x0, bw) = cols[c];
            if bh < MIN_BLOCK_EDGE || bw < MIN_BLOCK_EDGE {
                return None;
            }
            let region = s![y0..y0 + bh, x0..x0 + bw];
            let shift = phase_correlate(reference.slice(region), warped.slice(region)).ok()?;
            let accepted =
                shift.confidence >= rules.min_confidence && shift.magnitude() <= rules.max_shift;
            debug!(
                block_row = r,
                block_col = c,
                dx = shift.dx,
                dy = shift.dy,
                confidence = shift.confidence,
                accepted,
                "Block shift"
            );
            accepted.then_some((shift.dx, shift.dy))
        })
        .collect();

    let shape = (rows.len(), cols.len());
    let mut dx = Array2::<f64>::zeros(shape);
    let mut dy = Array2::<f64>::zeros(shape);
    let mut valid = Array2::from_elem(shape, false);
    for (&(r, c), shift) in cells.iter().zip(&shifts) {
        if let Some((sx, sy)) = *shift {
            dx[[r, c]] = sx;
            dy[[r, c]] = sy;
            valid[[r, c]] = true;
        }
    }

    if !valid.iter().any(|&v| v) {
        return None;
    }

    let centre = |&(start, len): &(usize, usize)| start as f64 + (len as f64 - 1.0) / 2.0;
    Some(DisplacementGrid {
        centres_x: cols.iter().map(centre).collect(),
        centres_y: rows.iter().map(centre).collect(),
        dx,
        dy,
        valid,
    })
}
