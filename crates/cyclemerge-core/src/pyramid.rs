use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Serialize;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::cycle::Plane;

/// Size of one pyramid level, without pixel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LevelDims {
    pub level: usize,
    pub width: usize,
    pub height: usize,
}

impl LevelDims {
    pub fn downsample_factor(&self) -> usize {
        1 << self.level
    }
}

/// One resolution of one channel.
#[derive(Clone, Debug)]
pub struct PyramidLevel {
    pub level: usize,
    pub data: Plane,
}

impl PyramidLevel {
    pub fn downsample_factor(&self) -> usize {
        1 << self.level
    }

    pub fn dims(&self) -> LevelDims {
        let (height, width) = self.data.dim();
        LevelDims {
            level: self.level,
            width,
            height,
        }
    }
}

#[inline]
fn half(n: usize) -> usize {
    n.div_ceil(2)
}

/// Level sizes for a `width` x `height` image.
///
/// Level 0 is always present. Each further level halves both edges
/// (rounding up) and is kept only while fewer than `max_levels` levels exist
/// and its shorter edge is still at least `min_size`.
pub fn plan_levels(width: usize, height: usize, max_levels: usize, min_size: usize) -> Vec<LevelDims> {
    let mut levels = vec![LevelDims {
        level: 0,
        width,
        height,
    }];
    while levels.len() < max_levels {
        let prev = levels[levels.len() - 1];
        let (w, h) = (half(prev.width), half(prev.height));
        if w.min(h) < min_size || (w, h) == (prev.width, prev.height) {
            break;
        }
        levels.push(LevelDims {
            level: prev.level + 1,
            width: w,
            height: h,
        });
    }
    levels
}

/// 2x area-average reduction. Odd trailing rows/columns average only the
/// pixels that exist.
pub fn downsample_2x(data: ArrayView2<'_, f32>) -> Plane {
    let (h, w) = data.dim();
    let (oh, ow) = (half(h), half(w));
    let mut out = Array2::<f32>::zeros((oh, ow));
    if oh == 0 || ow == 0 {
        return out;
    }

    let fill_row = |row: usize, mut out_row: ndarray::ArrayViewMut1<'_, f32>| {
        let r0 = 2 * row;
        let r1 = (r0 + 1).min(h - 1);
        for (col, dst) in out_row.iter_mut().enumerate() {
            let c0 = 2 * col;
            let c1 = (c0 + 1).min(w - 1);
            let mut sum = 0.0f32;
            let mut n = 0.0f32;
            for r in r0..=r1 {
                for c in c0..=c1 {
                    sum += data[[r, c]];
                    n += 1.0;
                }
            }
            *dst = sum / n;
        }
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out_row)| fill_row(row, out_row));
    } else {
        for (row, out_row) in out.axis_iter_mut(Axis(0)).enumerate() {
            fill_row(row, out_row);
        }
    }
    out
}

/// Apply [`downsample_2x`] `times` times.
pub fn downsample_pow2(data: ArrayView2<'_, f32>, times: usize) -> Plane {
    let mut current = data.to_owned();
    for _ in 0..times {
        if current.dim() == (1, 1) {
            break;
        }
        current = downsample_2x(current.view());
    }
    current
}

/// Lazily derived pyramid of one channel: level k+1 is computed from level
/// k when level k is handed out.
pub struct Pyramid {
    plan: Vec<LevelDims>,
    next_index: usize,
    pending: Option<Plane>,
}

impl Pyramid {
    pub fn new(base: Plane, max_levels: usize, min_size: usize) -> Self {
        let (h, w) = base.dim();
        Self {
            plan: plan_levels(w, h, max_levels, min_size),
            next_index: 0,
            pending: Some(base),
        }
    }

    pub fn plan(&self) -> &[LevelDims] {
        &self.plan
    }
}

impl Iterator for Pyramid {
    type Item = PyramidLevel;

    fn next(&mut self) -> Option<PyramidLevel> {
        let data = self.pending.take()?;
        let level = self.next_index;
        self.next_index += 1;
        if self.next_index < self.plan.len() {
            self.pending = Some(downsample_2x(data.view()));
        }
        Some(PyramidLevel { level, data })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.plan.len() - self.next_index.min(self.plan.len());
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_edges_average_available_pixels() {
        let img = Array2::from_shape_vec((3, 3), (1..=9).map(|v| v as f32).collect()).unwrap();
        let small = downsample_2x(img.view());
        assert_eq!(small.dim(), (2, 2));
        assert_eq!(small[[0, 0]], (1.0 + 2.0 + 4.0 + 5.0) / 4.0);
        assert_eq!(small[[0, 1]], (3.0 + 6.0) / 2.0);
        assert_eq!(small[[1, 0]], (7.0 + 8.0) / 2.0);
        assert_eq!(small[[1, 1]], 9.0);
    }

    #[test]
    fn plan_respects_min_size_and_max_levels() {
        let plan = plan_levels(5000, 3000, 10, 512);
        let dims: Vec<(usize, usize)> = plan.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(dims, vec![(5000, 3000), (2500, 1500), (1250, 750)]);
        assert_eq!(plan_levels(5000, 3000, 2, 1).len(), 2);
        assert_eq!(plan_levels(100, 100, 5, 512).len(), 1);
    }
}
