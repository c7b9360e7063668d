use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Separable Gaussian blur with clamped borders.
pub fn gaussian_blur(data: ArrayView2<'_, f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 {
        return data.to_owned();
    }
    let kernel = gaussian_kernel(sigma);
    let horizontal = convolve(data, &kernel, Axis(1));
    convolve(horizontal.view(), &kernel, Axis(0))
}

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// 1-D convolution along `axis`, one output row at a time.
fn convolve(data: ArrayView2<'_, f32>, kernel: &[f32], axis: Axis) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() as isize / 2;
    let mut out = Array2::<f32>::zeros((h, w));

    let fill_row = |row: usize, mut out_row: ndarray::ArrayViewMut1<'_, f32>| {
        for (col, dst) in out_row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let offset = ki as isize - radius;
                let v = if axis == Axis(1) {
                    let c = (col as isize + offset).clamp(0, w as isize - 1) as usize;
                    data[[row, c]]
                } else {
                    let r = (row as isize + offset).clamp(0, h as isize - 1) as usize;
                    data[[r, col]]
                };
                sum += v * kv;
            }
            *dst = sum;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_constant_image() {
        let flat = Array2::<f32>::from_elem((20, 30), 42.0);
        let blurred = gaussian_blur(flat.view(), 1.5);
        assert!(blurred.iter().all(|&v| (v - 42.0).abs() < 1e-4));
    }

    #[test]
    fn spreads_an_impulse() {
        let mut img = Array2::<f32>::zeros((15, 15));
        img[[7, 7]] = 1.0;
        let blurred = gaussian_blur(img.view(), 1.0);
        assert!(blurred[[7, 7]] < 1.0);
        assert!(blurred[[7, 8]] > 0.0);
        assert!((blurred.sum() - 1.0).abs() < 1e-4);
    }
}
