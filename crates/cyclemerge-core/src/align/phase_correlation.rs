use ndarray::{Array2, ArrayView2};
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::consts::EPSILON;
use crate::error::{CycleMergeError, Result};

use super::subpixel::refine_peak_paraboloid;

/// Translation between two equally sized patches.
///
/// `target(p) ≈ reference(p + (dy, dx))`, so sampling the target at
/// `p - (dy, dx)` lines it up with the reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseShift {
    pub dx: f64,
    pub dy: f64,
    /// Z-score of the correlation peak over the whole surface.
    pub confidence: f64,
}

impl PhaseShift {
    pub fn magnitude(&self) -> f64 {
        self.dx.hypot(self.dy)
    }
}

/// Hann-windowed FFT phase correlation with sub-pixel peak refinement.
pub fn phase_correlate(
    reference: ArrayView2<'_, f32>,
    target: ArrayView2<'_, f32>,
) -> Result<PhaseShift> {
    let (h, w) = reference.dim();
    if target.dim() != (h, w) {
        let (th, tw) = target.dim();
        return Err(CycleMergeError::InvalidConfig(format!(
            "phase correlation patch mismatch: {}x{} vs {}x{}",
            w, h, tw, th
        )));
    }
    if h < 2 || w < 2 {
        return Ok(PhaseShift {
            dx: 0.0,
            dy: 0.0,
            confidence: 0.0,
        });
    }

    let mut planner = FftPlanner::new();
    let ref_fft = fft2d(&mut planner, &windowed(reference));
    let tgt_fft = fft2d(&mut planner, &windowed(target));

    let cross = normalized_cross_power(&ref_fft, &tgt_fft);
    let surface = ifft2d(&mut planner, cross);

    let (peak_row, peak_col, peak) = find_peak(&surface);
    let confidence = peak_z_score(&surface, peak);

    let wrap = |pos: usize, len: usize| -> f64 {
        if pos > len / 2 {
            pos as f64 - len as f64
        } else {
            pos as f64
        }
    };
    let (sub_dy, sub_dx) = refine_peak_paraboloid(&surface, peak_row, peak_col);

    Ok(PhaseShift {
        dx: wrap(peak_col, w) + sub_dx,
        dy: wrap(peak_row, h) + sub_dy,
        confidence,
    })
}

/// Subtract the mean and apply a separable Hann window.
fn windowed(data: ArrayView2<'_, f32>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mean = data.iter().map(|&v| v as f64).sum::<f64>() / (h * w) as f64;
    let hann = |i: usize, n: usize| 0.5 * (1.0 - (std::f64::consts::TAU * i as f64 / n as f64).cos());
    let col_window: Vec<f64> = (0..w).map(|c| hann(c, w)).collect();

    Array2::from_shape_fn((h, w), |(row, col)| {
        (data[[row, col]] as f64 - mean) * hann(row, h) * col_window[col]
    })
}

/// Row transforms then column transforms, in place on a complex copy.
fn fft2d(planner: &mut FftPlanner<f64>, data: &Array2<f64>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut spectrum = data.mapv(|v| Complex::new(v, 0.0));
    let row_fft = planner.plan_fft_forward(w);
    let col_fft = planner.plan_fft_forward(h);

    let mut buf = vec![Complex::new(0.0, 0.0); w.max(h)];
    for mut lane in spectrum.rows_mut() {
        let line = &mut buf[..w];
        line.iter_mut().zip(lane.iter()).for_each(|(b, &v)| *b = v);
        row_fft.process(line);
        lane.iter_mut().zip(line.iter()).for_each(|(v, &b)| *v = b);
    }
    for mut lane in spectrum.columns_mut() {
        let line = &mut buf[..h];
        line.iter_mut().zip(lane.iter()).for_each(|(b, &v)| *b = v);
        col_fft.process(line);
        lane.iter_mut().zip(line.iter()).for_each(|(v, &b)| *v = b);
    }
    spectrum
}

/// Inverse of [`fft2d`], returning the normalized real part.
fn ifft2d(planner: &mut FftPlanner<f64>, mut spectrum: Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = spectrum.dim();
    let row_ifft = planner.plan_fft_inverse(w);
    let col_ifft = planner.plan_fft_inverse(h);

    let mut buf = vec![Complex::new(0.0, 0.0); w.max(h)];
    for mut lane in spectrum.columns_mut() {
        let line = &mut buf[..h];
        line.iter_mut().zip(lane.iter()).for_each(|(b, &v)| *b = v);
        col_ifft.process(line);
        lane.iter_mut().zip(line.iter()).for_each(|(v, &b)| *v = b);
    }
    for mut lane in spectrum.rows_mut() {
        let line = &mut buf[..w];
        line.iter_mut().zip(lane.iter()).for_each(|(b, &v)| *b = v);
        row_ifft.process(line);
        lane.iter_mut().zip(line.iter()).for_each(|(v, &b)| *v = b);
    }

    let scale = 1.0 / (h * w) as f64;
    spectrum.mapv(|c| c.re * scale)
}

fn normalized_cross_power(
    ref_fft: &Array2<Complex<f64>>,
    tgt_fft: &Array2<Complex<f64>>,
) -> Array2<Complex<f64>> {
    let mut cross = Array2::<Complex<f64>>::zeros(ref_fft.dim());
    ndarray::Zip::from(&mut cross)
        .and(ref_fft)
        .and(tgt_fft)
        .for_each(|out, &r, &t| {
            let c = r * t.conj();
            let mag = c.norm();
            *out = if mag > EPSILON {
                c / mag
            } else {
                Complex::new(0.0, 0.0)
            };
        });
    cross
}

/// First maximum in row-major order.
fn find_peak(surface: &Array2<f64>) -> (usize, usize, f64) {
    let mut best = (0, 0, f64::NEG_INFINITY);
    for ((row, col), &v) in surface.indexed_iter() {
        if v > best.2 {
            best = (row, col, v);
        }
    }
    best
}

fn peak_z_score(surface: &Array2<f64>, peak: f64) -> f64 {
    let n = surface.len() as f64;
    let mean = surface.sum() / n;
    let var = surface.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = var.sqrt();
    if std > EPSILON {
        (peak - mean) / std
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    /// Seeded Gaussian blobs; aperiodic so the correlation peak is unique.
    fn texture(h: usize, w: usize, seed: u64) -> Array2<f32> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut data = Array2::<f32>::from_elem((h, w), 2000.0);
        for _ in 0..w * h / 400 {
            let cx = rng.random_range(0.0..w as f32);
            let cy = rng.random_range(0.0..h as f32);
            let sigma = rng.random_range(1.5f32..4.5);
            let amplitude = rng.random_range(3000.0f32..12000.0);
            let reach = (3.0 * sigma).ceil() as isize;
            for dy in -reach..=reach {
                for dx in -reach..=reach {
                    let (x, y) = (cx as isize + dx, cy as isize + dy);
                    if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
                        continue;
                    }
                    let (rx, ry) = (x as f32 - cx, y as f32 - cy);
                    data[[y as usize, x as usize]] +=
                        amplitude * (-(rx * rx + ry * ry) / (2.0 * sigma * sigma)).exp();
                }
            }
        }
        data.mapv_inplace(|v| v.round().min(60_000.0));
        data
    }

    #[test]
    fn recovers_integer_shift() {
        let big = texture(96, 96, 3);
        let reference = big.slice(ndarray::s![16..80, 16..80]);
        // target(p) = reference(p + (3, -5))
        let target = big.slice(ndarray::s![19..83, 11..75]);
        let shift = phase_correlate(reference, target).unwrap();
        assert!((shift.dy - 3.0).abs() < 0.25, "dy = {}", shift.dy);
        assert!((shift.dx + 5.0).abs() < 0.25, "dx = {}", shift.dx);
        assert!(shift.confidence > 8.0);
    }

    #[test]
    fn flat_patch_has_no_confidence() {
        let flat = Array2::<f32>::from_elem((32, 32), 7.0);
        let shift = phase_correlate(flat.view(), flat.view()).unwrap();
        assert!(shift.confidence < 8.0);
    }
}
