use std::cmp::Ordering;

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::consts::{
    DESCRIPTOR_GRID, DESCRIPTOR_STEP, EPSILON, HARRIS_INTEGRATION_SIGMA, HARRIS_K,
    HARRIS_PRE_BLUR_SIGMA, HARRIS_RELATIVE_THRESHOLD, PARALLEL_PIXEL_THRESHOLD,
};
use crate::filters::gaussian_blur;

/// A corner in thumbnail pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub response: f32,
}

/// Keypoints with one descriptor row each.
#[derive(Clone, Debug)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    /// Shape `(keypoints.len(), DESCRIPTOR_GRID^2)`, rows are zero-mean and
    /// unit length.
    pub descriptors: Array2<f32>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Pixels kept clear of the border so the descriptor patch fits.
fn descriptor_margin() -> usize {
    DESCRIPTOR_GRID * DESCRIPTOR_STEP / 2 + 1
}

/// Harris corner response of the pre-blurred image.
fn harris_response(smooth: ArrayView2<'_, f32>) -> Array2<f32> {
    let (h, w) = smooth.dim();
    let mut ixx = Array2::<f32>::zeros((h, w));
    let mut iyy = Array2::<f32>::zeros((h, w));
    let mut ixy = Array2::<f32>::zeros((h, w));

    for row in 0..h {
        let up = row.saturating_sub(1);
        let down = (row + 1).min(h - 1);
        for col in 0..w {
            let left = col.saturating_sub(1);
            let right = (col + 1).min(w - 1);
            let gx = 0.5 * (smooth[[row, right]] - smooth[[row, left]]);
            let gy = 0.5 * (smooth[[down, col]] - smooth[[up, col]]);
            ixx[[row, col]] = gx * gx;
            iyy[[row, col]] = gy * gy;
            ixy[[row, col]] = gx * gy;
        }
    }

    let sxx = gaussian_blur(ixx.view(), HARRIS_INTEGRATION_SIGMA);
    let syy = gaussian_blur(iyy.view(), HARRIS_INTEGRATION_SIGMA);
    let sxy = gaussian_blur(ixy.view(), HARRIS_INTEGRATION_SIGMA);

    let mut response = Array2::<f32>::zeros((h, w));
    ndarray::Zip::from(&mut response)
        .and(&sxx)
        .and(&syy)
        .and(&sxy)
        .for_each(|r, &a, &b, &c| {
            let trace = a + b;
            *r = a * b - c * c - HARRIS_K * trace * trace;
        });
    response
}

/// Strict 3x3 local maxima above the relative threshold, away from the
/// border, strongest first. Ties are broken by row then column.
fn select_corners(response: &Array2<f32>, margin: usize, max_keypoints: usize) -> Vec<Keypoint> {
    let (h, w) = response.dim();
    if h <= 2 * margin || w <= 2 * margin {
        return Vec::new();
    }

    let peak = response.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return Vec::new();
    }
    let threshold = peak * HARRIS_RELATIVE_THRESHOLD;

    let mut corners = Vec::new();
    for row in margin..h - margin {
        for col in margin..w - margin {
            let v = response[[row, col]];
            if v <= threshold {
                continue;
            }
            let mut is_max = true;
            'nms: for dr in 0..3 {
                for dc in 0..3 {
                    if (dr, dc) == (1, 1) {
                        continue;
                    }
                    let n = response[[row + dr - 1, col + dc - 1]];
                    // Plateaus keep only their first pixel in raster order.
                    if n > v || (n == v && (dr, dc) < (1, 1)) {
                        is_max = false;
                        break 'nms;
                    }
                }
            }
            if is_max {
                corners.push(Keypoint {
                    x: col as f64,
                    y: row as f64,
                    response: v,
                });
            }
        }
    }

    corners.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(Ordering::Equal)
            .then(a.y.total_cmp(&b.y))
            .then(a.x.total_cmp(&b.x))
    });
    corners.truncate(max_keypoints);
    corners
}

/// Zero-mean, unit-length patch sampled on a `GRID x GRID` lattice.
fn describe(smooth: &Array2<f32>, kp: &Keypoint, out: &mut [f32]) -> bool {
    let half = (DESCRIPTOR_GRID * DESCRIPTOR_STEP / 2) as isize;
    let (row, col) = (kp.y as isize, kp.x as isize);

    for (i, v) in out.iter_mut().enumerate() {
        let gy = (i / DESCRIPTOR_GRID * DESCRIPTOR_STEP) as isize - half + 1;
        let gx = (i % DESCRIPTOR_GRID * DESCRIPTOR_STEP) as isize - half + 1;
        *v = smooth[[(row + gy) as usize, (col + gx) as usize]];
    }

    let mean = out.iter().sum::<f32>() / out.len() as f32;
    out.iter_mut().for_each(|v| *v -= mean);
    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if (norm as f64) < EPSILON {
        return false;
    }
    out.iter_mut().for_each(|v| *v /= norm);
    true
}

/// Detect up to `max_keypoints` Harris corners and describe each one.
///
/// Corners whose patch is flat are dropped, so the result can hold fewer
/// keypoints than were detected.
pub fn detect_features(image: ArrayView2<'_, f32>, max_keypoints: usize) -> Features {
    let smooth = gaussian_blur(image, HARRIS_PRE_BLUR_SIGMA);
    let response = harris_response(smooth.view());
    let corners = select_corners(&response, descriptor_margin(), max_keypoints);

    let dim = DESCRIPTOR_GRID * DESCRIPTOR_GRID;
    let describe_one = |kp: &Keypoint| {
        let mut descriptor = vec![0.0f32; dim];
        describe(&smooth, kp, &mut descriptor).then_some(descriptor)
    };
    let described: Vec<Option<Vec<f32>>> = if image.len() >= PARALLEL_PIXEL_THRESHOLD {
        corners.par_iter().map(describe_one).collect()
    } else {
        corners.iter().map(describe_one).collect()
    };

    let mut keypoints = Vec::with_capacity(corners.len());
    let mut flat = Vec::with_capacity(corners.len() * dim);
    for (kp, descriptor) in corners.iter().zip(described) {
        if let Some(descriptor) = descriptor {
            keypoints.push(*kp);
            flat.extend_from_slice(&descriptor);
        }
    }
    let descriptors = Array2::from_shape_vec((keypoints.len(), dim), flat)
        .unwrap_or_else(|_| Array2::zeros((0, dim)));

    Features {
        keypoints,
        descriptors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(h: usize, w: usize, cell: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(r, c)| {
            if (r / cell + c / cell) % 2 == 0 {
                200.0
            } else {
                20.0
            }
        })
    }

    #[test]
    fn finds_checkerboard_corners() {
        let img = checkerboard(96, 96, 16);
        let features = detect_features(img.view(), 100);
        assert!(features.len() >= 9);
        for kp in features.keypoints.iter().take(9) {
            let near = |v: f64| {
                let m = v.rem_euclid(16.0);
                m <= 2.0 || m >= 14.0
            };
            assert!(near(kp.x) && near(kp.y), "corner at ({}, {})", kp.x, kp.y);
        }
    }

    #[test]
    fn flat_image_has_no_features() {
        let img = Array2::<f32>::from_elem((64, 64), 10.0);
        assert!(detect_features(img.view(), 100).is_empty());
    }

    #[test]
    fn ordering_is_strongest_first_and_capped() {
        let img = checkerboard(128, 128, 16);
        let features = detect_features(img.view(), 5);
        assert!(features.len() <= 5);
        for pair in features.keypoints.windows(2) {
            assert!(pair[0].response >= pair[1].response);
        }
        assert_eq!(features.descriptors.nrows(), features.len());
    }
}
