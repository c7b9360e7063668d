//! Seeded RANSAC fit of a global affine to keypoint correspondences.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::consts::{
    DEFAULT_RANSAC_ITERATIONS, DEFAULT_RANSAC_SEED, DEFAULT_RANSAC_THRESHOLD, RANSAC_CONFIDENCE,
};

use super::affine::AffineMatrix;

/// Points needed to determine an affine map.
const MIN_SAMPLES: usize = 3;

/// Refinement rounds spent on each promising hypothesis.
const LO_ITERATIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub max_iterations: usize,
    /// Inlier distance threshold in pixels.
    pub inlier_threshold: f64,
    /// Target confidence for early termination.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_RANSAC_ITERATIONS,
            inlier_threshold: DEFAULT_RANSAC_THRESHOLD,
            confidence: RANSAC_CONFIDENCE,
            seed: DEFAULT_RANSAC_SEED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult {
    pub transform: AffineMatrix,
    /// Indices of inlier correspondences, ascending.
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

/// Fit `dst ≈ A(src)`.
///
/// Returns `None` when fewer than three correspondences exist or every
/// sample was degenerate. The caller decides whether the inlier count is
/// good enough.
pub fn estimate_affine(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    config: &RansacConfig,
) -> Option<RansacResult> {
    let n = src.len();
    if n < MIN_SAMPLES || dst.len() != n {
        return None;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let threshold_sq = config.inlier_threshold * config.inlier_threshold;

    let mut best: Option<(AffineMatrix, Vec<usize>)> = None;
    let mut sample = Vec::with_capacity(MIN_SAMPLES);
    let mut sample_src = Vec::with_capacity(MIN_SAMPLES);
    let mut sample_dst = Vec::with_capacity(MIN_SAMPLES);
    let mut iterations = 0;
    let mut budget = config.max_iterations;

    while iterations < budget {
        iterations += 1;

        sample_without_replacement(&mut rng, n, MIN_SAMPLES, &mut sample);
        sample_src.clear();
        sample_dst.clear();
        for &i in &sample {
            sample_src.push(src[i]);
            sample_dst.push(dst[i]);
        }

        let Some(candidate) = AffineMatrix::fit(&sample_src, &sample_dst) else {
            continue;
        };
        let inliers = collect_inliers(src, dst, &candidate, threshold_sq);
        if inliers.len() <= best.as_ref().map_or(MIN_SAMPLES - 1, |(_, b)| b.len()) {
            continue;
        }

        let (model, inliers) = local_optimization(src, dst, candidate, inliers, threshold_sq);
        let ratio = inliers.len() as f64 / n as f64;
        best = Some((model, inliers));
        budget = budget.min(adaptive_iterations(ratio, MIN_SAMPLES, config.confidence).max(iterations));
    }

    let (model, inliers) = best?;
    let inlier_src: Vec<(f64, f64)> = inliers.iter().map(|&i| src[i]).collect();
    let inlier_dst: Vec<(f64, f64)> = inliers.iter().map(|&i| dst[i]).collect();
    let refined = AffineMatrix::fit(&inlier_src, &inlier_dst).unwrap_or(model);
    let final_inliers = collect_inliers(src, dst, &refined, threshold_sq);

    Some(RansacResult {
        transform: refined,
        inliers: final_inliers,
        iterations,
    })
}

/// Refit on the current inliers until the inlier set stops growing.
fn local_optimization(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    mut model: AffineMatrix,
    mut inliers: Vec<usize>,
    threshold_sq: f64,
) -> (AffineMatrix, Vec<usize>) {
    for _ in 0..LO_ITERATIONS {
        let inlier_src: Vec<(f64, f64)> = inliers.iter().map(|&i| src[i]).collect();
        let inlier_dst: Vec<(f64, f64)> = inliers.iter().map(|&i| dst[i]).collect();
        let Some(refit) = AffineMatrix::fit(&inlier_src, &inlier_dst) else {
            break;
        };
        let grown = collect_inliers(src, dst, &refit, threshold_sq);
        if grown.len() <= inliers.len() {
            break;
        }
        model = refit;
        inliers = grown;
    }
    (model, inliers)
}

fn collect_inliers(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    model: &AffineMatrix,
    threshold_sq: f64,
) -> Vec<usize> {
    src.iter()
        .zip(dst)
        .enumerate()
        .filter_map(|(i, (&(x, y), &(u, v)))| {
            let (px, py) = model.apply(x, y);
            let err = (px - u) * (px - u) + (py - v) * (py - v);
            (err <= threshold_sq).then_some(i)
        })
        .collect()
}

/// Floyd's algorithm: `k` distinct indices from `0..n`.
fn sample_without_replacement<R: Rng>(rng: &mut R, n: usize, k: usize, out: &mut Vec<usize>) {
    out.clear();
    for j in (n - k)..n {
        let t = rng.random_range(0..=j);
        if out.contains(&t) {
            out.push(j);
        } else {
            out.push(t);
        }
    }
}

/// Iterations needed to draw one all-inlier sample with the given confidence.
fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio >= 1.0 {
        return 1;
    }
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    let all_inliers = inlier_ratio.powi(sample_size as i32);
    let log_miss = (1.0 - all_inliers).ln();
    if log_miss >= 0.0 {
        return usize::MAX;
    }
    ((1.0 - confidence).ln() / log_miss).ceil() as usize
}
