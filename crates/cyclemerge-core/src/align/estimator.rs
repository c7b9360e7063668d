use tracing::{debug, info, warn};

use crate::cycle::Plane;
use crate::error::{CycleMergeError, Result};
use crate::pipeline::config::AlignmentConfig;
use crate::pyramid::downsample_pow2;
use crate::resample::resample_channel;

use super::affine::AffineMatrix;
use super::blocks::{estimate_block_shifts, BlockRules};
use super::features::{detect_features, Features};
use super::matching::match_descriptors;
use super::ransac::{estimate_affine, RansacConfig};
use super::transform::Transform;

/// Outcome of aligning one moving cycle.
#[derive(Clone, Debug)]
pub struct CycleAlignment {
    pub cycle: usize,
    /// Pyramid level `transform` is expressed at.
    pub level: usize,
    pub transform: Transform,
    pub matches: usize,
    pub inliers: usize,
    pub valid_blocks: usize,
    pub total_blocks: usize,
}

impl CycleAlignment {
    /// Identity alignment of the reference cycle.
    pub fn reference(cycle: usize) -> Self {
        Self {
            cycle,
            level: 0,
            transform: Transform::identity(),
            matches: 0,
            inliers: 0,
            valid_blocks: 0,
            total_blocks: 0,
        }
    }

    pub fn full_resolution_transform(&self) -> Transform {
        self.transform.scaled_to_full_resolution(self.level)
    }
}

/// Number of 2x reductions until the longer edge fits in `max_edge`.
pub fn thumbnail_reductions(width: usize, height: usize, max_edge: usize) -> usize {
    let mut longer = width.max(height);
    let mut steps = 0;
    while longer > max_edge.max(1) {
        longer = longer.div_ceil(2);
        steps += 1;
    }
    steps
}

/// Two-stage aligner bound to one reference registration plane.
///
/// The reference thumbnail features are computed once and reused for every
/// moving cycle.
pub struct AlignmentEstimator<'a> {
    config: &'a AlignmentConfig,
    reference: Plane,
    reference_features: Features,
    thumbnail_steps: usize,
}

impl<'a> AlignmentEstimator<'a> {
    /// `reference_plane` is the full-resolution registration channel of the
    /// reference cycle.
    pub fn new(reference_plane: &Plane, config: &'a AlignmentConfig) -> Self {
        let reference = downsample_pow2(reference_plane.view(), config.level);
        let (h, w) = reference.dim();
        let thumbnail_steps = thumbnail_reductions(w, h, config.thumbnail_size);
        let thumbnail = downsample_pow2(reference.view(), thumbnail_steps);
        let reference_features = detect_features(thumbnail.view(), config.max_keypoints);

        debug!(
            level = config.level,
            width = w,
            height = h,
            thumbnail_steps,
            keypoints = reference_features.len(),
            "Prepared reference for alignment"
        );

        Self {
            config,
            reference,
            reference_features,
            thumbnail_steps,
        }
    }

    /// Align one moving cycle given its full-resolution registration plane.
    pub fn estimate(&self, cycle: usize, moving_plane: &Plane) -> Result<CycleAlignment> {
        let moving = downsample_pow2(moving_plane.view(), self.config.level);
        let (affine, matches, inliers) = self.coarse(cycle, &moving)?;

        let (h, w) = self.reference.dim();
        let warped = resample_channel(moving, &Transform::Affine(affine), w, h);
        let rules = BlockRules {
            block_size: self.config.block_size,
            min_confidence: self.config.min_block_confidence,
            max_shift: self.config.max_block_shift,
        };

        let (transform, valid_blocks, total_blocks) =
            match estimate_block_shifts(self.reference.view(), warped.view(), &rules) {
                Some(local) => {
                    let (valid, total) = (local.valid_blocks(), local.total_blocks());
                    (Transform::AffinePlusLocal { affine, local }, valid, total)
                }
                None => {
                    warn!(
                        cycle,
                        "No block passed the confidence checks, using the affine alone"
                    );
                    (Transform::Affine(affine), 0, 0)
                }
            };

        info!(
            cycle,
            matches,
            inliers,
            valid_blocks,
            total_blocks,
            affine = %affine,
            "Cycle aligned"
        );

        Ok(CycleAlignment {
            cycle,
            level: self.config.level,
            transform,
            matches,
            inliers,
            valid_blocks,
            total_blocks,
        })
    }

    /// Feature-based affine at the working level.
    fn coarse(&self, cycle: usize, moving: &Plane) -> Result<(AffineMatrix, usize, usize)> {
        let thumbnail = downsample_pow2(moving.view(), self.thumbnail_steps);
        let moving_features = detect_features(thumbnail.view(), self.config.max_keypoints);
        let matches = match_descriptors(
            &self.reference_features.descriptors,
            &moving_features.descriptors,
            self.config.match_ratio,
        );

        let src: Vec<(f64, f64)> = matches
            .iter()
            .map(|m| {
                let kp = &self.reference_features.keypoints[m.reference];
                (kp.x, kp.y)
            })
            .collect();
        let dst: Vec<(f64, f64)> = matches
            .iter()
            .map(|m| {
                let kp = &moving_features.keypoints[m.moving];
                (kp.x, kp.y)
            })
            .collect();

        let ransac = RansacConfig {
            max_iterations: self.config.ransac_iterations,
            inlier_threshold: self.config.ransac_threshold,
            seed: self.config.ransac_seed,
            ..RansacConfig::default()
        };
        let fit = estimate_affine(&src, &dst, &ransac);
        let inliers = fit.as_ref().map_or(0, |f| f.inliers.len());

        debug!(
            cycle,
            reference_keypoints = self.reference_features.len(),
            moving_keypoints = moving_features.len(),
            matches = matches.len(),
            inliers,
            "Coarse alignment"
        );

        match fit {
            Some(fit) if inliers >= self.config.min_inliers => {
                let factor = (1u64 << self.thumbnail_steps) as f64;
                Ok((fit.transform.upscaled(factor), matches.len(), inliers))
            }
            _ => Err(CycleMergeError::InsufficientFeatures {
                cycle,
                reference_keypoints: self.reference_features.len(),
                moving_keypoints: moving_features.len(),
                matches: matches.len(),
                inliers,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_reduction_count() {
        assert_eq!(thumbnail_reductions(1500, 800, 2000), 0);
        assert_eq!(thumbnail_reductions(4000, 3000, 2000), 1);
        assert_eq!(thumbnail_reductions(4001, 3000, 2000), 2);
        assert_eq!(thumbnail_reductions(40_000, 30_000, 2000), 5);
    }
}
