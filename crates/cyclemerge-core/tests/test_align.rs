mod common;

use approx::assert_abs_diff_eq;

use cyclemerge_core::align::{AffineMatrix, AlignmentEstimator, Transform};
use cyclemerge_core::error::CycleMergeError;
use cyclemerge_core::pipeline::config::AlignmentConfig;
use cyclemerge_core::resample::resample_channel;

use common::{crop, noise, rms, texture};

fn small_alignment() -> AlignmentConfig {
    AlignmentConfig {
        block_size: 64,
        ..Default::default()
    }
}

fn grid_points(width: usize, height: usize, margin: usize) -> Vec<(f64, f64)> {
    let mut points = Vec::new();
    for y in (margin..height - margin).step_by(16) {
        for x in (margin..width - margin).step_by(16) {
            points.push((x as f64, y as f64));
        }
    }
    points
}

#[test]
fn test_recovers_rigid_shift() {
    let canvas = texture(320, 320, 11);
    let reference = crop(&canvas, 20, 20, 256, 256);
    // moving(p) = reference(p + (7, -4))
    let moving = crop(&canvas, 27, 16, 256, 256);

    let config = small_alignment();
    let estimator = AlignmentEstimator::new(&reference, &config);
    let alignment = estimator.estimate(1, &moving).unwrap();

    assert_eq!(alignment.cycle, 1);
    assert!(alignment.inliers >= config.min_inliers);
    assert!(alignment.valid_blocks > 0, "fine stage found no blocks");
    assert!(matches!(alignment.transform, Transform::AffinePlusLocal { .. }));

    let transform = alignment.full_resolution_transform();
    let points = grid_points(256, 256, 24);
    let mapped: Vec<(f64, f64)> = points.iter().map(|&(x, y)| transform.map(x, y)).collect();
    let expected: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (x - 7.0, y + 4.0)).collect();
    let error = rms(&mapped, &expected);
    assert!(error < 1.0, "RMS error {} px", error);
}

#[test]
fn test_recovers_shift_at_working_level() {
    let canvas = texture(320, 320, 12);
    let reference = crop(&canvas, 20, 20, 256, 256);
    let moving = crop(&canvas, 12, 24, 256, 256);

    let config = AlignmentConfig {
        level: 1,
        ..small_alignment()
    };
    let estimator = AlignmentEstimator::new(&reference, &config);
    let alignment = estimator.estimate(2, &moving).unwrap();
    assert_eq!(alignment.level, 1);

    let transform = alignment.full_resolution_transform();
    let points = grid_points(256, 256, 32);
    let mapped: Vec<(f64, f64)> = points.iter().map(|&(x, y)| transform.map(x, y)).collect();
    let expected: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (x + 8.0, y - 4.0)).collect();
    let error = rms(&mapped, &expected);
    assert!(error < 1.0, "RMS error {} px", error);
}

#[test]
fn test_identical_cycles_give_near_identity() {
    let reference = texture(192, 192, 13);
    let config = small_alignment();
    let estimator = AlignmentEstimator::new(&reference, &config);
    let alignment = estimator.estimate(1, &reference.clone()).unwrap();

    let (x, y) = alignment.full_resolution_transform().map(100.0, 80.0);
    assert_abs_diff_eq!(x, 100.0, epsilon = 0.25);
    assert_abs_diff_eq!(y, 80.0, epsilon = 0.25);
}

#[test]
fn test_rejected_blocks_fall_back_to_affine() {
    let canvas = texture(320, 320, 18);
    let reference = crop(&canvas, 20, 20, 256, 256);
    let moving = crop(&canvas, 26, 17, 256, 256);

    // No block can reach this confidence.
    let config = AlignmentConfig {
        min_block_confidence: 1e9,
        ..small_alignment()
    };
    let estimator = AlignmentEstimator::new(&reference, &config);
    let alignment = estimator.estimate(1, &moving).unwrap();

    assert_eq!(alignment.valid_blocks, 0);
    assert!(matches!(alignment.transform, Transform::Affine(_)));

    let transform = alignment.full_resolution_transform();
    let points = grid_points(256, 256, 24);
    let mapped: Vec<(f64, f64)> = points.iter().map(|&(x, y)| transform.map(x, y)).collect();
    let expected: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (x - 6.0, y + 3.0)).collect();
    assert_abs_diff_eq!(rms(&mapped, &expected), 0.0, epsilon = 1.0);
}

#[test]
fn test_noise_cycle_has_insufficient_features() {
    let reference = texture(256, 256, 14);
    let moving = noise(256, 256, 99);

    let config = small_alignment();
    let estimator = AlignmentEstimator::new(&reference, &config);
    let err = estimator.estimate(3, &moving).unwrap_err();
    match err {
        CycleMergeError::InsufficientFeatures {
            cycle,
            reference_keypoints,
            inliers,
            ..
        } => {
            assert_eq!(cycle, 3);
            assert!(reference_keypoints > 0);
            assert!(inliers < config.min_inliers);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_estimation_is_deterministic() {
    let canvas = texture(300, 300, 15);
    let reference = crop(&canvas, 10, 10, 240, 240);
    let moving = crop(&canvas, 13, 15, 240, 240);

    let config = small_alignment();
    let a = AlignmentEstimator::new(&reference, &config)
        .estimate(1, &moving)
        .unwrap();
    let b = AlignmentEstimator::new(&reference, &config)
        .estimate(1, &moving)
        .unwrap();
    assert_eq!(a.transform, b.transform);
}

#[test]
fn test_resampling_applies_transform() {
    let canvas = texture(200, 200, 16);
    let reference = crop(&canvas, 20, 20, 128, 128);
    let moving = crop(&canvas, 25, 17, 128, 128);

    // Reference pixel p is found at p - (5, -3) in the moving image.
    let transform = Transform::Affine(AffineMatrix::translation(-5.0, 3.0));
    let registered = resample_channel(moving, &transform, 128, 128);

    for y in 10..118 {
        for x in 10..118 {
            assert_eq!(registered[[y, x]], reference[[y, x]]);
        }
    }
    // Outside the moving image the result is zero.
    assert_eq!(registered[[0, 0]], 0.0);
}

#[test]
fn test_identity_resampling_is_bit_exact() {
    let plane = texture(96, 64, 17);
    let out = resample_channel(plane.clone(), &Transform::identity(), 96, 64);
    assert_eq!(out, plane);
}
