use ndarray::Array2;

use cyclemerge_core::pyramid::{downsample_2x, plan_levels, Pyramid};

#[test]
fn test_plan_halves_with_ceil() {
    let levels = plan_levels(1001, 777, 10, 1);
    for pair in levels.windows(2) {
        assert_eq!(pair[1].width, pair[0].width.div_ceil(2));
        assert_eq!(pair[1].height, pair[0].height.div_ceil(2));
        assert_eq!(pair[1].level, pair[0].level + 1);
    }
    assert_eq!(levels.len(), 10);
    assert_eq!(levels[9].downsample_factor(), 512);
}

#[test]
fn test_plan_respects_max_levels() {
    assert_eq!(plan_levels(4096, 4096, 3, 16).len(), 3);
    assert_eq!(plan_levels(4096, 4096, 1, 16).len(), 1);
}

#[test]
fn test_plan_stops_below_min_size() {
    // 2000x600 -> 1000x300 -> 500x150; 150 < 256 so only two levels.
    let levels = plan_levels(2000, 600, 8, 256);
    assert_eq!(levels.len(), 2);
    assert_eq!((levels[1].width, levels[1].height), (1000, 300));
}

#[test]
fn test_small_image_keeps_level_zero() {
    let levels = plan_levels(100, 50, 5, 512);
    assert_eq!(levels.len(), 1);
    assert_eq!((levels[0].width, levels[0].height), (100, 50));
}

#[test]
fn test_plan_stops_when_size_no_longer_shrinks() {
    assert_eq!(plan_levels(1, 1, 5, 1).len(), 1);
}

#[test]
fn test_pyramid_matches_plan() {
    let base = Array2::from_shape_fn((130, 70), |(r, c)| (r + c) as f32);
    let pyramid = Pyramid::new(base, 4, 16);
    let plan = pyramid.plan().to_vec();
    assert_eq!(pyramid.size_hint(), (plan.len(), Some(plan.len())));

    let levels: Vec<_> = pyramid.collect();
    assert_eq!(levels.len(), plan.len());
    for (level, dims) in levels.iter().zip(&plan) {
        assert_eq!(level.dims(), *dims);
        assert_eq!(level.downsample_factor(), 1 << dims.level);
    }
}

#[test]
fn test_constant_plane_stays_constant() {
    let base = Array2::from_elem((33, 17), 42.0f32);
    for level in Pyramid::new(base, 5, 2) {
        assert!(level.data.iter().all(|&v| v == 42.0), "level {}", level.level);
    }
}

#[test]
fn test_area_average() {
    let data = Array2::from_shape_vec((2, 4), vec![1.0, 3.0, 10.0, 10.0, 5.0, 7.0, 20.0, 0.0]).unwrap();
    let half = downsample_2x(data.view());
    assert_eq!(half.dim(), (1, 2));
    assert_eq!(half[[0, 0]], 4.0);
    assert_eq!(half[[0, 1]], 10.0);
}
