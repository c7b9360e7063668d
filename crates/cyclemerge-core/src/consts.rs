/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// Default keypoint budget for the coarse feature-based alignment.
pub const DEFAULT_MAX_KEYPOINTS: usize = 4000;

/// Default longer-edge size (pixels) of the thumbnail used for coarse alignment.
pub const DEFAULT_THUMBNAIL_SIZE: usize = 2000;

/// Harris detector sensitivity `k` in `det(M) - k * trace(M)^2`.
pub const HARRIS_K: f32 = 0.04;

/// Gaussian sigma applied to the image before computing gradients.
pub const HARRIS_PRE_BLUR_SIGMA: f32 = 1.0;

/// Gaussian sigma used to integrate the structure tensor.
pub const HARRIS_INTEGRATION_SIGMA: f32 = 1.5;

/// Keypoints weaker than this fraction of the strongest response are dropped.
pub const HARRIS_RELATIVE_THRESHOLD: f32 = 0.001;

/// Side length of the sampling grid of a patch descriptor.
pub const DESCRIPTOR_GRID: usize = 8;

/// Pixel spacing between descriptor samples (patch covers GRID * STEP pixels).
pub const DESCRIPTOR_STEP: usize = 2;

/// Lowe ratio for descriptor matching (nearest / second nearest distance).
pub const DEFAULT_MATCH_RATIO: f32 = 0.8;

/// RANSAC inlier distance threshold, in thumbnail pixels.
pub const DEFAULT_RANSAC_THRESHOLD: f64 = 3.0;

/// Maximum RANSAC iterations.
pub const DEFAULT_RANSAC_ITERATIONS: usize = 2000;

/// Target confidence for RANSAC early termination.
pub const RANSAC_CONFIDENCE: f64 = 0.999;

/// Fixed RANSAC seed so repeated runs give identical transforms.
pub const DEFAULT_RANSAC_SEED: u64 = 0x5eed_c7c1_e5;

/// Minimum RANSAC inliers for the coarse affine to be accepted.
pub const DEFAULT_MIN_INLIERS: usize = 12;

/// Default fine-stage block size, in working-level pixels.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Default minimum phase-correlation peak z-score for a block shift.
pub const DEFAULT_MIN_BLOCK_CONFIDENCE: f64 = 8.0;

/// Default maximum accepted block shift magnitude, in working-level pixels.
pub const DEFAULT_MAX_BLOCK_SHIFT: f64 = 50.0;

/// Default output tile edge length.
pub const DEFAULT_TILE_SIZE: usize = 512;

/// Default maximum number of pyramid levels (including level 0).
pub const DEFAULT_MAX_PYRAMID_LEVELS: usize = 5;

/// Default minimum shorter edge for a pyramid level to be emitted.
pub const DEFAULT_MIN_LEVEL_SIZE: usize = 512;

/// Micrometres per centimetre, for TIFF resolution tags.
pub const MICRONS_PER_CM: f64 = 10_000.0;
