pub mod affine;
pub mod blocks;
pub mod estimator;
pub mod features;
pub mod matching;
pub mod phase_correlation;
pub mod ransac;
pub mod subpixel;
pub mod transform;

pub use affine::AffineMatrix;
pub use blocks::DisplacementGrid;
pub use estimator::{AlignmentEstimator, CycleAlignment};
pub use transform::Transform;
