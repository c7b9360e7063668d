pub mod gaussian_blur;

pub use gaussian_blur::gaussian_blur;
