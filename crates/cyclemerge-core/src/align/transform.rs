use super::affine::AffineMatrix;
use super::blocks::DisplacementGrid;

/// Geometric correction of one moving cycle.
///
/// Maps a pixel `p` of the reference frame to the position of the moving
/// image it is sampled from:
///
/// ```text
/// Affine(A):                   p -> A(p)
/// AffinePlusLocal { A, o }:    p -> A(p - o(p))
/// ```
///
/// where `o(p)` is the residual interpolated from the block grid.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    Affine(AffineMatrix),
    AffinePlusLocal {
        affine: AffineMatrix,
        local: DisplacementGrid,
    },
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self::Affine(AffineMatrix::identity())
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Affine(a) if a.is_identity())
    }

    #[inline]
    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Affine(affine) => affine.apply(x, y),
            Self::AffinePlusLocal { affine, local } => {
                let (ox, oy) = local.offset_at(x, y);
                affine.apply(x - ox, y - oy)
            }
        }
    }

    /// Express a transform estimated at pyramid level `level` on the
    /// full-resolution grid.
    pub fn scaled_to_full_resolution(&self, level: usize) -> Transform {
        if level == 0 {
            return self.clone();
        }
        let factor = (1u64 << level) as f64;
        match self {
            Self::Affine(affine) => Self::Affine(affine.upscaled(factor)),
            Self::AffinePlusLocal { affine, local } => Self::AffinePlusLocal {
                affine: affine.upscaled(factor),
                local: local.upscaled(factor),
            },
        }
    }
}
