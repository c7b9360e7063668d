use std::fmt;

use crate::consts::EPSILON;

/// 2x3 affine map in pixel coordinates:
///
/// ```text
/// x' = a * x + b * y + tx
/// y' = c * x + d * y + ty
/// ```
///
/// `x` is the column and `y` the row of a pixel centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineMatrix {
    pub a: f64,
    pub b: f64,
    pub tx: f64,
    pub c: f64,
    pub d: f64,
    pub ty: f64,
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineMatrix {
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0)
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            tx,
            c: 0.0,
            d: 1.0,
            ty,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    /// Linear part only (no translation).
    #[inline]
    pub fn apply_linear(&self, x: f64, y: f64) -> (f64, f64) {
        (self.a * x + self.b * y, self.c * x + self.d * y)
    }

    /// Re-express a map defined on a grid downsampled by `factor` on the
    /// finer grid.
    ///
    /// Pixel centre `u` of the coarse grid covers fine pixel centre
    /// `p = factor * u + (factor - 1) / 2`, so the linear part is unchanged
    /// and only the translation moves.
    pub fn upscaled(&self, factor: f64) -> AffineMatrix {
        let centre = (factor - 1.0) / 2.0;
        let (lx, ly) = self.apply_linear(centre, centre);
        AffineMatrix {
            tx: factor * self.tx + centre - lx,
            ty: factor * self.ty + centre - ly,
            ..*self
        }
    }

    /// Least-squares affine mapping `src[i]` onto `dst[i]`.
    ///
    /// Points are centred first so the normal equations split into a 2x2
    /// system per output coordinate. Returns `None` for fewer than three
    /// points or a degenerate (collinear) configuration.
    pub fn fit(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<AffineMatrix> {
        let n = src.len();
        if n < 3 || dst.len() != n {
            return None;
        }

        let inv_n = 1.0 / n as f64;
        let (mut mx, mut my, mut mu, mut mv) = (0.0, 0.0, 0.0, 0.0);
        for (&(x, y), &(u, v)) in src.iter().zip(dst) {
            mx += x;
            my += y;
            mu += u;
            mv += v;
        }
        mx *= inv_n;
        my *= inv_n;
        mu *= inv_n;
        mv *= inv_n;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        let (mut sxu, mut syu, mut sxv, mut syv) = (0.0, 0.0, 0.0, 0.0);
        for (&(x, y), &(u, v)) in src.iter().zip(dst) {
            let (x, y, u, v) = (x - mx, y - my, u - mu, v - mv);
            sxx += x * x;
            sxy += x * y;
            syy += y * y;
            sxu += x * u;
            syu += y * u;
            sxv += x * v;
            syv += y * v;
        }

        let det = sxx * syy - sxy * sxy;
        if det.abs() <= EPSILON * (sxx * syy).max(1.0) {
            return None;
        }

        let a = (sxu * syy - syu * sxy) / det;
        let b = (syu * sxx - sxu * sxy) / det;
        let c = (sxv * syy - syv * sxy) / det;
        let d = (syv * sxx - sxv * sxy) / det;

        Some(AffineMatrix {
            a,
            b,
            tx: mu - a * mx - b * my,
            c,
            d,
            ty: mv - c * mx - d * my,
        })
    }
}

impl fmt::Display for AffineMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.5} {:.5} {:.3}; {:.5} {:.5} {:.3}]",
            self.a, self.b, self.tx, self.c, self.d, self.ty
        )
    }
}
