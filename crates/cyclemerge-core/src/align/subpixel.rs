use ndarray::Array2;

use crate::consts::EPSILON;

/// Vertex offset of the parabola through `(-1, prev)`, `(0, curr)`, `(1, next)`.
#[inline]
fn parabola_vertex(prev: f64, curr: f64, next: f64) -> f64 {
    let denom = prev - 2.0 * curr + next;
    if denom.abs() > EPSILON {
        ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
    } else {
        0.0
    }
}

/// Refine an integer correlation peak with separable parabola fits.
///
/// The correlation surface is periodic, so neighbours wrap around the edges
/// (a zero shift peaks at `(0, 0)`). Returns `(delta_row, delta_col)`, each
/// clamped to half a pixel.
pub fn refine_peak_paraboloid(
    surface: &Array2<f64>,
    peak_row: usize,
    peak_col: usize,
) -> (f64, f64) {
    let (h, w) = surface.dim();
    if h < 3 || w < 3 {
        return (0.0, 0.0);
    }

    let up = (peak_row + h - 1) % h;
    let down = (peak_row + 1) % h;
    let left = (peak_col + w - 1) % w;
    let right = (peak_col + 1) % w;
    let centre = surface[[peak_row, peak_col]];

    (
        parabola_vertex(surface[[up, peak_col]], centre, surface[[down, peak_col]]),
        parabola_vertex(surface[[peak_row, left]], centre, surface[[peak_row, right]]),
    )
}
