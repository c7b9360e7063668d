use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

/// A reference/moving keypoint correspondence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureMatch {
    pub reference: usize,
    pub moving: usize,
    /// Squared descriptor distance.
    pub distance: f32,
}

#[derive(Clone, Copy)]
struct Nearest {
    best: usize,
    best_dist: f32,
    second_dist: f32,
}

/// Squared L2 distance between unit-length descriptors.
#[inline]
fn distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    (2.0 - 2.0 * a.dot(&b)).max(0.0)
}

/// Nearest and second-nearest row of `candidates` for every row of
/// `queries`. Equal distances resolve to the lower index.
fn nearest_neighbours(queries: &Array2<f32>, candidates: &Array2<f32>) -> Vec<Nearest> {
    (0..queries.nrows())
        .into_par_iter()
        .map(|q| {
            let query = queries.row(q);
            let mut found = Nearest {
                best: usize::MAX,
                best_dist: f32::INFINITY,
                second_dist: f32::INFINITY,
            };
            for (c, candidate) in candidates.rows().into_iter().enumerate() {
                let d = distance(query, candidate);
                if d < found.best_dist {
                    found.second_dist = found.best_dist;
                    found.best_dist = d;
                    found.best = c;
                } else if d < found.second_dist {
                    found.second_dist = d;
                }
            }
            found
        })
        .collect()
}

/// Mutual nearest-neighbour matching with Lowe's ratio test.
///
/// A pair is kept when each descriptor is the other's nearest neighbour and
/// the nearest distance is below `ratio` times the second nearest (both as
/// plain distances). Output is ordered by reference index.
pub fn match_descriptors(
    reference: &Array2<f32>,
    moving: &Array2<f32>,
    ratio: f32,
) -> Vec<FeatureMatch> {
    if reference.nrows() == 0 || moving.nrows() < 2 {
        return Vec::new();
    }

    let forward = nearest_neighbours(reference, moving);
    let backward = nearest_neighbours(moving, reference);
    let ratio_sq = ratio * ratio;

    forward
        .iter()
        .enumerate()
        .filter_map(|(r, n)| {
            if n.best == usize::MAX || backward[n.best].best != r {
                return None;
            }
            if n.best_dist >= ratio_sq * n.second_dist {
                return None;
            }
            Some(FeatureMatch {
                reference: r,
                moving: n.best,
                distance: n.best_dist,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_rows(rows: &[[f32; 4]]) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((rows.len(), 4));
        for (i, r) in rows.iter().enumerate() {
            let norm = r.iter().map(|v| v * v).sum::<f32>().sqrt();
            for (j, v) in r.iter().enumerate() {
                out[[i, j]] = v / norm;
            }
        }
        out
    }

    #[test]
    fn matches_permuted_descriptors() {
        let reference = unit_rows(&[[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]]);
        let moving = unit_rows(&[[0.0, 0.0, 1.0, 0.1], [1.0, 0.1, 0.0, 0.0], [0.0, 1.0, 0.1, 0.0]]);
        let matches = match_descriptors(&reference, &moving, 0.8);
        let pairs: Vec<(usize, usize)> = matches.iter().map(|m| (m.reference, m.moving)).collect();
        assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 0)]);
    }

    #[test]
    fn ambiguous_match_fails_ratio_test() {
        let reference = unit_rows(&[[1.0, 1.0, 0.0, 0.0]]);
        let moving = unit_rows(&[[1.0, 0.9, 0.0, 0.0], [0.9, 1.0, 0.0, 0.0]]);
        assert!(match_descriptors(&reference, &moving, 0.8).is_empty());
    }
}
