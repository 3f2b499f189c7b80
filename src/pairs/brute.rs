// src/pairs/brute.rs

use super::filter::PairFilter;
use crate::core::{Point3D, Scalar};

/// Exhaustive pair scan over the sampled cloud.
///
/// Visits every unordered pair once (`j < i`), applies the distance window
/// and the filter, and emits the accepted orientations. Quadratic in the
/// sample size, which the accelerated extractor avoids; kept both as the
/// reference behaviour and for small working sets where it wins outright.
#[allow(clippy::too_many_arguments)]
pub(crate) fn extract_pairs(
    q_points: &[Point3D],
    filter: &PairFilter<'_>,
    pair_distance: Scalar,
    pair_normals_angle: Option<Scalar>,
    pair_distance_epsilon: Scalar,
    base_point1: usize,
    base_point2: usize,
    pairs: &mut Vec<(usize, usize)>,
) {
    pairs.clear();
    pairs.reserve(2 * q_points.len());

    for j in 0..q_points.len() {
        let p = &q_points[j];
        for i in (j + 1)..q_points.len() {
            let q = &q_points[i];

            #[cfg(not(feature = "multiscale"))]
            {
                let distance = (q.pos() - p.pos()).norm();
                if (distance - pair_distance).abs() > pair_distance_epsilon {
                    continue;
                }
            }
            #[cfg(feature = "multiscale")]
            let _ = (pair_distance, pair_distance_epsilon);

            let (accept_ij, accept_ji) =
                filter.test(p, q, pair_normals_angle, base_point1, base_point2);
            if accept_ij {
                pairs.push((i, j));
            }
            if accept_ji {
                pairs.push((j, i));
            }
        }
    }
}
