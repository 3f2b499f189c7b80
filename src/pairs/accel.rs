// src/pairs/accel.rs

use super::filter::PairFilter;
use crate::core::{Point3D, Scalar, VectorType};
use crate::kdtree::KdTree;

/// Margin added to the bounding-box extent so that no normalized
/// coordinate lands exactly on 1.
const UNIT_CUBE_MARGIN: Scalar = 1e-3;

/// A sphere primitive in normalized coordinates. One is held per sampled
/// point; their shared radius is retuned for every base edge.
#[derive(Debug, Clone, Copy)]
struct HyperSphere {
    center: VectorType,
    radius: Scalar,
}

/// Accelerated pair extraction.
///
/// The sampled cloud is mapped once into the unit cube (translate by the
/// bounding-box centre, scale by the largest side plus a small margin) and
/// indexed there. Pair extraction for a base edge of length `d` then
/// becomes one radius query per sphere primitive instead of a full pair
/// scan: candidates fall out of the index in O(m + k) for k reported
/// indices, and each candidate still runs through the same distance-window
/// and filter path as the exhaustive scan.
#[derive(Debug, Clone)]
pub(crate) struct AccelPairExtractor {
    /// Normalized copies of the sampled positions, same order as the cloud.
    points: Vec<VectorType>,
    primitives: Vec<HyperSphere>,
    tree: KdTree,
    gcenter: VectorType,
    ratio: Scalar,
}

impl AccelPairExtractor {
    pub(crate) fn new() -> Self {
        Self {
            points: Vec::new(),
            primitives: Vec::new(),
            tree: KdTree::default(),
            gcenter: VectorType::zeros(),
            ratio: 1.0,
        }
    }

    /// Normalizes the cloud and builds the unit-cube index. Must be called
    /// before any extraction, and again whenever the cloud changes.
    pub(crate) fn initialize(&mut self, q_points: &[Point3D]) {
        self.points.clear();
        self.primitives.clear();

        let mut min = VectorType::repeat(Scalar::INFINITY);
        let mut max = VectorType::repeat(Scalar::NEG_INFINITY);
        for p in q_points {
            min = min.inf(p.pos());
            max = max.sup(p.pos());
        }
        if q_points.is_empty() {
            min = VectorType::zeros();
            max = VectorType::zeros();
        }

        self.gcenter = (min + max) / 2.0;
        self.ratio = (max - min).max() + UNIT_CUBE_MARGIN;

        let mut tree = KdTree::with_capacity(q_points.len());
        for p in q_points {
            let unit = self.world_to_unit(p.pos());
            self.points.push(unit);
            self.primitives.push(HyperSphere {
                center: unit,
                radius: 1.0,
            });
            tree.add(unit);
        }
        tree.finalize();
        self.tree = tree;
    }

    fn world_to_unit(&self, p: &VectorType) -> VectorType {
        (p - self.gcenter) / self.ratio + VectorType::repeat(0.5)
    }

    /// Retunes every primitive to a world-space radius.
    fn set_radius(&mut self, radius: Scalar) {
        let normalized = radius / self.ratio;
        for primitive in self.primitives.iter_mut() {
            primitive.radius = normalized;
        }
    }

    fn normalized_epsilon(&self, eps: Scalar) -> Scalar {
        eps / self.ratio
    }

    /// Emits every ordered pair matching the base edge, exactly as the
    /// exhaustive scan would, by intersecting each primitive with the
    /// unit-cube index.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn extract_pairs(
        &mut self,
        q_points: &[Point3D],
        filter: &PairFilter<'_>,
        pair_distance: Scalar,
        pair_normals_angle: Option<Scalar>,
        pair_distance_epsilon: Scalar,
        base_point1: usize,
        base_point2: usize,
        pairs: &mut Vec<(usize, usize)>,
    ) {
        debug_assert_eq!(
            self.points.len(),
            q_points.len(),
            "extractor initialized for a different cloud"
        );

        pairs.clear();
        pairs.reserve(2 * q_points.len());

        self.set_radius(pair_distance);
        let eps = self.normalized_epsilon(pair_distance_epsilon);

        for (i, primitive) in self.primitives.iter().enumerate() {
            // Slight slack so boundary pairs are never lost to the
            // normalization round-off; the window check below is exact.
            let reach = (primitive.radius + eps) * (1.0 + 1e-5);
            self.tree.range(&primitive.center, reach * reach, |j| {
                // Each unordered pair is collected from exactly one of its
                // two covering spheres.
                if i <= j {
                    return;
                }
                let p = &q_points[j];
                let q = &q_points[i];

                #[cfg(not(feature = "multiscale"))]
                {
                    let distance = (q.pos() - p.pos()).norm();
                    if (distance - pair_distance).abs() > pair_distance_epsilon {
                        return;
                    }
                }

                let (accept_ij, accept_ji) =
                    filter.test(p, q, pair_normals_angle, base_point1, base_point2);
                if accept_ij {
                    pairs.push((i, j));
                }
                if accept_ji {
                    pairs.push((j, i));
                }
            });
        }
    }
}

#[cfg(test)]
#[cfg(not(feature = "multiscale"))]
mod tests {
    use super::*;
    use crate::core::MatchOptions;
    use crate::pairs::brute;
    use rand::rngs::StdRng;
    use rand::{RngExt, SeedableRng};

    fn random_cloud(n: usize, seed: u64) -> Vec<Point3D> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Point3D::new(
                    rng.random::<Scalar>() * 4.0 - 2.0,
                    rng.random::<Scalar>() * 4.0 - 2.0,
                    rng.random::<Scalar>() * 4.0 - 2.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_agrees_with_exhaustive_scan() {
        let cloud = random_cloud(120, 23);
        let options = MatchOptions::new();
        let base = [cloud[0], cloud[1], cloud[2], cloud[3]];
        let filter = PairFilter::new(&options, &base);

        let mut extractor = AccelPairExtractor::new();
        extractor.initialize(&cloud);

        for &(d, eps) in &[(1.0, 0.05), (2.5, 0.1), (0.3, 0.02)] {
            let mut fast = Vec::new();
            extractor.extract_pairs(&cloud, &filter, d, None, eps, 0, 1, &mut fast);

            let mut slow = Vec::new();
            brute::extract_pairs(&cloud, &filter, d, None, eps, 0, 1, &mut slow);

            fast.sort_unstable();
            slow.sort_unstable();
            assert_eq!(fast, slow, "strategies disagree at d={} eps={}", d, eps);
        }
    }

    #[test]
    fn test_radius_retuning_between_edges() {
        let cloud = random_cloud(60, 29);
        let options = MatchOptions::new();
        let base = [cloud[0], cloud[1], cloud[2], cloud[3]];
        let filter = PairFilter::new(&options, &base);

        let mut extractor = AccelPairExtractor::new();
        extractor.initialize(&cloud);

        // A second extraction with a different target distance must not be
        // contaminated by the first edge's radius.
        let mut first = Vec::new();
        extractor.extract_pairs(&cloud, &filter, 2.0, None, 0.1, 0, 1, &mut first);
        let mut second = Vec::new();
        extractor.extract_pairs(&cloud, &filter, 0.5, None, 0.1, 2, 3, &mut second);

        let mut reference = Vec::new();
        brute::extract_pairs(&cloud, &filter, 0.5, None, 0.1, 2, 3, &mut reference);
        second.sort_unstable();
        reference.sort_unstable();
        assert_eq!(second, reference);
    }
}
