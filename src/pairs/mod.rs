// src/pairs/mod.rs

//! Pair extraction and congruent-set search.
//!
//! For each base edge the driver asks for every ordered point pair in the
//! sampled moving cloud whose length matches the edge within tolerance and
//! whose attributes pass the point filter. Two interchangeable strategies
//! produce those pair lists: an exhaustive quadratic scan and the
//! accelerated unit-cube scheme. The strategies are tagged variants rather
//! than trait objects so the hot loops stay monomorphic.
//!
//! The congruent-set search itself is shared: given the two pair lists and
//! the base invariants it intersects the interpolated diagonal points
//! through a transient k-d tree, yielding every candidate quadruple whose
//! diagonals cross at the same parametric ratios as the base.

mod accel;
mod brute;
mod filter;

pub(crate) use filter::PairFilter;

use crate::core::{Point3D, Scalar};
use crate::kdtree::KdTree;

use accel::AccelPairExtractor;

/// Congruent-set search strategy, chosen at matcher construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exhaustive O(n²) pair scan.
    Brute4pcs,
    /// Accelerated pair extraction over a normalized unit cube.
    Super4pcs,
}

/// Ordered index pairs into the sampled moving cloud, one list per base edge.
pub(crate) type PairList = Vec<(usize, usize)>;

/// A candidate congruent quadruple, carrying the base's role assignment.
pub(crate) type Quad = [usize; 4];

/// Strategy-tagged pair finder owned by the driver.
#[derive(Debug, Clone)]
pub(crate) enum PairFinder {
    Brute,
    Accelerated(Box<AccelPairExtractor>),
}

impl PairFinder {
    pub(crate) fn new(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Brute4pcs => PairFinder::Brute,
            Strategy::Super4pcs => PairFinder::Accelerated(Box::new(AccelPairExtractor::new())),
        }
    }

    /// One-time (per `init`) preparation against the sampled moving cloud.
    pub(crate) fn initialize(&mut self, q_points: &[Point3D]) {
        if let PairFinder::Accelerated(extractor) = self {
            extractor.initialize(q_points);
        }
    }

    /// Emits every ordered pair `(i, j)` of `q_points` whose distance
    /// matches `pair_distance` within `pair_distance_epsilon` and which the
    /// filter accepts for the base edge `(base_point1, base_point2)`.
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
        pairs: &mut PairList,
    ) {
        match self {
            PairFinder::Brute => brute::extract_pairs(
                q_points,
                filter,
                pair_distance,
                pair_normals_angle,
                pair_distance_epsilon,
                base_point1,
                base_point2,
                pairs,
            ),
            PairFinder::Accelerated(extractor) => extractor.extract_pairs(
                q_points,
                filter,
                pair_distance,
                pair_normals_angle,
                pair_distance_epsilon,
                base_point1,
                base_point2,
                pairs,
            ),
        }
    }
}

/// Finds every quadruple in the sampled moving cloud congruent to the base.
///
/// For each pair of `first_pairs` the point interpolated at `invariant1`
/// along the pair segment goes into a transient tree; each pair of
/// `second_pairs` then range-queries its `invariant2` interpolation with
/// squared radius `distance_threshold2`. A hit means the two diagonals
/// cross at the base's parametric ratios, and the quad is emitted with the
/// tree hit mapped back to its originating first pair. Emission follows
/// query traversal order and is not deduplicated.
///
/// The tree is rebuilt per base; callers hand in a reusable instance so
/// its buffers survive across trials. `distance_threshold1` is accepted
/// for interface symmetry but presently unused: the single tree bound by
/// `distance_threshold2` suffices.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_congruent_quadrilaterals(
    q_points: &[Point3D],
    invariant1: Scalar,
    invariant2: Scalar,
    distance_threshold1: Scalar,
    distance_threshold2: Scalar,
    first_pairs: &PairList,
    second_pairs: &PairList,
    tree: &mut KdTree,
    quadrilaterals: &mut Vec<Quad>,
) {
    let _ = distance_threshold1;

    quadrilaterals.clear();
    if first_pairs.is_empty() || second_pairs.is_empty() {
        return;
    }

    tree.clear();
    for &(i1, j1) in first_pairs {
        let p1 = q_points[i1].pos();
        let p2 = q_points[j1].pos();
        tree.add(p1 + invariant1 * (p2 - p1));
    }
    tree.finalize();

    for &(i2, j2) in second_pairs {
        let p1 = q_points[i2].pos();
        let p2 = q_points[j2].pos();
        let query = p1 + invariant2 * (p2 - p1);

        tree.range(&query, distance_threshold2, |id| {
            let (f1, f2) = first_pairs[id];
            quadrilaterals.push([f1, f2, i2, j2]);
        });
    }
}
