// src/kdtree/mod.rs

//! Static k-d tree over 3-D points.
//!
//! The tree is built once from a fixed point list (`add` then `finalize`)
//! and is immutable afterwards. It serves two query shapes: the bounded
//! nearest-neighbour lookup used by LCP verification and the mean-distance
//! estimate, and the radius visit used by the congruent-set finder. Working
//! sets are small (at most the configured sample size), so the tree favours
//! simplicity: a balanced median split stored as a permutation of the
//! insertion order, with the node of every range sitting at its midpoint.

use std::cmp::Ordering;

use crate::core::{Scalar, VectorType};

/// Balanced static k-d tree with squared-distance queries.
#[derive(Debug, Clone, Default)]
pub struct KdTree {
    /// Points in insertion order; query results index into this list.
    points: Vec<VectorType>,
    /// Permutation of `0..points.len()` arranged as an implicit tree: the
    /// node of the range `[lo, hi)` is at `(lo + hi) / 2`, split on
    /// `depth % 3`.
    order: Vec<u32>,
    finalized: bool,
}

impl KdTree {
    /// Creates an empty tree with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
            finalized: false,
        }
    }

    /// Appends a point. Only valid before [`Self::finalize`].
    pub fn add(&mut self, pos: VectorType) {
        debug_assert!(!self.finalized, "add called on a finalized tree");
        self.order.push(self.points.len() as u32);
        self.points.push(pos);
    }

    /// Balances the tree. Queries issued before this see an empty tree.
    pub fn finalize(&mut self) {
        let n = self.points.len();
        if n > 0 {
            self.balance(0, n, 0);
        }
        self.finalized = true;
    }

    /// Empties the tree while keeping its allocations, so it can be
    /// refilled with `add` and `finalize` without heap churn.
    pub fn clear(&mut self) {
        self.points.clear();
        self.order.clear();
        self.finalized = false;
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tree indexes no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn balance(&mut self, lo: usize, hi: usize, depth: usize) {
        if hi - lo <= 1 {
            return;
        }
        let axis = depth % 3;
        let mid = (lo + hi) / 2;
        let points = &self.points;
        self.order[lo..hi].select_nth_unstable_by(mid - lo, |&a, &b| {
            let va = points[a as usize][axis];
            let vb = points[b as usize][axis];
            // Positions are finite, so the partial order is total here.
            va.partial_cmp(&vb).unwrap_or(Ordering::Equal)
        });
        self.balance(lo, mid, depth + 1);
        self.balance(mid + 1, hi, depth + 1);
    }

    /// Nearest neighbour whose squared distance does not exceed
    /// `sq_radius`. Ties are broken towards the lower insertion index.
    /// Returns the insertion index and the squared distance, or `None` if
    /// no point lies in range.
    pub fn nearest_within(&self, query: &VectorType, sq_radius: Scalar) -> Option<(usize, Scalar)> {
        self.nearest_impl(query, sq_radius, None)
    }

    /// Same as [`Self::nearest_within`] but never returns `exclude`. Used
    /// for nearest-*other*-point estimates over the indexed set itself.
    pub fn nearest_within_excluding(
        &self,
        query: &VectorType,
        sq_radius: Scalar,
        exclude: usize,
    ) -> Option<(usize, Scalar)> {
        self.nearest_impl(query, sq_radius, Some(exclude))
    }

    fn nearest_impl(
        &self,
        query: &VectorType,
        sq_radius: Scalar,
        exclude: Option<usize>,
    ) -> Option<(usize, Scalar)> {
        debug_assert!(self.finalized, "query on a tree that was not finalized");
        let mut best: Option<(usize, Scalar)> = None;
        if !self.points.is_empty() {
            self.nearest_recurse(query, sq_radius, exclude, 0, self.points.len(), 0, &mut best);
        }
        best
    }

    fn nearest_recurse(
        &self,
        query: &VectorType,
        sq_radius: Scalar,
        exclude: Option<usize>,
        lo: usize,
        hi: usize,
        depth: usize,
        best: &mut Option<(usize, Scalar)>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = (lo + hi) / 2;
        let idx = self.order[mid] as usize;
        let node = &self.points[idx];

        if Some(idx) != exclude {
            let sq_dist = (node - query).norm_squared();
            if sq_dist <= sq_radius {
                let replace = match *best {
                    None => true,
                    Some((bi, bd)) => sq_dist < bd || (sq_dist == bd && idx < bi),
                };
                if replace {
                    *best = Some((idx, sq_dist));
                }
            }
        }

        let axis = depth % 3;
        let diff = query[axis] - node[axis];
        let (near, far) = if diff < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.nearest_recurse(query, sq_radius, exclude, near.0, near.1, depth + 1, best);

        // The far side can only hold a winner if the splitting plane is
        // within the current bound; equality stays in so an equidistant
        // lower index is never pruned away.
        let bound = best.map_or(sq_radius, |(_, bd)| bd);
        if diff * diff <= bound {
            self.nearest_recurse(query, sq_radius, exclude, far.0, far.1, depth + 1, best);
        }
    }

    /// Invokes `visit(index)` once for every point whose squared distance
    /// to `query` is at most `sq_radius`. Visit order is unspecified.
    pub fn range<F: FnMut(usize)>(&self, query: &VectorType, sq_radius: Scalar, mut visit: F) {
        debug_assert!(self.finalized, "query on a tree that was not finalized");
        if !self.points.is_empty() {
            self.range_recurse(query, sq_radius, 0, self.points.len(), 0, &mut visit);
        }
    }

    fn range_recurse<F: FnMut(usize)>(
        &self,
        query: &VectorType,
        sq_radius: Scalar,
        lo: usize,
        hi: usize,
        depth: usize,
        visit: &mut F,
    ) {
        if lo >= hi {
            return;
        }
        let mid = (lo + hi) / 2;
        let idx = self.order[mid] as usize;
        let node = &self.points[idx];

        if (node - query).norm_squared() <= sq_radius {
            visit(idx);
        }

        let axis = depth % 3;
        let diff = query[axis] - node[axis];
        let (near, far) = if diff < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.range_recurse(query, sq_radius, near.0, near.1, depth + 1, visit);
        if diff * diff <= sq_radius {
            self.range_recurse(query, sq_radius, far.0, far.1, depth + 1, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngExt, SeedableRng};

    fn random_cloud(n: usize, seed: u64) -> Vec<VectorType> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                VectorType::new(
                    rng.random::<Scalar>() * 2.0 - 1.0,
                    rng.random::<Scalar>() * 2.0 - 1.0,
                    rng.random::<Scalar>() * 2.0 - 1.0,
                )
            })
            .collect()
    }

    fn build(points: &[VectorType]) -> KdTree {
        let mut tree = KdTree::with_capacity(points.len());
        for p in points {
            tree.add(*p);
        }
        tree.finalize();
        tree
    }

    fn brute_nearest(
        points: &[VectorType],
        query: &VectorType,
        sq_radius: Scalar,
    ) -> Option<(usize, Scalar)> {
        let mut best: Option<(usize, Scalar)> = None;
        for (i, p) in points.iter().enumerate() {
            let d = (p - query).norm_squared();
            if d <= sq_radius && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let points = random_cloud(300, 7);
        let tree = build(&points);
        let queries = random_cloud(50, 8);
        for q in &queries {
            let got = tree.nearest_within(q, 0.25);
            let want = brute_nearest(&points, q, 0.25);
            match (got, want) {
                (None, None) => {}
                (Some((gi, gd)), Some((wi, wd))) => {
                    assert_eq!(gi, wi, "index mismatch at query {:?}", q);
                    assert!((gd - wd).abs() < 1e-12);
                }
                other => panic!("disagreement at query {:?}: {:?}", q, other),
            }
        }
    }

    #[test]
    fn test_nearest_out_of_range_is_none() {
        let points = vec![VectorType::new(10.0, 0.0, 0.0)];
        let tree = build(&points);
        assert!(
            tree.nearest_within(&VectorType::zeros(), 1.0).is_none(),
            "nothing within radius 1"
        );
        let hit = tree.nearest_within(&VectorType::zeros(), 100.0);
        assert_eq!(hit, Some((0, 100.0)), "boundary distance is inclusive");
    }

    #[test]
    fn test_nearest_tie_breaks_to_lower_index() {
        // Two points symmetric about the query.
        let points = vec![
            VectorType::new(1.0, 0.0, 0.0),
            VectorType::new(-1.0, 0.0, 0.0),
        ];
        let tree = build(&points);
        let (idx, _) = tree.nearest_within(&VectorType::zeros(), 4.0).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_nearest_excluding_skips_self() {
        let points = random_cloud(64, 11);
        let tree = build(&points);
        for (i, p) in points.iter().enumerate() {
            let (idx, sq) = tree
                .nearest_within_excluding(p, Scalar::INFINITY, i)
                .expect("another point always exists");
            assert_ne!(idx, i);
            assert!(sq > 0.0 || points[idx] == points[i]);
        }
    }

    #[test]
    fn test_range_visits_exactly_the_ball() {
        let points = random_cloud(200, 13);
        let tree = build(&points);
        let query = VectorType::new(0.1, -0.2, 0.3);
        let sq_radius = 0.4;

        let mut visited = Vec::new();
        tree.range(&query, sq_radius, |i| visited.push(i));
        visited.sort_unstable();

        let expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| (*p - query).norm_squared() <= sq_radius)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(visited, expected);
    }

    #[test]
    fn test_deterministic_for_equal_input() {
        let points = random_cloud(128, 17);
        let a = build(&points);
        let b = build(&points);
        let query = VectorType::zeros();
        assert_eq!(
            a.nearest_within(&query, 1.0),
            b.nearest_within(&query, 1.0)
        );
        let mut va = Vec::new();
        let mut vb = Vec::new();
        a.range(&query, 0.5, |i| va.push(i));
        b.range(&query, 0.5, |i| vb.push(i));
        assert_eq!(va, vb);
    }
}
