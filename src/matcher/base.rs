// src/matcher/base.rs

//! Base selection: wide random triangles, the near-planar fourth point,
//! and the canonical reordering that fixes the base's invariants.

use rand::RngExt;

use super::Matcher;
use crate::align::dist_segment_to_segment;
use crate::core::{Scalar, NUMBER_OF_DIAMETER_TRIALS};

/// Minimum base edge length as a fraction of the maximum base diameter.
const BASE_TOO_SMALL: Scalar = 0.2;

impl Matcher {
    /// Draws one random anchor and retains, over a fixed number of probes,
    /// the widest triangle whose edges stay under the base diameter cap.
    pub(crate) fn select_random_triangle(&mut self) -> Option<(usize, usize, usize)> {
        let number_of_points = self.sampled_p.len();
        if number_of_points == 0 {
            return None;
        }

        // Pick the first point at random.
        let first_point = self.rng.random_range(0..number_of_points);
        let sq_max_base_diameter = self.max_base_diameter * self.max_base_diameter;

        // Try fixed number of times retaining the best other two.
        let mut best_wide: Scalar = 0.0;
        let mut best: Option<(usize, usize, usize)> = None;
        for _ in 0..NUMBER_OF_DIAMETER_TRIALS {
            let second_point = self.rng.random_range(0..number_of_points);
            let third_point = self.rng.random_range(0..number_of_points);
            let u = self.sampled_p[second_point].pos() - self.sampled_p[first_point].pos();
            let w = self.sampled_p[third_point].pos() - self.sampled_p[first_point].pos();

            // We try to have wide triangles but still not too large.
            let how_wide = u.cross(&w).norm();
            if how_wide > best_wide
                && u.norm_squared() < sq_max_base_diameter
                && w.norm_squared() < sq_max_base_diameter
            {
                best_wide = how_wide;
                best = Some((first_point, second_point, third_point));
            }
        }
        best
    }

    /// Selects a wide, near-planar quadrilateral from the sampled P and
    /// returns its invariants together with the four point indices in
    /// canonical order. The canonical coordinates land in `base_3d`.
    pub(crate) fn select_quadrilateral(&mut self) -> Option<(Scalar, Scalar, [usize; 4])> {
        for _ in 0..NUMBER_OF_DIAMETER_TRIALS {
            // Select a triangle if possible, otherwise fail the trial.
            let (base1, base2, base3) = self.select_random_triangle()?;

            self.base_3d[0] = self.sampled_p[base1];
            self.base_3d[1] = self.sampled_p[base2];
            self.base_3d[2] = self.sampled_p[base3];

            // The 4th point will be one that is close to planar with the
            // other three while still not too close to them. The plane
            // algebra runs in double precision: the cofactor sums cancel
            // heavily for flat triangles.
            let x1 = self.base_3d[0].pos().x as f64;
            let y1 = self.base_3d[0].pos().y as f64;
            let z1 = self.base_3d[0].pos().z as f64;
            let x2 = self.base_3d[1].pos().x as f64;
            let y2 = self.base_3d[1].pos().y as f64;
            let z2 = self.base_3d[1].pos().z as f64;
            let x3 = self.base_3d[2].pos().x as f64;
            let y3 = self.base_3d[2].pos().y as f64;
            let z3 = self.base_3d[2].pos().z as f64;

            // Fit a plane A*x + B*y + C*z = 1.
            let denom = -x3 * y2 * z1 + x2 * y3 * z1 + x3 * y1 * z2 - x1 * y3 * z2
                - x2 * y1 * z3
                + x1 * y2 * z3;

            if denom != 0.0 {
                let a =
                    (-y2 * z1 + y3 * z1 + y1 * z2 - y3 * z2 - y1 * z3 + y2 * z3) / denom;
                let b =
                    (x2 * z1 - x3 * z1 - x1 * z2 + x3 * z2 + x1 * z3 - x2 * z3) / denom;
                let c =
                    (-x2 * y1 + x3 * y1 + x1 * y2 - x3 * y2 - x1 * y3 + x2 * y3) / denom;

                let too_small = (self.max_base_diameter * BASE_TOO_SMALL).powi(2);
                let mut base4: Option<usize> = None;
                let mut best_distance = f64::MAX;

                // Go over all points in P.
                for (i, point) in self.sampled_p.iter().enumerate() {
                    let not_too_close = (point.pos() - self.sampled_p[base1].pos())
                        .norm_squared()
                        >= too_small
                        && (point.pos() - self.sampled_p[base2].pos()).norm_squared()
                            >= too_small
                        && (point.pos() - self.sampled_p[base3].pos()).norm_squared()
                            >= too_small;
                    if not_too_close {
                        let distance = (a * point.pos().x as f64
                            + b * point.pos().y as f64
                            + c * point.pos().z as f64
                            - 1.0)
                            .abs();
                        // Search for the most planar.
                        if distance < best_distance {
                            best_distance = distance;
                            base4 = Some(i);
                        }
                    }
                }

                // If we have a good one we can quit.
                if let Some(base4) = base4 {
                    self.base_3d[3] = self.sampled_p[base4];
                    if let Some(found) = self.try_quadrilateral([base1, base2, base3, base4]) {
                        return Some(found);
                    }
                }
            }
        }

        // We failed to find a good enough base.
        None
    }

    /// Takes the quadrilateral held in `base_3d`, computes the robust
    /// intersection of its two diagonals (the lines need not actually
    /// intersect) and reorders points and indices so the first two points
    /// span the diagonal realising the closest approach. Returns the two
    /// invariants and the reordered indices.
    pub(crate) fn try_quadrilateral(
        &mut self,
        ids: [usize; 4],
    ) -> Option<(Scalar, Scalar, [usize; 4])> {
        let mut min_distance = Scalar::MAX;
        let mut best: Option<([usize; 4], Scalar, Scalar)> = None;

        for i in 0..4 {
            for j in 0..4 {
                if i == j {
                    continue;
                }
                let mut k = 0;
                while k == i || k == j {
                    k += 1;
                }
                let mut l = 0;
                while l == i || l == j || l == k {
                    l += 1;
                }
                // Closest points on both segments, the corresponding
                // invariants and the distance between them.
                let (segment_distance, local_invariant1, local_invariant2) =
                    dist_segment_to_segment(
                        self.base_3d[i].pos(),
                        self.base_3d[j].pos(),
                        self.base_3d[k].pos(),
                        self.base_3d[l].pos(),
                    );
                // Retain the smallest distance and the best order so far.
                if segment_distance < min_distance {
                    min_distance = segment_distance;
                    best = Some(([i, j, k, l], local_invariant1, local_invariant2));
                }
            }
        }

        let (order, invariant1, invariant2) = best?;

        let tmp = self.base_3d;
        for (slot, &source) in order.iter().enumerate() {
            self.base_3d[slot] = tmp[source];
        }

        Some((
            invariant1,
            invariant2,
            [ids[order[0]], ids[order[1]], ids[order[2]], ids[order[3]]],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MatchOptions, Point3D};
    use crate::pairs::Strategy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn matcher_over(points: Vec<Point3D>, max_base_diameter: Scalar, seed: u64) -> Matcher {
        let mut matcher = Matcher::new(MatchOptions::new(), Strategy::Brute4pcs).unwrap();
        matcher.sampled_p = points;
        matcher.max_base_diameter = max_base_diameter;
        matcher.rng = StdRng::seed_from_u64(seed);
        matcher
    }

    fn random_cloud(n: usize, seed: u64) -> Vec<Point3D> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Point3D::new(
                    rng.random::<Scalar>() * 2.0 - 1.0,
                    rng.random::<Scalar>() * 2.0 - 1.0,
                    rng.random::<Scalar>() * 2.0 - 1.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_select_random_triangle_respects_diameter_cap() {
        let mut matcher = matcher_over(random_cloud(100, 3), 1.0, 5);
        for _ in 0..20 {
            if let Some((a, b, c)) = matcher.select_random_triangle() {
                let u = matcher.sampled_p[b].pos() - matcher.sampled_p[a].pos();
                let w = matcher.sampled_p[c].pos() - matcher.sampled_p[a].pos();
                assert!(u.norm_squared() < 1.0);
                assert!(w.norm_squared() < 1.0);
                assert!(u.cross(&w).norm() > 0.0, "retained triangle is wide");
            }
        }
    }

    #[test]
    fn test_select_quadrilateral_produces_valid_base() {
        let mut matcher = matcher_over(random_cloud(200, 7), 3.5, 11);
        let (invariant1, invariant2, ids) = matcher
            .select_quadrilateral()
            .expect("a dense random cloud always yields a base");

        assert!((0.0..=1.0).contains(&invariant1), "inv1 {}", invariant1);
        assert!((0.0..=1.0).contains(&invariant2), "inv2 {}", invariant2);

        // Four distinct indices, and the canonical coordinates match them.
        let mut sorted = ids;
        sorted.sort_unstable();
        sorted.windows(2).for_each(|w| assert_ne!(w[0], w[1]));
        for (slot, &id) in ids.iter().enumerate() {
            assert_eq!(matcher.base_3d[slot], matcher.sampled_p[id]);
        }
    }

    #[test]
    fn test_try_quadrilateral_is_stable_on_canonical_base() {
        // A planar quad already in canonical diagonal order.
        let points = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(2.0, 2.0, 0.0),
            Point3D::new(2.0, 0.0, 0.0),
            Point3D::new(0.0, 2.0, 0.0),
        ];
        let mut matcher = matcher_over(points.clone(), 10.0, 1);
        matcher.base_3d = [points[0], points[1], points[2], points[3]];
        let (invariant1, invariant2, _) = matcher.try_quadrilateral([0, 1, 2, 3]).unwrap();

        // Re-running on the canonicalized base must reproduce the invariants.
        let first_order = matcher.base_3d;
        let ids2: [usize; 4] = [0, 1, 2, 3];
        let (repeat1, repeat2, _) = matcher.try_quadrilateral(ids2).unwrap();
        assert!((invariant1 - repeat1).abs() < 1e-6);
        assert!((invariant2 - repeat2).abs() < 1e-6);
        // The diagonals of a crossing quad intersect at interior ratios.
        assert!(invariant1 > 0.0 && invariant1 < 1.0);
        assert!(invariant2 > 0.0 && invariant2 < 1.0);
        // And the canonical order itself is a fixed point.
        assert_eq!(first_order, matcher.base_3d);
    }
}
