// src/pairs/filter.rs

use crate::core::{MatchOptions, Point3D, Scalar};

/// Stateless per-pair predicate shared by both extraction strategies.
///
/// Given a candidate pair `(p, q)` and a base edge `(a, b)`, decides which
/// orientations of the pair are compatible with that edge. The two flags
/// encode the `(i, j)` and `(j, i)` orderings respectively: a single
/// unordered pair may match the edge in one direction, both, or neither.
///
/// Checks run in a fixed order, each only when its bound is positive:
/// normal-angle agreement, endpoint colour distance, translation cap, and
/// the segment-angle restriction.
pub(crate) struct PairFilter<'a> {
    options: &'a MatchOptions,
    base: &'a [Point3D; 4],
}

impl<'a> PairFilter<'a> {
    pub(crate) fn new(options: &'a MatchOptions, base: &'a [Point3D; 4]) -> Self {
        Self { options, base }
    }

    /// Evaluates the filter for the pair `(p, q)` against base edge
    /// `(base_point1, base_point2)`. `pair_normals_angle` is the
    /// normal-difference magnitude of that base edge, `None` when either
    /// base endpoint carries no normal.
    pub(crate) fn test(
        &self,
        p: &Point3D,
        q: &Point3D,
        pair_normals_angle: Option<Scalar>,
        base_point1: usize,
        base_point2: usize,
    ) -> (bool, bool) {
        let rejected = (false, false);

        // Angle between the pair normals must be close to the angle between
        // the base normals. This is checked independently of the full
        // rotation, which segment matching alone does not determine, and
        // agnostic of normal orientation.
        if self.options.max_normal_difference > 0.0 {
            if let (Some(np), Some(nq), Some(base_angle)) =
                (p.normal(), q.normal(), pair_normals_angle)
            {
                let norm_threshold =
                    0.5 * self.options.max_normal_difference * std::f32::consts::PI / 180.0;
                let first_normal_angle = (nq - np).norm();
                let second_normal_angle = (nq + np).norm();
                // Take the smaller normal distance.
                let first_norm_distance = Scalar::min(
                    (first_normal_angle - base_angle).abs(),
                    (second_normal_angle - base_angle).abs(),
                );
                if first_norm_distance > norm_threshold {
                    return rejected;
                }
            }
        }

        if self.options.max_color_distance > 0.0 {
            if let (Some(cp), Some(cq), Some(ca), Some(cb)) = (
                p.rgb(),
                q.rgb(),
                self.base[base_point1].rgb(),
                self.base[base_point2].rgb(),
            ) {
                let color_good = (cp - ca).norm() < self.options.max_color_distance
                    && (cq - cb).norm() < self.options.max_color_distance;
                if !color_good {
                    return rejected;
                }
            }
        }

        if self.options.max_translation_distance > 0.0 {
            let dist_good = (p.pos() - self.base[base_point1].pos()).norm()
                < self.options.max_translation_distance
                && (q.pos() - self.base[base_point2].pos()).norm()
                    < self.options.max_translation_distance;
            if !dist_good {
                return rejected;
            }
        }

        if self.options.max_angle > 0.0 {
            let max_angle_rad = self.options.max_angle * std::f32::consts::PI / 180.0;
            let segment1 = (self.base[base_point2].pos() - self.base[base_point1].pos()).normalize();
            let segment2 = (q.pos() - p.pos()).normalize();
            // Clamp before acos: unit dots can drift just past 1.
            let forward = segment1.dot(&segment2).clamp(-1.0, 1.0).acos();
            let backward = (-segment1.dot(&segment2)).clamp(-1.0, 1.0).acos();
            (backward <= max_angle_rad, forward <= max_angle_rad)
        } else {
            (true, true)
        }
    }
}
