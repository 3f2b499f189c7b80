// src/matcher/mod.rs

//! The RANSAC registration driver.
//!
//! This module owns the whole pipeline: it samples and centres the two
//! clouds, builds the spatial index over the reference, estimates the
//! trial budget from the overlap prior, and then repeatedly draws a wide
//! near-planar base from P, collects congruent candidate quads from Q and
//! scores each candidate's rigid fit by its largest common pointset. The
//! best transform survives; the caller's cloud is rewritten through it at
//! the end.
//!
//! Candidate evaluation within one trial is data-parallel; everything the
//! workers read is frozen for the duration of the loop and the best-state
//! commit is serialised through a single lock.

mod base;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngExt, SeedableRng};
use rayon::prelude::*;

use crate::align::compute_rigid_transformation;
use crate::core::{
    centroid, MatchOptions, MatrixType, Point3D, RegistrationError, Scalar, VectorType,
    DIAMETER_FRACTION, DISTANCE_FACTOR, LARGE_NUMBER, MIN_NUMBER_OF_TRIALS,
    NUMBER_OF_DIAMETER_TRIALS, SMALL_ERROR,
};
use crate::kdtree::KdTree;
use crate::pairs::{find_congruent_quadrilaterals, PairFilter, PairFinder, PairList, Quad, Strategy};
use crate::sampling::Sampler;
use crate::visitor::ProgressVisitor;

/// Winning state tracked across candidate evaluations.
struct BestCandidate {
    lcp: Scalar,
    transform: MatrixType,
    base: [usize; 4],
    congruent: Quad,
    qcentroid1: VectorType,
    qcentroid2: VectorType,
}

/// Registration driver matching a moving cloud Q onto a reference cloud P.
///
/// A `Matcher` is cheap to construct and owns all working state: the
/// down-sampled centred clouds, the k-d tree over the reference, the
/// seeded random generator and the best transform found so far. One
/// instance can be reused across runs; every [`Self::init`] resets it.
pub struct Matcher {
    options: MatchOptions,
    rng: StdRng,
    finder: PairFinder,

    number_of_trials: usize,
    current_trial: usize,
    max_base_diameter: Scalar,
    p_diameter: Scalar,
    p_mean_distance: Scalar,

    best_lcp: Scalar,
    transform: MatrixType,
    base: [usize; 4],
    current_congruent: [usize; 4],
    qcentroid1: VectorType,
    qcentroid2: VectorType,

    centroid_p: VectorType,
    centroid_q: VectorType,
    base_3d: [Point3D; 4],
    sampled_p: Vec<Point3D>,
    sampled_q: Vec<Point3D>,
    q_copy: Vec<Point3D>,
    kd_tree: KdTree,
    /// Scratch tree rebuilt by the congruent-set search every trial; owned
    /// here so its buffers are reused instead of reallocated.
    congruent_tree: KdTree,
}

impl Matcher {
    /// Creates a driver for the given options and congruent-set strategy.
    ///
    /// # Returns
    /// * `Ok(Matcher)` ready for [`Self::compute_transformation`].
    /// * `Err(RegistrationError)` if the non-optional options are invalid.
    pub fn new(options: MatchOptions, strategy: Strategy) -> Result<Self, RegistrationError> {
        options.validate()?;
        let rng = StdRng::seed_from_u64(options.random_seed);
        Ok(Self {
            rng,
            finder: PairFinder::new(strategy),
            number_of_trials: 0,
            current_trial: 0,
            max_base_diameter: -1.0,
            p_diameter: 0.0,
            p_mean_distance: 1.0,
            best_lcp: 0.0,
            transform: MatrixType::identity(),
            base: [0; 4],
            current_congruent: [0; 4],
            qcentroid1: VectorType::zeros(),
            qcentroid2: VectorType::zeros(),
            centroid_p: VectorType::zeros(),
            centroid_q: VectorType::zeros(),
            base_3d: [Point3D::new(0.0, 0.0, 0.0); 4],
            sampled_p: Vec::new(),
            sampled_q: Vec::new(),
            q_copy: Vec::new(),
            kd_tree: KdTree::default(),
            congruent_tree: KdTree::default(),
            options,
        })
    }

    /// Computes the best transformation mapping `q` onto `p`.
    ///
    /// `transformation` exits as the best homogeneous transform found (its
    /// incoming value is the customary identity guess and is not consumed);
    /// `q` is rewritten through that transform when any trial improved on
    /// the initial alignment.
    ///
    /// # Returns
    /// The achieved LCP in `[0, 1]`, or [`LARGE_NUMBER`] for degenerate
    /// input (either cloud empty), in which case no state is mutated.
    pub fn compute_transformation<S: Sampler, V: ProgressVisitor + Sync>(
        &mut self,
        p: &[Point3D],
        q: &mut Vec<Point3D>,
        transformation: &mut MatrixType,
        sampler: &S,
        visitor: &V,
    ) -> Scalar {
        if p.is_empty() || q.is_empty() {
            return LARGE_NUMBER;
        }

        self.init(p, q, sampler);

        if self.best_lcp != 1.0 {
            self.perform_n_steps(self.number_of_trials, transformation, q, visitor);
        }

        self.best_lcp
    }

    /// Prepares a run: samples and centres both clouds, builds the index,
    /// estimates the diameter, the mean sample distance and the trial
    /// budget, and scores the identity alignment.
    ///
    /// Reseeds the driver generator from `options.random_seed`, so two
    /// calls with equal inputs produce identical sampled clouds and an
    /// identical initial LCP.
    pub fn init<S: Sampler>(&mut self, p: &[Point3D], q: &[Point3D], sampler: &S) {
        if p.is_empty() || q.is_empty() {
            log::debug!("empty input cloud: driver left in reset state");
            self.sampled_p.clear();
            self.sampled_q.clear();
            self.q_copy.clear();
            self.number_of_trials = 0;
            self.current_trial = 0;
            self.best_lcp = 0.0;
            self.transform = MatrixType::identity();
            return;
        }

        self.rng = StdRng::seed_from_u64(self.options.random_seed);

        self.centroid_p = VectorType::zeros();
        self.centroid_q = VectorType::zeros();

        // prepare P
        self.sampled_p = if p.len() > self.options.sample_size {
            sampler.sample(p, &self.options)
        } else {
            log::debug!("(P) More samples requested than available: use whole cloud");
            p.to_vec()
        };

        // prepare Q
        self.sampled_q = if q.len() > self.options.sample_size {
            let mut uniform_q = sampler.sample(q, &self.options);
            uniform_q.shuffle(&mut self.rng);
            uniform_q.truncate(self.options.sample_size);
            uniform_q
        } else {
            log::debug!("(Q) More samples requested than available: use whole cloud");
            q.to_vec()
        };

        // center points around centroids
        self.centroid_p = centroid(&self.sampled_p);
        for point in self.sampled_p.iter_mut() {
            point.set_pos(point.pos() - self.centroid_p);
        }
        self.centroid_q = centroid(&self.sampled_q);
        for point in self.sampled_q.iter_mut() {
            point.set_pos(point.pos() - self.centroid_q);
        }

        let mut kd_tree = KdTree::with_capacity(self.sampled_p.len());
        for point in &self.sampled_p {
            kd_tree.add(*point.pos());
        }
        kd_tree.finalize();
        self.kd_tree = kd_tree;

        // Approximate diameter from random probes. Far from guaranteed
        // tight, but good enough on densely sampled objects.
        self.p_diameter = 0.0;
        for _ in 0..NUMBER_OF_DIAMETER_TRIALS {
            let at = self.rng.random_range(0..self.sampled_q.len());
            let bt = self.rng.random_range(0..self.sampled_q.len());
            let l = (self.sampled_q[bt].pos() - self.sampled_q[at].pos()).norm();
            if l > self.p_diameter {
                self.p_diameter = l;
            }
        }

        self.p_mean_distance = self.mean_distance();
        self.max_base_diameter = self.p_diameter;

        // RANSAC probability and number of needed trials. The base spread
        // is bounded as a fraction of the diameter, which elevates the raw
        // estimate accordingly.
        let overlap = self.options.overlap_estimation();
        let first_estimation =
            SMALL_ERROR.ln() / (1.0 - overlap.powi(MIN_NUMBER_OF_TRIALS as i32)).ln();
        self.number_of_trials = ((first_estimation * (self.p_diameter / DIAMETER_FRACTION)
            / self.max_base_diameter) as usize)
            .max(MIN_NUMBER_OF_TRIALS);

        log::debug!("norm_max_dist: {}", self.options.delta);
        self.current_trial = 0;
        self.best_lcp = 0.0;

        self.q_copy = q.to_vec();
        self.base = [0; 4];
        self.current_congruent = [0; 4];
        self.transform = MatrixType::identity();

        self.finder.initialize(&self.sampled_q);

        self.best_lcp = self.verify(&self.transform);
        log::debug!("Initial LCP: {}", self.best_lcp);
    }

    /// Runs up to `n` more RANSAC trials. Resumable: successive calls pick
    /// up where the previous one stopped, against the same `init`.
    ///
    /// # Returns
    /// `true` once the terminate threshold was reached or the whole trial
    /// budget is spent.
    pub fn perform_n_steps<V: ProgressVisitor + Sync>(
        &mut self,
        n: usize,
        transformation: &mut MatrixType,
        q: &mut Vec<Point3D>,
        visitor: &V,
    ) -> bool {
        let last_best_lcp = self.best_lcp;
        visitor.report(0.0, self.best_lcp, transformation);

        let mut ok = false;
        let t0 = Instant::now();
        for i in self.current_trial..self.current_trial + n {
            ok = self.try_one_base(visitor);

            let fraction_try = i as Scalar / self.number_of_trials as Scalar;
            let fraction_time = t0.elapsed().as_secs_f32() / self.options.max_time_seconds;
            let fraction = fraction_time.max(fraction_try);

            if visitor.needs_global_transformation() {
                *transformation = global_transform(
                    &self.transform,
                    &self.qcentroid1,
                    &self.qcentroid2,
                    &self.centroid_p,
                    &self.centroid_q,
                );
            } else {
                *transformation = self.transform;
            }
            visitor.report(fraction, self.best_lcp, transformation);

            // ok means that we already have the desired LCP.
            if ok || i > self.number_of_trials || fraction >= 0.99 || self.best_lcp == 1.0 {
                break;
            }
        }
        self.current_trial += n;

        if self.best_lcp > last_best_lcp {
            *q = self.q_copy.clone();
            *transformation = global_transform(
                &self.transform,
                &self.qcentroid1,
                &self.qcentroid2,
                &self.centroid_p,
                &self.centroid_q,
            );
            // Transforms Q by the new transformation.
            for point in q.iter_mut() {
                point.set_pos(point.transformed(transformation));
            }
        }

        ok || self.current_trial >= self.number_of_trials
    }

    /// One RANSAC trial: a base from P, its congruent candidates from Q,
    /// and the fit/verify loop over those candidates.
    fn try_one_base<V: ProgressVisitor + Sync>(&mut self, visitor: &V) -> bool {
        let (base_ids, congruent_quads) = match self.generate_congruents() {
            Some(generated) => generated,
            None => return false,
        };
        self.try_congruent_set(base_ids, &congruent_quads, visitor)
    }

    /// Selects a base and gathers every candidate quad congruent to it.
    /// `None` ends the trial early: base selection exhausted, no matching
    /// pairs, or no congruent quads.
    fn generate_congruents(&mut self) -> Option<([usize; 4], Vec<Quad>)> {
        let (invariant1, invariant2, base_ids) = self.select_quadrilateral()?;

        let distance1 = (self.base_3d[0].pos() - self.base_3d[1].pos()).norm();
        let distance2 = (self.base_3d[2].pos() - self.base_3d[3].pos()).norm();

        let normal_angle1 = base_normal_angle(&self.base_3d[0], &self.base_3d[1]);
        let normal_angle2 = base_normal_angle(&self.base_3d[2], &self.base_3d[3]);

        let pair_distance_epsilon = DISTANCE_FACTOR * self.options.delta;

        let filter = PairFilter::new(&self.options, &self.base_3d);
        let mut pairs1: PairList = Vec::new();
        let mut pairs2: PairList = Vec::new();
        self.finder.extract_pairs(
            &self.sampled_q,
            &filter,
            distance1,
            normal_angle1,
            pair_distance_epsilon,
            0,
            1,
            &mut pairs1,
        );
        self.finder.extract_pairs(
            &self.sampled_q,
            &filter,
            distance2,
            normal_angle2,
            pair_distance_epsilon,
            2,
            3,
            &mut pairs2,
        );
        log::trace!("pair extraction output: {} - {}", pairs1.len(), pairs2.len());

        if pairs1.is_empty() || pairs2.is_empty() {
            return None;
        }

        let mut congruent_quads = Vec::new();
        find_congruent_quadrilaterals(
            &self.sampled_q,
            invariant1,
            invariant2,
            pair_distance_epsilon,
            pair_distance_epsilon,
            &pairs1,
            &pairs2,
            &mut self.congruent_tree,
            &mut congruent_quads,
        );
        if congruent_quads.is_empty() {
            return None;
        }

        Some((base_ids, congruent_quads))
    }

    /// Fits and verifies every candidate quad against the current base,
    /// committing the best LCP under a single lock.
    ///
    /// # Returns
    /// `true` if the best LCP now exceeds the terminate threshold.
    fn try_congruent_set<V: ProgressVisitor + Sync>(
        &mut self,
        base_ids: [usize; 4],
        congruent_quads: &[Quad],
        visitor: &V,
    ) -> bool {
        let references = self.base_3d;
        // Centroid of the base, computed once and over the three fitted points.
        let centroid1 =
            (references[0].pos() + references[1].pos() + references[2].pos()) / 3.0;

        let max_angle = self.options.max_angle * std::f32::consts::PI / 180.0;
        let rms_bound = DISTANCE_FACTOR * self.options.delta;
        let compute_scale = cfg!(feature = "multiscale");

        let sampled_q = &self.sampled_q;
        let kd_tree = &self.kd_tree;
        let delta = self.options.delta;
        let centroid_p = self.centroid_p;
        let centroid_q = self.centroid_q;
        let needs_global = visitor.needs_global_transformation();

        let accepted = AtomicUsize::new(0);
        let best = Mutex::new(BestCandidate {
            lcp: self.best_lcp,
            transform: self.transform,
            base: self.base,
            congruent: self.current_congruent,
            qcentroid1: self.qcentroid1,
            qcentroid2: self.qcentroid2,
        });

        congruent_quads.par_iter().for_each(|quad| {
            let congruent_candidate = [
                sampled_q[quad[0]],
                sampled_q[quad[1]],
                sampled_q[quad[2]],
                sampled_q[quad[3]],
            ];
            let centroid2 = (congruent_candidate[0].pos()
                + congruent_candidate[1].pos()
                + congruent_candidate[2].pos())
                / 3.0;

            let fit = compute_rigid_transformation(
                &references,
                &congruent_candidate,
                &centroid1,
                &centroid2,
                max_angle,
                compute_scale,
            );
            let (candidate_transform, rms) = match fit {
                Some(fit) => fit,
                None => return,
            };

            // The fit gate is more tolerant than verification proper.
            if rms >= rms_bound {
                return;
            }
            accepted.fetch_add(1, Ordering::Relaxed);

            let bound = best.lock().unwrap().lcp;
            let lcp = verify_lcp(kd_tree, sampled_q, delta, bound, &candidate_transform);

            if needs_global {
                let global = global_transform(
                    &candidate_transform,
                    &centroid1,
                    &centroid2,
                    &centroid_p,
                    &centroid_q,
                );
                visitor.report(-1.0, lcp, &global);
            } else {
                visitor.report(-1.0, lcp, &candidate_transform);
            }

            let mut guard = best.lock().unwrap();
            if lcp > guard.lcp {
                *guard = BestCandidate {
                    lcp,
                    transform: candidate_transform,
                    base: base_ids,
                    congruent: *quad,
                    qcentroid1: centroid1,
                    qcentroid2: centroid2,
                };
            }
        });

        log::trace!(
            "congruent quads accepted by the rigid fit: {}",
            accepted.load(Ordering::Relaxed)
        );

        let best = best.into_inner().unwrap();
        if best.lcp > self.best_lcp {
            self.best_lcp = best.lcp;
            self.transform = best.transform;
            self.base = best.base;
            self.current_congruent = best.congruent;
            self.qcentroid1 = best.qcentroid1;
            self.qcentroid2 = best.qcentroid2;
        }

        self.best_lcp > self.options.terminate_threshold()
    }

    /// LCP of a candidate transform against the current best bound.
    fn verify(&self, mat: &MatrixType) -> Scalar {
        verify_lcp(
            &self.kd_tree,
            &self.sampled_q,
            self.options.delta,
            self.best_lcp,
            mat,
        )
    }

    /// Mean distance from each reference sample to its nearest other
    /// sample, searched within a fraction of the estimated diameter.
    fn mean_distance(&self) -> Scalar {
        const K_DIAMETER_FRACTION: Scalar = 0.2;

        let mut number_of_samples: usize = 0;
        let mut distance: Scalar = 0.0;

        for (i, point) in self.sampled_p.iter().enumerate() {
            let found = self.kd_tree.nearest_within_excluding(
                point.pos(),
                self.p_diameter * K_DIAMETER_FRACTION,
                i,
            );
            if let Some((res_id, _)) = found {
                distance += (point.pos() - self.sampled_p[res_id].pos()).norm();
                number_of_samples += 1;
            }
        }

        if number_of_samples == 0 {
            1.0
        } else {
            distance / number_of_samples as Scalar
        }
    }

    /// The down-sampled, centred copy of P. Intended for debug export.
    pub fn first_sampled(&self) -> &[Point3D] {
        &self.sampled_p
    }

    /// The down-sampled, centred copy of Q. Intended for debug export.
    pub fn second_sampled(&self) -> &[Point3D] {
        &self.sampled_q
    }

    /// Best LCP achieved so far.
    pub fn best_lcp(&self) -> Scalar {
        self.best_lcp
    }

    /// Trial budget derived by the last `init`.
    pub fn number_of_trials(&self) -> usize {
        self.number_of_trials
    }

    /// Mean nearest-other-sample distance within P, estimated by `init`.
    pub fn mean_sample_distance(&self) -> Scalar {
        self.p_mean_distance
    }

    /// Options this driver was built with.
    pub fn options(&self) -> &MatchOptions {
        &self.options
    }
}

/// Rebuilds the transform so it applies to the original clouds: the fit
/// was computed between clouds centred at the origin, so the translation
/// column is recomposed from the quad centroids and the cloud centroids.
fn global_transform(
    transform: &MatrixType,
    qcentroid1: &VectorType,
    qcentroid2: &VectorType,
    centroid_p: &VectorType,
    centroid_q: &VectorType,
) -> MatrixType {
    // The upper-left block carries rotation and isotropic scale together,
    // which is exactly what the recomposed translation needs.
    let rot_scale = transform.fixed_view::<3, 3>(0, 0);
    let translation = qcentroid1 + centroid_p - rot_scale * (qcentroid2 + centroid_q);
    let mut global = *transform;
    global.set_column(3, &translation.push(1.0));
    global
}

/// Fraction of `sampled_q` whose image under `mat` has a neighbour in the
/// indexed reference within `delta`. Deterministic with early termination:
/// the scan stops as soon as the remaining points cannot beat `best_lcp`.
fn verify_lcp(
    kd_tree: &KdTree,
    sampled_q: &[Point3D],
    delta: Scalar,
    best_lcp: Scalar,
    mat: &MatrixType,
) -> Scalar {
    let number_of_points = sampled_q.len();
    let terminate_value = best_lcp * number_of_points as Scalar;
    let sq_eps = delta * delta;

    let mut good_points: Scalar = 0.0;

    for (i, point) in sampled_q.iter().enumerate() {
        let query = point.transformed(mat);
        if let Some((_, sq_dist)) = kd_tree.nearest_within(&query, sq_eps) {
            #[cfg(feature = "weighted-lcp")]
            {
                good_points += lcp_kernel(sq_dist.sqrt() / delta);
            }
            #[cfg(not(feature = "weighted-lcp"))]
            {
                let _ = sq_dist;
                good_points += 1.0;
            }
        }

        // No longer any chance to get better than the current best.
        if (number_of_points - i) as Scalar + good_points < terminate_value {
            break;
        }
    }

    good_points / number_of_points as Scalar
}

/// Smooth scoring kernel for the weighted LCP: 1 at a perfect hit, 0 at
/// the tolerance radius.
#[cfg(feature = "weighted-lcp")]
fn lcp_kernel(x: Scalar) -> Scalar {
    (x.powi(4) - 1.0).powi(2)
}

/// Normal-difference magnitude of a base edge; `None` when either endpoint
/// carries no normal, which disables the normal filter for that edge.
fn base_normal_angle(a: &Point3D, b: &Point3D) -> Option<Scalar> {
    match (a.normal(), b.normal()) {
        (Some(na), Some(nb)) => Some((na - nb).norm()),
        _ => None,
    }
}
