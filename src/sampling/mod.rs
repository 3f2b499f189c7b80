// src/sampling/mod.rs

//! Down-sampling of the caller's clouds.
//!
//! The matcher never works on the full inputs: both clouds are reduced to
//! at most `sample_size` points before any trial runs. The sampler is an
//! external collaborator chosen by the caller; the only contract is that
//! it returns a subset no larger than requested.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::{MatchOptions, Point3D};

/// Down-samples a cloud according to the options.
pub trait Sampler {
    /// Returns at most `options.sample_size` points drawn from `cloud`.
    fn sample(&self, cloud: &[Point3D], options: &MatchOptions) -> Vec<Point3D>;
}

/// Uniform random down-sampler.
///
/// Draws a seeded random subset, so a fixed `random_seed` makes the whole
/// pipeline reproducible. The subset keeps the cloud's relative order,
/// which keeps downstream index-based structures deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformDistSampler;

impl Sampler for UniformDistSampler {
    fn sample(&self, cloud: &[Point3D], options: &MatchOptions) -> Vec<Point3D> {
        if cloud.len() <= options.sample_size {
            return cloud.to_vec();
        }
        let mut rng = StdRng::seed_from_u64(options.random_seed);
        let mut indices: Vec<usize> = (0..cloud.len()).collect();
        indices.shuffle(&mut rng);
        indices.truncate(options.sample_size);
        indices.sort_unstable();
        indices.into_iter().map(|i| cloud[i]).collect()
    }
}
