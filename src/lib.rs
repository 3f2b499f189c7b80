// src/lib.rs

#![warn(missing_docs)] // Enforce documentation warnings during build

//! `fpcs`: Four-Points Congruent Sets registration for 3D point clouds
//!
//! This library computes a rigid alignment (rotation and translation,
//! optionally with an isotropic scale) bringing an unordered moving cloud
//! Q into registration with a reference cloud P, together with a quality
//! score: the fraction of Q landing within tolerance of P under the
//! recovered transform (the Largest Common Pointset, or LCP).
//!
//! ## Approach
//!
//! The driver runs RANSAC over *bases*: wide, near-planar quadrilaterals
//! drawn from P. The ratios at which a base's diagonals intersect are
//! invariant under rigid motion, so all candidate quadruples of Q
//! congruent to the base can be collected from two distance-constrained
//! pair lists instead of a cubic scan. Every candidate is fitted by an
//! orthonormal-frame alignment, validated, and verified against a k-d
//! tree over P with early termination; the best LCP survives the loop.
//!
//! Two congruent-search strategies are available behind one interface:
//! the exhaustive quadratic pair scan of the classic formulation and an
//! accelerated scheme that extracts pair candidates with sphere
//! primitives in a normalized unit cube.
//!
//! ## Key Components
//!
//! * **Core Types (`fpcs::core`):** `Point3D` (position with optional
//!   normal and colour), `MatchOptions`, `RegistrationError`, shared
//!   scalar and matrix aliases.
//! * **Spatial Index (`fpcs::kdtree`):** a static balanced k-d tree with
//!   bounded nearest-neighbour and radius queries.
//! * **Matcher (`fpcs::matcher`):** the RANSAC driver: base selection,
//!   congruent-set collection, rigid fitting, LCP verification and the
//!   resumable trial loop.
//! * **Strategies (`fpcs::pairs`):** [`Strategy`] selects the classic or
//!   the accelerated pair extraction at driver construction.
//! * **Sampling (`fpcs::sampling`):** the `Sampler` contract and a
//!   seeded uniform random down-sampler.
//! * **Visitors (`fpcs::visitor`):** progress-report hooks invoked per
//!   trial and per candidate.
//!
//! ## Example
//!
//! ```
//! use fpcs::{DummyVisitor, MatchOptions, Matcher, MatrixType, Point3D, Strategy,
//!            UniformDistSampler};
//!
//! // A small synthetic cloud registered against itself.
//! let p: Vec<Point3D> = (0..64)
//!     .map(|i| {
//!         let t = i as f32 * 0.37;
//!         Point3D::new(t.sin(), t.cos(), (0.5 * t).sin())
//!     })
//!     .collect();
//! let mut q = p.clone();
//!
//! let mut options = MatchOptions::new();
//! options.delta = 0.02;
//! options.configure_overlap(1.0).unwrap();
//!
//! let mut matcher = Matcher::new(options, Strategy::Super4pcs).unwrap();
//! let mut transform = MatrixType::identity();
//! let lcp = matcher.compute_transformation(
//!     &p,
//!     &mut q,
//!     &mut transform,
//!     &UniformDistSampler,
//!     &DummyVisitor,
//! );
//! assert!(lcp >= 0.99, "identical clouds align fully, got {}", lcp);
//! ```

pub mod core;
pub mod kdtree;
pub mod matcher;
pub mod pairs;
pub mod sampling;
pub mod visitor;

mod align;

// Re-export the most common types for easier top-level use
pub use self::core::{
    LARGE_NUMBER, MatchOptions, MatrixType, Point3D, RegistrationError, Scalar, VectorType,
    centroid, sanitize_normals,
};
pub use kdtree::KdTree;
pub use matcher::Matcher;
pub use pairs::Strategy;
pub use sampling::{Sampler, UniformDistSampler};
pub use visitor::{DummyVisitor, ProgressVisitor};
