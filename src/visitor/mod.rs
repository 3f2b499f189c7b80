// src/visitor/mod.rs

//! Progress reporting hooks.

use crate::core::{MatrixType, Scalar};

/// Sink for progress reports emitted by the matcher.
///
/// `fraction < 0` marks a per-candidate report from inside one trial;
/// `fraction` in `[0, 1]` marks a per-trial report with the combined
/// trial/time progress. Candidate reports may arrive from worker threads,
/// so implementations used with the matcher must be `Sync`.
pub trait ProgressVisitor {
    /// Receives the progress fraction, the best LCP so far and the current
    /// transform.
    fn report(&self, fraction: Scalar, best_lcp: Scalar, transform: &MatrixType);

    /// When true, reported transforms are recomposed with the centroid
    /// offsets so they apply to the caller's original clouds rather than
    /// the centred working copies.
    fn needs_global_transformation(&self) -> bool {
        false
    }
}

/// Visitor that ignores every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyVisitor;

impl ProgressVisitor for DummyVisitor {
    fn report(&self, _fraction: Scalar, _best_lcp: Scalar, _transform: &MatrixType) {}
}
