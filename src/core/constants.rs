// src/core/constants.rs

use super::point::Scalar;

/// Sentinel returned for degenerate input and by rejected rigid fits.
pub const LARGE_NUMBER: Scalar = 1e8;

/// Tolerance multiplier applied to `delta` for pair extraction and for the
/// rigid-fit RMS acceptance gate.
pub const DISTANCE_FACTOR: Scalar = 2.0;

/// Number of random probes used for diameter estimation and for the
/// retained-best triangle / quadrilateral selection loops.
pub const NUMBER_OF_DIAMETER_TRIALS: usize = 50;

/// Residual probability of missing a valid base, used to size the RANSAC
/// trial budget.
pub const SMALL_ERROR: Scalar = 1e-5;

/// Fraction of the cloud diameter bounding the base spread in the trial
/// budget heuristic.
pub const DIAMETER_FRACTION: Scalar = 0.3;

/// Lower clamp on the trial budget, and the exponent of the overlap term.
pub const MIN_NUMBER_OF_TRIALS: usize = 4;
