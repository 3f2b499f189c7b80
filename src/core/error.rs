//! Error handling logic

use std::fmt;

use super::point::Scalar;

/// Error types surfaced by the registration configuration layer.
///
/// The matcher itself never aborts a run on per-candidate failures: a bad
/// base, a degenerate rigid fit or an empty congruent set simply ends the
/// current trial. These variants cover the calls that *can* reject input
/// up front, before any trial is spent.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// The overlap estimation must lie in (0, 1].
    InvalidOverlap {
        /// The rejected value.
        value: Scalar,
    },

    /// An option field holds a value the matcher cannot work with
    /// (zero sample size, non-positive delta, non-positive time budget).
    InvalidOptions {
        /// InvalidOptions failure message
        message: String,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::InvalidOverlap { value } => {
                write!(f, "Invalid Overlap: {} is outside (0, 1]", value)
            }
            RegistrationError::InvalidOptions { message } => {
                write!(f, "Invalid Options: {}", message)
            }
        }
    }
}

// Implement the standard Error trait to allow for easy integration with Rust error handling.
impl std::error::Error for RegistrationError {}
