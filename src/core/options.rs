// src/core/options.rs

//! Tuning knobs for the registration driver.

use super::error::RegistrationError;
use super::point::Scalar;

/// Options controlling base selection, pair filtering and the RANSAC budget.
///
/// Angular bounds are given in degrees; distances are in the world units of
/// the input clouds. Every optional filter is disabled by a negative value.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOptions {
    /// Target number of points kept per cloud by the down-sampler.
    pub sample_size: usize,
    /// Position tolerance: drives both the pair-distance window and the
    /// LCP verification radius.
    pub delta: Scalar,
    /// Maximum angle difference (degrees) between pair normals and base
    /// normals. Negative disables the normal filter.
    pub max_normal_difference: Scalar,
    /// Maximum RGB distance between corresponding endpoints. Negative
    /// disables the colour filter.
    pub max_color_distance: Scalar,
    /// Maximum distance a point may travel under the sought transform.
    /// Negative disables the translation cap.
    pub max_translation_distance: Scalar,
    /// Maximum per-axis rotation angle (degrees) of the sought transform.
    /// Negative disables both the segment-angle filter and the rigid-fit
    /// angle cap.
    pub max_angle: Scalar,
    /// Wall-clock budget in seconds for the RANSAC loop.
    pub max_time_seconds: Scalar,
    /// Seed for the driver-owned random generator. Runs with equal inputs
    /// and equal seeds are reproducible.
    pub random_seed: u64,
    /// Estimated fraction of Q overlapping P, in (0, 1]. Drives the trial
    /// count and the early-success threshold. Kept private so it can only
    /// be changed through the validity check in [`Self::configure_overlap`].
    overlap_estimation: Scalar,
}

impl MatchOptions {
    /// Creates options with the reference defaults: 200 samples, delta 5,
    /// all optional filters disabled, 30 s budget, 20% overlap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overlap estimation after checking it lies in (0, 1].
    pub fn configure_overlap(&mut self, overlap: Scalar) -> Result<(), RegistrationError> {
        if !(overlap > 0.0 && overlap <= 1.0) {
            return Err(RegistrationError::InvalidOverlap { value: overlap });
        }
        self.overlap_estimation = overlap;
        Ok(())
    }

    /// Current overlap estimation.
    pub fn overlap_estimation(&self) -> Scalar {
        self.overlap_estimation
    }

    /// LCP above which a trial counts as a success and the loop may stop.
    pub fn terminate_threshold(&self) -> Scalar {
        self.overlap_estimation
    }

    /// Checks the non-optional fields. The optional filters are allowed any
    /// value (negative simply disables them).
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.sample_size == 0 {
            return Err(RegistrationError::InvalidOptions {
                message: "sample_size must be positive".to_string(),
            });
        }
        if !(self.delta > 0.0) {
            return Err(RegistrationError::InvalidOptions {
                message: format!("delta must be positive, got {}", self.delta),
            });
        }
        if !(self.max_time_seconds > 0.0) {
            return Err(RegistrationError::InvalidOptions {
                message: format!(
                    "max_time_seconds must be positive, got {}",
                    self.max_time_seconds
                ),
            });
        }
        Ok(())
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            sample_size: 200,
            delta: 5.0,
            max_normal_difference: -1.0,
            max_color_distance: -1.0,
            max_translation_distance: -1.0,
            max_angle: -1.0,
            max_time_seconds: 30.0,
            random_seed: 0,
            overlap_estimation: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_overlap_bounds() {
        let mut options = MatchOptions::new();
        assert!(options.configure_overlap(0.5).is_ok());
        assert_eq!(options.overlap_estimation(), 0.5);
        assert_eq!(options.terminate_threshold(), 0.5);

        assert_eq!(
            options.configure_overlap(0.0),
            Err(RegistrationError::InvalidOverlap { value: 0.0 })
        );
        assert!(options.configure_overlap(1.5).is_err());
        // A failed call leaves the previous value in place.
        assert_eq!(options.overlap_estimation(), 0.5);
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut options = MatchOptions::new();
        assert!(options.validate().is_ok());

        options.sample_size = 0;
        assert!(options.validate().is_err());

        options = MatchOptions::new();
        options.delta = 0.0;
        assert!(options.validate().is_err());
    }
}
