// src/core/mod.rs

//! Core data structures and types

// Declare modules within core
pub mod constants;
pub mod error;
pub mod options;
pub mod point;

// Re-export public types for convenient access via `fpcs::core::TypeName`
pub use constants::{
    DIAMETER_FRACTION, DISTANCE_FACTOR, LARGE_NUMBER, MIN_NUMBER_OF_TRIALS,
    NUMBER_OF_DIAMETER_TRIALS, SMALL_ERROR,
};
pub use error::RegistrationError;
pub use options::MatchOptions;
pub use point::{MatrixType, Point3D, Scalar, VectorType, centroid, sanitize_normals};
