//! Error types for the pheno-learning crate.
//!
//! This module defines [`LearningError`], the error type returned by every
//! fallible operation in the crate. Errors always propagate to the caller:
//! a degenerate fit, an empty fold or a missing model file aborts the run.
//! The only tolerated data condition is a class absent from the evaluated
//! predictions, which the metric functions handle without an error.

use pheno_processing::ProcessingError;
use thiserror::Error;

/// The main error type for pheno-learning operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LearningError {
    /// Invalid configuration (grid, fold count, solver settings).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data for training or prediction.
    ///
    /// Common causes:
    /// - feature matrix and label vector lengths differ
    /// - prediction input has a different number of features than the model
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The solver could not produce a model.
    ///
    /// Raised when the training labels hold fewer than two classes.
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// The estimator was used before [`fit`](crate::Classifier::fit).
    #[error("Estimator is not fitted")]
    NotFitted,

    /// The specified model file was not found.
    #[error("Model not found: {path}")]
    ModelNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Loading, partitioning or extraction of the feature table failed.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// I/O error during model or score-table persistence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed model file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Polars error while building score tables.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

/// Result type alias for learning operations.
pub type Result<T> = std::result::Result<T, LearningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_error_is_transparent() {
        let err: LearningError = ProcessingError::NoFeatureColumns("DP".to_string()).into();
        assert_eq!(
            err.to_string(),
            "No feature columns found for feature type 'DP'"
        );
    }

    #[test]
    fn test_model_not_found_message() {
        let err = LearningError::ModelNotFound {
            path: "models/final__CP.json".to_string(),
        };
        assert!(err.to_string().contains("final__CP.json"));
    }
}
