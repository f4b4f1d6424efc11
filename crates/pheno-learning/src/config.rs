//! Configuration types for training and evaluation.
//!
//! # Example
//!
//! ```
//! use pheno_learning::{ParamGrid, TrainingConfig};
//!
//! let config = TrainingConfig::builder()
//!     .cv_folds(5)
//!     .param_grid(ParamGrid::new(vec![0.1, 1.0], vec![0.0, 0.5, 1.0]))
//!     .n_jobs(4)
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.param_grid.len(), 6);
//! ```

use crate::cv::{DEFAULT_N_SPLITS, StratifiedKFold};
use crate::error::LearningError;
use crate::grid_search::ParamGrid;
use crate::logistic::{DEFAULT_MAX_ITER, DEFAULT_TOL, LogisticRegression};
use crate::metrics::Metric;
use pheno_processing::DataSplit;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default directory of compiled score tables.
pub const DEFAULT_SCORES_DIR: &str = "evaluations/F1_scores";

/// Configuration of a training run.
///
/// Use [`TrainingConfig::builder()`] to construct a configuration with the builder pattern.
///
/// # Validation
///
/// The builder validates the following constraints on [`build()`](TrainingConfigBuilder::build):
/// - `cv_folds` must be at least 2
/// - the parameter grid must be non-empty with `C > 0` and `l1_ratio` in `[0, 1]`
/// - `max_iter` must be at least 1
/// - `tol` must be positive
/// - `n_jobs`, when set, must be at least 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of stratified folds.
    /// Default: 10
    pub cv_folds: usize,

    /// Hyperparameter grid.
    /// Default: `C = logspace(-3, 3, 7)`, `l1_ratio = linspace(0, 1, 11)`
    pub param_grid: ParamGrid,

    /// Solver iteration cap.
    /// Default: 100
    pub max_iter: usize,

    /// Solver tolerance.
    /// Default: 1e-4
    pub tol: f64,

    /// Seed for shuffled baselines and single-class down-sampling.
    /// Default: 0
    pub seed: u64,

    /// Worker threads for the grid search. `None` uses the global rayon pool.
    /// Default: None
    pub n_jobs: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cv_folds: DEFAULT_N_SPLITS,
            param_grid: ParamGrid::default(),
            max_iter: DEFAULT_MAX_ITER,
            tol: DEFAULT_TOL,
            seed: 0,
            n_jobs: None,
        }
    }
}

impl TrainingConfig {
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    /// Unfitted estimator template carrying the solver settings.
    pub fn estimator(&self) -> LogisticRegression {
        LogisticRegression::default()
            .with_max_iter(self.max_iter)
            .with_tol(self.tol)
    }

    pub fn cv(&self) -> StratifiedKFold {
        StratifiedKFold::new(self.cv_folds)
    }
}

/// Builder for [`TrainingConfig`].
#[derive(Debug, Default)]
pub struct TrainingConfigBuilder {
    config: TrainingConfig,
}

impl TrainingConfigBuilder {
    pub fn cv_folds(mut self, folds: usize) -> Self {
        self.config.cv_folds = folds;
        self
    }

    pub fn param_grid(mut self, grid: ParamGrid) -> Self {
        self.config.param_grid = grid;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.config.tol = tol;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Size of a dedicated thread pool for the grid search.
    pub fn n_jobs(mut self, jobs: usize) -> Self {
        self.config.n_jobs = Some(jobs);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidConfig`] when a constraint listed on
    /// [`TrainingConfig`] is violated.
    pub fn build(self) -> Result<TrainingConfig, LearningError> {
        if self.config.cv_folds < 2 {
            return Err(LearningError::InvalidConfig(
                "cv_folds must be at least 2".to_string(),
            ));
        }

        self.config.param_grid.validate()?;

        if self.config.max_iter == 0 {
            return Err(LearningError::InvalidConfig(
                "max_iter must be at least 1".to_string(),
            ));
        }

        if self.config.tol.is_nan() || self.config.tol <= 0.0 {
            return Err(LearningError::InvalidConfig(
                "tol must be positive".to_string(),
            ));
        }

        if self.config.n_jobs == Some(0) {
            return Err(LearningError::InvalidConfig(
                "n_jobs must be at least 1".to_string(),
            ));
        }

        Ok(self.config)
    }
}

/// Configuration of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Per-class score written to the compiled tables.
    /// Default: F1
    pub metric: Metric,

    /// Directory of the compiled score tables.
    /// Default: "evaluations/F1_scores"
    pub output_dir: PathBuf,

    /// Splits on which single-class models are scored.
    /// Default: train, test
    pub single_class_splits: Vec<DataSplit>,

    /// Seed for down-sampling negatives on the train split.
    /// Default: 0
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            metric: Metric::F1,
            output_dir: PathBuf::from(DEFAULT_SCORES_DIR),
            single_class_splits: vec![DataSplit::Train, DataSplit::Test],
            seed: 0,
        }
    }
}

impl EvaluationConfig {
    pub fn builder() -> EvaluationConfigBuilder {
        EvaluationConfigBuilder::default()
    }
}

/// Builder for [`EvaluationConfig`].
#[derive(Debug, Default)]
pub struct EvaluationConfigBuilder {
    config: EvaluationConfig,
}

impl EvaluationConfigBuilder {
    pub fn metric(mut self, metric: Metric) -> Self {
        self.config.metric = metric;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn single_class_splits(mut self, splits: Vec<DataSplit>) -> Self {
        self.config.single_class_splits = splits;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn build(self) -> Result<EvaluationConfig, LearningError> {
        if self.config.single_class_splits.is_empty() {
            return Err(LearningError::InvalidConfig(
                "at least one split is needed for single-class evaluation".to_string(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainingConfig::default();
        assert_eq!(config.cv_folds, 10);
        assert_eq!(config.param_grid.len(), 77);
        assert_eq!(config.max_iter, 100);
        assert_eq!(config.seed, 0);
        assert!(config.n_jobs.is_none());
    }

    #[test]
    fn test_builder() {
        let config = TrainingConfig::builder()
            .cv_folds(3)
            .max_iter(50)
            .seed(7)
            .build()
            .unwrap();
        assert_eq!(config.cv().n_splits(), 3);
        assert_eq!(config.estimator().max_iter, 50);
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_invalid_cv_folds() {
        let result = TrainingConfig::builder().cv_folds(1).build();
        assert!(result.unwrap_err().to_string().contains("cv_folds"));
    }

    #[test]
    fn test_invalid_grid() {
        let result = TrainingConfig::builder()
            .param_grid(ParamGrid::new(vec![0.0], vec![0.5]))
            .build();
        assert!(matches!(result, Err(LearningError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_tol() {
        for tol in [0.0, -1e-4, f64::NAN] {
            let result = TrainingConfig::builder().tol(tol).build();
            assert!(matches!(result, Err(LearningError::InvalidConfig(_))));
        }
        assert!(TrainingConfig::builder().tol(1e-6).build().is_ok());
    }

    #[test]
    fn test_invalid_n_jobs() {
        assert!(TrainingConfig::builder().n_jobs(0).build().is_err());
    }

    #[test]
    fn test_evaluation_defaults() {
        let config = EvaluationConfig::builder().build().unwrap();
        assert_eq!(config.metric, Metric::F1);
        assert_eq!(config.output_dir, PathBuf::from("evaluations/F1_scores"));
        assert_eq!(config.single_class_splits, vec![DataSplit::Train, DataSplit::Test]);
    }

    #[test]
    fn test_evaluation_requires_splits() {
        assert!(EvaluationConfig::builder().single_class_splits(vec![]).build().is_err());
    }
}
