//! pheno-learning: elastic-net logistic regression for phenotype classification.
//!
//! This crate trains and evaluates the phenotype classifiers on top of the
//! tables prepared by `pheno_processing`. Everything runs natively: the
//! solver, stratified cross-validation, the hyperparameter grid search and
//! the per-class metrics.
//!
//! # Features
//!
//! - **Solver**: multinomial logistic regression with an elastic-net penalty (FISTA)
//! - **Model Selection**: stratified k-fold grid search over `C × l1_ratio`, parallel via rayon
//! - **Model Families**: multi-class and one-vs-rest models, each with a shuffled-label baseline
//! - **Evaluation**: per-class F1 or precision, confusion matrices, tidy TSV score tables
//! - **Interpretation**: fold-averaged coefficient tables with ranked, clustered and density views
//!
//! # Quick Start
//!
//! ```
//! use ndarray::array;
//! use pheno_learning::{GridSearchCV, LogisticRegression, ParamGrid, StratifiedKFold};
//!
//! let x = array![[0.0, 0.1], [0.1, 0.0], [0.0, 0.0], [1.0, 1.1], [1.1, 1.0], [1.0, 1.0]];
//! let y: Vec<String> = ["a", "a", "a", "b", "b", "b"].iter().map(|s| s.to_string()).collect();
//!
//! let search = GridSearchCV::new(
//!     LogisticRegression::default(),
//!     ParamGrid::new(vec![1.0, 10.0], vec![0.0, 0.5]),
//!     StratifiedKFold::new(3),
//! );
//! let result = search.fit(&x, &y).expect("grid search");
//! assert!(result.best_score > 0.5);
//! ```
//!
//! # Model Layout
//!
//! ```text
//! models/
//! ├── multi_class_models/
//! │   ├── final__CP.json
//! │   └── shuffled_baseline__CP_and_DP.json
//! └── single_class_models/
//!     └── Large_models/
//!         └── final__DP.json
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, LearningError>`](LearningError).
//! Processing failures from `pheno_processing` pass through unchanged as
//! [`LearningError::Processing`].

pub mod coefficients;
pub mod config;
pub mod cv;
pub mod error;
pub mod estimator;
pub mod evaluation;
pub mod grid_search;
pub mod logistic;
pub mod metrics;
pub mod model;
pub mod plots;
pub mod training;

// Re-export public API
//
// Configuration types
pub use config::{
    DEFAULT_SCORES_DIR, EvaluationConfig, EvaluationConfigBuilder, TrainingConfig,
    TrainingConfigBuilder,
};
// Error types
pub use error::{LearningError, Result};
// Estimators and model selection
pub use cv::{CvResults, Fold, StratifiedKFold, cross_val_predict, cross_validate};
pub use estimator::Classifier;
pub use grid_search::{GridPointScore, GridSearchCV, GridSearchResult, ParamGrid, ParamPoint};
pub use logistic::LogisticRegression;
// Metrics
pub use metrics::{ClassScores, ConfusionMatrix, Metric, confusion_matrix};
// Persistence
pub use model::{ModelType, TrainedModel, list_models, multi_class_dir, single_class_dir};
// Training and evaluation
pub use coefficients::{CoefficientTable, average_feature_weights};
pub use evaluation::{
    ConfusionRecord, MULTI_CLASS_SCORES_FILE, SINGLE_CLASS_SCORES_FILE, ScoreRecord, ScoreTable,
    evaluate_model_cm, evaluate_model_score, evaluate_multi_class_cms,
    evaluate_multi_class_models, evaluate_single_class_models,
};
pub use training::{
    TrainingOutcome, TrainingRecord, train_model, train_multi_class, train_multi_class_models,
    train_single_class, train_single_class_models,
};
