//! Phenotype Feature Table Processing
//!
//! Loading, cleaning and partitioning of single-cell morphology feature tables
//! ahead of phenotype classification, built on Polars.
//!
//! # Overview
//!
//! - **Loading**: CSV (optionally gzip-compressed) with a row index column
//! - **Label Cleaning**: drop the excluded class, fold legacy labels into their canonical names
//! - **Partitioning**: holdout by whole replicate group, stratified train/test for the rest
//! - **Feature Extraction**: `CP`, `DP` or `CP_and_DP` matrices as `ndarray` arrays, with
//!   rows shuffled by a fixed seed
//! - **Single-Class Data**: one-vs-rest relabeling with balanced training negatives
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pheno_processing::{
//!     DataSplit, DatasetConfig, FeatureType, SplitConfig, get_dataset, get_x_y, load_features,
//!     partition,
//! };
//!
//! let dataset = DatasetConfig::default();
//! let features = load_features("data/labeled_data.csv.gz", &dataset)?;
//!
//! let split_index = partition(&features, &dataset, &SplitConfig::default())?;
//! split_index.write_tsv("indexes/data_split_indexes.tsv")?;
//!
//! let train = get_dataset(&features, &split_index, DataSplit::Train, &dataset)?;
//! let data = get_x_y(&train, FeatureType::CpAndDp, &dataset)?;
//! println!("{} rows x {} features", data.n_samples(), data.n_features());
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod loader;
pub mod single_class;
pub mod split;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, DatasetConfig, DatasetConfigBuilder, SplitConfig, SplitConfigBuilder,
};
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use features::{FeatureType, LabeledData, get_x_y, get_x_y_with_columns, shuffle_labels};
pub use loader::{clean_labels, ensure_index_column, load_features, read_delimited};
pub use single_class::{NEGATIVE_LABEL, get_scm_model_data};
pub use split::{
    DataSplit, SplitEntry, SplitIndex, get_dataset, partition, select_holdout_groups,
};
pub use utils::{string_values, unique_in_order};
