//! Configuration types for loading and partitioning feature tables.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic setup. The defaults reproduce the MitoCheck
//! labeling conventions: `ADCCM` is excluded and the legacy `Shape1`/`Shape3`
//! labels are folded into `Binuclear`/`Polylobed`.

use serde::{Deserialize, Serialize};

/// Default name of the phenotypic class label column.
pub const DEFAULT_LABEL_COLUMN: &str = "Mitocheck_Phenotypic_Class";

/// Default name of the replicate group (plate map) column.
pub const DEFAULT_REPLICATE_COLUMN: &str = "Metadata_Plate_Map_Name";

/// Default name of the row index column.
pub const DEFAULT_INDEX_COLUMN: &str = "index";

/// Class that is dropped before any classification.
pub const DEFAULT_EXCLUDED_CLASS: &str = "ADCCM";

/// Configuration describing the layout and labeling of a feature table.
///
/// Use [`DatasetConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust
/// use pheno_processing::config::DatasetConfig;
///
/// let config = DatasetConfig::builder()
///     .label_column("Mitocheck_Phenotypic_Class")
///     .shuffle_seed(0)
///     .build()
///     .unwrap();
/// assert_eq!(config.excluded_class.as_deref(), Some("ADCCM"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Column holding the phenotypic class label.
    /// Default: "Mitocheck_Phenotypic_Class"
    pub label_column: String,

    /// Column identifying the replicate group (unit of holdout partitioning).
    /// Default: "Metadata_Plate_Map_Name"
    pub replicate_column: String,

    /// Column holding the row index. Generated when absent from the table.
    /// Default: "index"
    pub index_column: String,

    /// Class whose rows are dropped entirely.
    /// Default: Some("ADCCM")
    pub excluded_class: Option<String>,

    /// Legacy label → canonical label pairs.
    /// Default: Shape1 → Binuclear, Shape3 → Polylobed
    pub label_remaps: Vec<(String, String)>,

    /// Seed of the joint row shuffle performed during feature extraction.
    /// Default: 0
    pub shuffle_seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            replicate_column: DEFAULT_REPLICATE_COLUMN.to_string(),
            index_column: DEFAULT_INDEX_COLUMN.to_string(),
            excluded_class: Some(DEFAULT_EXCLUDED_CLASS.to_string()),
            label_remaps: default_label_remaps(),
            shuffle_seed: 0,
        }
    }
}

fn default_label_remaps() -> Vec<(String, String)> {
    vec![
        ("Shape1".to_string(), "Binuclear".to_string()),
        ("Shape3".to_string(), "Polylobed".to_string()),
    ]
}

impl DatasetConfig {
    /// Create a new configuration builder.
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (field, value) in [
            ("label_column", &self.label_column),
            ("replicate_column", &self.replicate_column),
            ("index_column", &self.index_column),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigValidationError::EmptyColumnName(field.to_string()));
            }
        }

        // A remap target must not itself be remapped, otherwise the remap is
        // order dependent and not idempotent.
        for (_, target) in &self.label_remaps {
            if self.label_remaps.iter().any(|(legacy, _)| legacy == target) {
                return Err(ConfigValidationError::ChainedRemap(target.clone()));
            }
            if self.excluded_class.as_deref() == Some(target.as_str()) {
                return Err(ConfigValidationError::RemapToExcluded(target.clone()));
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Column name for '{0}' must not be empty")]
    EmptyColumnName(String),

    #[error("Label '{0}' is both a remap target and a remap source")]
    ChainedRemap(String),

    #[error("Label '{0}' is remapped onto the excluded class")]
    RemapToExcluded(String),

    #[error("Invalid test fraction: {0} (must be between 0.0 and 1.0, exclusive)")]
    InvalidTestFraction(f64),
}

/// Builder for [`DatasetConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct DatasetConfigBuilder {
    label_column: Option<String>,
    replicate_column: Option<String>,
    index_column: Option<String>,
    excluded_class: Option<Option<String>>,
    label_remaps: Option<Vec<(String, String)>>,
    shuffle_seed: Option<u64>,
}

impl DatasetConfigBuilder {
    /// Set the label column name.
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    /// Set the replicate group column name.
    pub fn replicate_column(mut self, column: impl Into<String>) -> Self {
        self.replicate_column = Some(column.into());
        self
    }

    /// Set the row index column name.
    pub fn index_column(mut self, column: impl Into<String>) -> Self {
        self.index_column = Some(column.into());
        self
    }

    /// Set the class that is dropped before classification.
    pub fn excluded_class(mut self, class: impl Into<String>) -> Self {
        self.excluded_class = Some(Some(class.into()));
        self
    }

    /// Keep every class.
    pub fn no_excluded_class(mut self) -> Self {
        self.excluded_class = Some(None);
        self
    }

    /// Add a legacy → canonical label remap.
    ///
    /// The first call replaces the default remaps.
    pub fn remap_label(mut self, legacy: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.label_remaps
            .get_or_insert_with(Vec::new)
            .push((legacy.into(), canonical.into()));
        self
    }

    /// Set the seed of the joint row shuffle.
    pub fn shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Build the configuration, validating all values.
    pub fn build(self) -> Result<DatasetConfig, ConfigValidationError> {
        let defaults = DatasetConfig::default();
        let config = DatasetConfig {
            label_column: self.label_column.unwrap_or(defaults.label_column),
            replicate_column: self.replicate_column.unwrap_or(defaults.replicate_column),
            index_column: self.index_column.unwrap_or(defaults.index_column),
            excluded_class: self.excluded_class.unwrap_or(defaults.excluded_class),
            label_remaps: self.label_remaps.unwrap_or(defaults.label_remaps),
            shuffle_seed: self.shuffle_seed.unwrap_or(defaults.shuffle_seed),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Configuration for train/test/holdout partitioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Number of whole replicate groups moved to the holdout partition.
    /// Default: 5
    pub holdout_groups: usize,

    /// Fraction of the non-holdout rows assigned to the test partition,
    /// stratified by label.
    /// Default: 0.15
    pub test_fraction: f64,

    /// Seed for group selection and the stratified test split.
    /// Default: 0
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            holdout_groups: 5,
            test_fraction: 0.15,
            seed: 0,
        }
    }
}

impl SplitConfig {
    /// Create a new configuration builder.
    pub fn builder() -> SplitConfigBuilder {
        SplitConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigValidationError::InvalidTestFraction(
                self.test_fraction,
            ));
        }
        Ok(())
    }
}

/// Builder for [`SplitConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct SplitConfigBuilder {
    holdout_groups: Option<usize>,
    test_fraction: Option<f64>,
    seed: Option<u64>,
}

impl SplitConfigBuilder {
    /// Set the number of replicate groups held out.
    pub fn holdout_groups(mut self, n: usize) -> Self {
        self.holdout_groups = Some(n);
        self
    }

    /// Set the test fraction of the non-holdout rows.
    pub fn test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = Some(fraction);
        self
    }

    /// Set the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the configuration, validating all values.
    pub fn build(self) -> Result<SplitConfig, ConfigValidationError> {
        let defaults = SplitConfig::default();
        let config = SplitConfig {
            holdout_groups: self.holdout_groups.unwrap_or(defaults.holdout_groups),
            test_fraction: self.test_fraction.unwrap_or(defaults.test_fraction),
            seed: self.seed.unwrap_or(defaults.seed),
        };

        config.validate()?;
        Ok(config)
    }
}
