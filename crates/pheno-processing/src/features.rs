//! Feature matrix and label extraction.
//!
//! Feature columns are recognised by naming convention:
//!
//! | Feature type | Columns                                        |
//! |--------------|------------------------------------------------|
//! | `CP`         | prefix `CP__`                                  |
//! | `DP`         | prefix `DP__`, or containing `efficientnet`    |
//! | `CP_and_DP`  | union of both, in table column order           |

use crate::config::DatasetConfig;
use crate::error::{ProcessingError, Result};
use crate::utils::{is_numeric_dtype, require_column, string_values};
use ndarray::{Array2, Axis};
use once_cell::sync::Lazy;
use polars::prelude::*;
use rand::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

static CP_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CP__").expect("Invalid regex: CP columns"));
static DP_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^DP__|efficientnet").expect("Invalid regex: DP columns"));

/// Family of morphology features used to train a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureType {
    /// CellProfiler features.
    #[serde(rename = "CP")]
    Cp,
    /// DeepProfiler features.
    #[serde(rename = "DP")]
    Dp,
    /// Both feature families.
    #[serde(rename = "CP_and_DP")]
    CpAndDp,
}

impl FeatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cp => "CP",
            Self::Dp => "DP",
            Self::CpAndDp => "CP_and_DP",
        }
    }

    pub fn all() -> [FeatureType; 3] {
        [Self::Cp, Self::Dp, Self::CpAndDp]
    }

    /// Whether a column name belongs to this feature type.
    pub fn matches(&self, column: &str) -> bool {
        match self {
            Self::Cp => CP_COLUMN.is_match(column),
            Self::Dp => DP_COLUMN.is_match(column),
            Self::CpAndDp => CP_COLUMN.is_match(column) || DP_COLUMN.is_match(column),
        }
    }

    /// Names of the matching columns, in table order.
    pub fn feature_columns(&self, df: &DataFrame) -> Vec<String> {
        df.get_column_names()
            .into_iter()
            .filter(|name| self.matches(name.as_str()))
            .map(|name| name.to_string())
            .collect()
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CP" => Ok(Self::Cp),
            "DP" => Ok(Self::Dp),
            "CP_and_DP" => Ok(Self::CpAndDp),
            other => Err(ProcessingError::InvalidConfig(format!(
                "unknown feature type '{other}' (expected CP, DP or CP_and_DP)"
            ))),
        }
    }
}

/// Dense feature matrix with one label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    /// Row-major feature matrix, `n_samples × n_features`.
    pub x: Array2<f64>,
    pub labels: Vec<String>,
    pub feature_names: Vec<String>,
}

impl LabeledData {
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Distinct labels, sorted.
    pub fn classes(&self) -> Vec<String> {
        self.labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Extract the feature matrix of `feature_type` and the label vector, then
/// shuffle rows jointly with `config.shuffle_seed`.
///
/// # Errors
///
/// - [`ProcessingError::NoFeatureColumns`] when no column matches
/// - [`ProcessingError::InvalidData`] on nulls or non-numeric feature columns
pub fn get_x_y(
    df: &DataFrame,
    feature_type: FeatureType,
    config: &DatasetConfig,
) -> Result<LabeledData> {
    let columns = feature_type.feature_columns(df);
    if columns.is_empty() {
        return Err(ProcessingError::NoFeatureColumns(
            feature_type.as_str().to_string(),
        ));
    }
    get_x_y_with_columns(df, &columns, config)
}

/// Same as [`get_x_y`] with an explicit, ordered list of feature columns.
///
/// Used at evaluation time so the matrix follows the column order a model
/// was trained with.
pub fn get_x_y_with_columns(
    df: &DataFrame,
    columns: &[String],
    config: &DatasetConfig,
) -> Result<LabeledData> {
    let labels = string_values(df, &config.label_column)?;
    let mut x = Array2::<f64>::zeros((df.height(), columns.len()));

    for (j, name) in columns.iter().enumerate() {
        let column = require_column(df, name)?;
        if !is_numeric_dtype(column.dtype()) {
            return Err(ProcessingError::InvalidData(format!(
                "feature column '{name}' has non-numeric type {}",
                column.dtype()
            )));
        }
        if column.null_count() > 0 {
            return Err(ProcessingError::InvalidData(format!(
                "feature column '{name}' contains {} null values",
                column.null_count()
            )));
        }

        let values = column.as_materialized_series().cast(&DataType::Float64)?;
        for (i, value) in values.f64()?.into_no_null_iter().enumerate() {
            x[[i, j]] = value;
        }
    }

    let mut order: Vec<usize> = (0..labels.len()).collect();
    let mut rng = StdRng::seed_from_u64(config.shuffle_seed);
    order.shuffle(&mut rng);

    debug!(
        "Extracted {} rows x {} features (seed {})",
        x.nrows(),
        x.ncols(),
        config.shuffle_seed
    );

    Ok(LabeledData {
        x: x.select(Axis(0), &order),
        labels: order.iter().map(|&i| labels[i].clone()).collect(),
        feature_names: columns.to_vec(),
    })
}

/// Permute labels only, leaving features in place.
pub fn shuffle_labels(labels: &[String], seed: u64) -> Vec<String> {
    let mut shuffled = labels.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);
    shuffled
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> DataFrame {
        df![
            "index" => [0i64, 1, 2, 3],
            "Mitocheck_Phenotypic_Class" => [
                "Interphase", "Prometaphase", "Interphase", "Apoptosis",
            ],
            "CP__Area" => [1.0, 2.0, 3.0, 4.0],
            "DP__efficientnet_0" => [10.0, 20.0, 30.0, 40.0],
            "CP__Intensity" => [5i64, 6, 7, 8],
            "Metadata_Plate_Map_Name" => ["p1", "p1", "p2", "p2"],
        ]
        .unwrap()
    }

    // =========================================================================
    // Feature type selection
    // =========================================================================

    #[test]
    fn test_feature_columns_by_type() {
        let df = table();
        assert_eq!(FeatureType::Cp.feature_columns(&df), vec!["CP__Area", "CP__Intensity"]);
        assert_eq!(FeatureType::Dp.feature_columns(&df), vec!["DP__efficientnet_0"]);
        assert_eq!(
            FeatureType::CpAndDp.feature_columns(&df),
            vec!["CP__Area", "DP__efficientnet_0", "CP__Intensity"]
        );
    }

    #[test]
    fn test_legacy_efficientnet_columns_are_dp() {
        assert!(FeatureType::Dp.matches("efficientnet_12"));
        assert!(!FeatureType::Cp.matches("efficientnet_12"));
        assert!(!FeatureType::Cp.matches("Metadata_CP__x"));
    }

    #[test]
    fn test_feature_type_from_str() {
        for feature_type in FeatureType::all() {
            assert_eq!(feature_type.as_str().parse::<FeatureType>().unwrap(), feature_type);
        }
        assert!("cp".parse::<FeatureType>().is_err());
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    #[test]
    fn test_get_x_y_keeps_rows_aligned() {
        let config = DatasetConfig::default();
        let data = get_x_y(&table(), FeatureType::CpAndDp, &config).unwrap();

        assert_eq!(data.x.dim(), (4, 3));
        for (row, label) in data.x.rows().into_iter().zip(&data.labels) {
            let original = (row[0] - 1.0) as usize;
            let expected = ["Interphase", "Prometaphase", "Interphase", "Apoptosis"][original];
            assert_eq!(label, expected);
            assert_eq!(row[1], row[0] * 10.0);
        }
    }

    #[test]
    fn test_get_x_y_is_deterministic() {
        let config = DatasetConfig::default();
        let first = get_x_y(&table(), FeatureType::Cp, &config).unwrap();
        let second = get_x_y(&table(), FeatureType::Cp, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_get_x_y_no_feature_columns() {
        let config = DatasetConfig::default();
        let df = table().drop("DP__efficientnet_0").unwrap();
        assert!(matches!(
            get_x_y(&df, FeatureType::Dp, &config),
            Err(ProcessingError::NoFeatureColumns(ref t)) if t == "DP"
        ));
    }

    #[test]
    fn test_get_x_y_rejects_nulls() {
        let config = DatasetConfig::default();
        let df = df![
            "Mitocheck_Phenotypic_Class" => ["A", "B"],
            "CP__Area" => [Some(1.0), None],
        ]
        .unwrap();
        assert!(matches!(
            get_x_y(&df, FeatureType::Cp, &config),
            Err(ProcessingError::InvalidData(_))
        ));
    }

    #[test]
    fn test_classes_sorted() {
        let config = DatasetConfig::default();
        let data = get_x_y(&table(), FeatureType::Cp, &config).unwrap();
        assert_eq!(data.classes(), vec!["Apoptosis", "Interphase", "Prometaphase"]);
    }

    #[test]
    fn test_shuffle_labels_is_permutation() {
        let labels: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let shuffled = shuffle_labels(&labels, 0);

        let mut sorted = shuffled.clone();
        sorted.sort();
        assert_eq!(sorted, labels);
        assert_eq!(shuffled, shuffle_labels(&labels, 0));
    }
}
