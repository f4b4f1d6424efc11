//! Trained model persistence.
//!
//! Models are stored as JSON, one file per (model type × feature type):
//!
//! ```text
//! {models_dir}/multi_class_models/final__CP.json
//! {models_dir}/multi_class_models/shuffled_baseline__DP.json
//! {models_dir}/single_class_models/Large_models/final__CP_and_DP.json
//! ```
//!
//! Listing a directory returns files sorted by name, so `final` models come
//! before `shuffled_baseline` ones.

use crate::error::{LearningError, Result};
use crate::estimator::Classifier;
use crate::grid_search::ParamPoint;
use crate::logistic::LogisticRegression;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use pheno_processing::FeatureType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Directory of multi-class models below the models root.
pub const MULTI_CLASS_DIR: &str = "multi_class_models";

/// Directory of single-class models below the models root.
pub const SINGLE_CLASS_DIR: &str = "single_class_models";

/// Whether a model was trained on real or permuted labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Final,
    ShuffledBaseline,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Final => "final",
            Self::ShuffledBaseline => "shuffled_baseline",
        }
    }

    pub fn all() -> [ModelType; 2] {
        [Self::Final, Self::ShuffledBaseline]
    }

    /// Baseline models are trained on shuffled labels.
    pub fn is_shuffled(&self) -> bool {
        matches!(self, Self::ShuffledBaseline)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "final" => Ok(Self::Final),
            "shuffled_baseline" => Ok(Self::ShuffledBaseline),
            other => Err(LearningError::InvalidConfig(format!(
                "unknown model type '{other}'"
            ))),
        }
    }
}

/// `{model_type}__{feature_type}.json`
pub fn model_file_name(model_type: ModelType, feature_type: FeatureType) -> String {
    format!("{}__{}.json", model_type.as_str(), feature_type.as_str())
}

/// Inverse of [`model_file_name`]. `None` for unrelated files.
pub fn parse_model_file_name(path: &Path) -> Option<(ModelType, FeatureType)> {
    if path.extension()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (model_type, feature_type) = stem.split_once("__")?;
    Some((model_type.parse().ok()?, feature_type.parse().ok()?))
}

pub fn multi_class_dir(models_dir: &Path) -> PathBuf {
    models_dir.join(MULTI_CLASS_DIR)
}

pub fn single_class_dir(models_dir: &Path, phenotypic_class: &str) -> PathBuf {
    models_dir
        .join(SINGLE_CLASS_DIR)
        .join(format!("{phenotypic_class}_models"))
}

/// Model files in `dir`, sorted by file name.
pub fn list_models(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LearningError::ModelNotFound {
            path: dir.display().to_string(),
        });
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if parse_model_file_name(&path).is_some() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// A fitted estimator with the metadata needed to evaluate it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model_type: ModelType,
    pub feature_type: FeatureType,
    /// Positive class of a one-vs-rest model; `None` for multi-class models.
    pub phenotypic_class: Option<String>,
    pub estimator: LogisticRegression,
    pub best_params: ParamPoint,
    /// Mean held-out accuracy of the grid search's best point.
    pub cv_score: f64,
    /// Feature columns in the order the estimator expects them.
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn file_name(&self) -> String {
        model_file_name(self.model_type, self.feature_type)
    }

    pub fn classes(&self) -> Result<&[String]> {
        self.estimator.classes()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<String>> {
        self.estimator.predict(x)
    }

    /// Write the model into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, self)?;
        info!("Model saved to: {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LearningError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        let reader = BufReader::new(File::open(path)?);
        let model: Self = serde_json::from_reader(reader)?;
        if !model.estimator.is_fitted() {
            return Err(LearningError::NotFitted);
        }
        Ok(model)
    }
}
