//! Scoring persisted models on the data splits.
//!
//! Scores are accumulated as tidy rows
//! `(Phenotypic_Class, <metric>, data_split, shuffled, feature_type)` and
//! written as one compiled TSV per model family.

use crate::config::EvaluationConfig;
use crate::error::{LearningError, Result};
use crate::metrics::{ClassScores, ConfusionMatrix, Metric, confusion_matrix};
use crate::model::{
    ModelType, SINGLE_CLASS_DIR, TrainedModel, list_models, model_file_name, multi_class_dir,
    single_class_dir,
};
use pheno_processing::{
    DataSplit, DatasetConfig, FeatureType, SplitIndex, get_dataset, get_scm_model_data,
    get_x_y_with_columns, string_values,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// File name of the compiled multi-class scores.
pub const MULTI_CLASS_SCORES_FILE: &str = "compiled_F1_scores.tsv";

/// File name of the compiled single-class scores.
pub const SINGLE_CLASS_SCORES_FILE: &str = "compiled_SCM_F1_scores.tsv";

/// One score of one class for one model on one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub phenotypic_class: String,
    pub score: f64,
    pub data_split: DataSplit,
    pub shuffled: bool,
    pub feature_type: FeatureType,
}

/// Tidy table of [`ScoreRecord`]s for a single metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    metric: Metric,
    records: Vec<ScoreRecord>,
}

impl ScoreTable {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            records: Vec::new(),
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append one row per scored class.
    pub fn push_scores(
        &mut self,
        scores: &ClassScores,
        data_split: DataSplit,
        shuffled: bool,
        feature_type: FeatureType,
    ) {
        self.records
            .extend(scores.iter().map(|(class, score)| ScoreRecord {
                phenotypic_class: class.to_string(),
                score,
                data_split,
                shuffled,
                feature_type,
            }));
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let classes: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.phenotypic_class.as_str())
            .collect();
        let scores: Vec<f64> = self.records.iter().map(|r| r.score).collect();
        let splits: Vec<&str> = self.records.iter().map(|r| r.data_split.as_str()).collect();
        let shuffled: Vec<bool> = self.records.iter().map(|r| r.shuffled).collect();
        let feature_types: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.feature_type.as_str())
            .collect();

        Ok(DataFrame::new(vec![
            Column::new("Phenotypic_Class".into(), classes),
            Column::new(self.metric.column_name().into(), scores),
            Column::new("data_split".into(), splits),
            Column::new("shuffled".into(), shuffled),
            Column::new("feature_type".into(), feature_types),
        ])?)
    }

    /// Write the table as TSV, creating parent directories.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b'\t')
            .finish(&mut df)?;

        info!("Scores written to: {} ({} rows)", path.display(), self.len());
        Ok(())
    }
}

fn predictions(
    model: &TrainedModel,
    data: &DataFrame,
    dataset: &DatasetConfig,
) -> Result<(Vec<String>, Vec<String>)> {
    let labeled = get_x_y_with_columns(data, &model.feature_names, dataset)?;
    let predicted = model.predict(&labeled.x)?;
    Ok((labeled.labels, predicted))
}

/// Per-class score of `model` on `data`, over the predicted classes.
pub fn evaluate_model_score(
    model: &TrainedModel,
    data: &DataFrame,
    dataset: &DatasetConfig,
    metric: Metric,
) -> Result<ClassScores> {
    let (y_true, y_pred) = predictions(model, data, dataset)?;
    Ok(metric.compute(&y_true, &y_pred))
}

/// Confusion matrix of `model` on `data` over the model's classes.
pub fn evaluate_model_cm(
    model: &TrainedModel,
    data: &DataFrame,
    dataset: &DatasetConfig,
) -> Result<ConfusionMatrix> {
    let (y_true, y_pred) = predictions(model, data, dataset)?;
    Ok(confusion_matrix(&y_true, &y_pred, model.classes()?))
}

/// Confusion matrix of one multi-class model on one split.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionRecord {
    pub model_type: ModelType,
    pub feature_type: FeatureType,
    pub data_split: DataSplit,
    pub matrix: ConfusionMatrix,
}

/// Confusion matrices of every persisted multi-class model on every
/// non-empty split of the index.
pub fn evaluate_multi_class_cms(
    models_dir: &Path,
    features: &DataFrame,
    split_index: &SplitIndex,
    dataset: &DatasetConfig,
) -> Result<Vec<ConfusionRecord>> {
    let mut records = Vec::new();

    for path in list_models(&multi_class_dir(models_dir))? {
        let model = TrainedModel::load(&path)?;
        for split in split_index.labels() {
            let data = get_dataset(features, split_index, split, dataset)?;
            if data.height() == 0 {
                warn!("Split '{}' is empty", split);
                continue;
            }
            records.push(ConfusionRecord {
                model_type: model.model_type,
                feature_type: model.feature_type,
                data_split: split,
                matrix: evaluate_model_cm(&model, &data, dataset)?,
            });
        }
    }
    Ok(records)
}

/// Score every persisted multi-class model on every split of the index.
pub fn evaluate_multi_class_models(
    models_dir: &Path,
    features: &DataFrame,
    split_index: &SplitIndex,
    dataset: &DatasetConfig,
    metric: Metric,
) -> Result<ScoreTable> {
    let mut table = ScoreTable::new(metric);

    for path in list_models(&multi_class_dir(models_dir))? {
        let model = TrainedModel::load(&path)?;
        for split in split_index.labels() {
            let data = get_dataset(features, split_index, split, dataset)?;
            let scores = evaluate_model_score(&model, &data, dataset, metric)?;
            debug!("{} on {}: {} classes scored", path.display(), split, scores.len());
            table.push_scores(
                &scores,
                split,
                model.model_type.is_shuffled(),
                model.feature_type,
            );
        }
    }
    Ok(table)
}

/// Phenotypic classes of `features` that have a single-class model
/// directory, sorted.
///
/// Classes without a directory are skipped with a warning.
pub fn single_class_model_classes(
    models_dir: &Path,
    features: &DataFrame,
    dataset: &DatasetConfig,
) -> Result<Vec<String>> {
    let root = models_dir.join(SINGLE_CLASS_DIR);
    if !root.is_dir() {
        return Err(LearningError::ModelNotFound {
            path: root.display().to_string(),
        });
    }

    let labels: BTreeSet<String> = string_values(features, &dataset.label_column)?
        .into_iter()
        .collect();
    let mut classes = Vec::with_capacity(labels.len());
    for class in labels {
        if single_class_dir(models_dir, &class).is_dir() {
            classes.push(class);
        } else {
            warn!("No single-class models for '{}', skipping", class);
        }
    }
    Ok(classes)
}

/// Score every one-vs-rest model on the configured splits.
///
/// Iterates model type × feature type × split × class. Each model sees the
/// split relabeled for its own class; on the train split negatives are
/// down-sampled exactly as during training.
pub fn evaluate_single_class_models(
    models_dir: &Path,
    features: &DataFrame,
    split_index: &SplitIndex,
    dataset: &DatasetConfig,
    config: &EvaluationConfig,
) -> Result<ScoreTable> {
    let classes = single_class_model_classes(models_dir, features, dataset)?;
    let mut table = ScoreTable::new(config.metric);

    for model_type in ModelType::all() {
        for feature_type in FeatureType::all() {
            for &split in &config.single_class_splits {
                let data = get_dataset(features, split_index, split, dataset)?;
                for class in &classes {
                    let path = single_class_dir(models_dir, class)
                        .join(model_file_name(model_type, feature_type));
                    let model = TrainedModel::load(&path)?;
                    let scm_data = get_scm_model_data(&data, class, split, dataset, config.seed)?;
                    let scores = evaluate_model_score(&model, &scm_data, dataset, config.metric)?;
                    table.push_scores(&scores, split, model_type.is_shuffled(), feature_type);
                }
            }
        }
    }
    Ok(table)
}
