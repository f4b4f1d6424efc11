//! Training runs for multi-class and one-vs-rest models.
//!
//! Each run grid-searches `C × l1_ratio`, refits the best point, then
//! cross-validates the refitted estimator to collect fold estimators (for
//! coefficient averaging) and out-of-fold predictions (for the confusion
//! matrix and per-class precision).

use crate::coefficients::{CoefficientTable, average_feature_weights};
use crate::config::TrainingConfig;
use crate::cv::{CvResults, cross_val_predict, cross_validate};
use crate::error::Result;
use crate::grid_search::{GridSearchCV, GridSearchResult, ParamPoint};
use crate::logistic::LogisticRegression;
use crate::metrics::{ClassScores, ConfusionMatrix, confusion_matrix, precision_per_class};
use crate::model::{ModelType, TrainedModel, multi_class_dir, single_class_dir};
use chrono::Utc;
use pheno_processing::{
    DataSplit, DatasetConfig, FeatureType, LabeledData, SplitIndex, get_dataset,
    get_scm_model_data, get_x_y, shuffle_labels, string_values,
};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything produced by one training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub grid_search: GridSearchResult,
    pub cv_results: CvResults<LogisticRegression>,
    /// Out-of-fold predictions aligned with `labels`.
    pub predictions: Vec<String>,
    /// Labels the model was trained on (shuffled for baselines).
    pub labels: Vec<String>,
    pub confusion_matrix: ConfusionMatrix,
    pub precision: ClassScores,
    pub coefficients: CoefficientTable,
}

impl TrainingOutcome {
    pub fn cv_mean_accuracy(&self) -> f64 {
        self.cv_results.mean_score()
    }
}

/// Train one model on already extracted data.
pub fn train_model(
    data: &LabeledData,
    model_type: ModelType,
    feature_type: FeatureType,
    config: &TrainingConfig,
) -> Result<TrainingOutcome> {
    let labels = if model_type.is_shuffled() {
        shuffle_labels(&data.labels, config.seed)
    } else {
        data.labels.clone()
    };

    let cv = config.cv();
    let grid_search = GridSearchCV::new(config.estimator(), config.param_grid.clone(), cv)
        .with_n_jobs(config.n_jobs)
        .fit(&data.x, &labels)?;

    let ParamPoint { c, l1_ratio } = grid_search.best_params;
    let template = config.estimator().with_params(c, l1_ratio);
    let cv_results = cross_validate(&template, &data.x, &labels, &cv)?;
    let predictions = cross_val_predict(&template, &data.x, &labels, &cv)?;

    let classes = grid_search.best_estimator.classes()?.to_vec();
    let confusion_matrix = confusion_matrix(&labels, &predictions, &classes);
    let precision = precision_per_class(&labels, &predictions);
    let coefficients = average_feature_weights(&cv_results.estimators, &data.feature_names)?;

    info!(
        "Trained {} {} model: C={}, l1_ratio={}, CV accuracy {:.4}",
        model_type,
        feature_type,
        c,
        l1_ratio,
        cv_results.mean_score()
    );

    let model = TrainedModel {
        model_type,
        feature_type,
        phenotypic_class: None,
        estimator: grid_search.best_estimator.clone(),
        best_params: grid_search.best_params,
        cv_score: grid_search.best_score,
        feature_names: data.feature_names.clone(),
        trained_at: Utc::now(),
    };

    Ok(TrainingOutcome {
        model,
        grid_search,
        cv_results,
        predictions,
        labels,
        confusion_matrix,
        precision,
        coefficients,
    })
}

/// Multi-class model on the rows of `train`.
pub fn train_multi_class(
    train: &DataFrame,
    model_type: ModelType,
    feature_type: FeatureType,
    dataset: &DatasetConfig,
    config: &TrainingConfig,
) -> Result<TrainingOutcome> {
    let data = get_x_y(train, feature_type, dataset)?;
    train_model(&data, model_type, feature_type, config)
}

/// One-vs-rest model of `phenotypic_class` on the rows of `train`, with
/// negatives down-sampled to the number of positives.
pub fn train_single_class(
    train: &DataFrame,
    phenotypic_class: &str,
    model_type: ModelType,
    feature_type: FeatureType,
    dataset: &DatasetConfig,
    config: &TrainingConfig,
) -> Result<TrainingOutcome> {
    let scm_data = get_scm_model_data(
        train,
        phenotypic_class,
        DataSplit::Train,
        dataset,
        config.seed,
    )?;
    let data = get_x_y(&scm_data, feature_type, dataset)?;

    let mut outcome = train_model(&data, model_type, feature_type, config)?;
    outcome.model.phenotypic_class = Some(phenotypic_class.to_string());
    Ok(outcome)
}

/// Summary line of a persisted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub phenotypic_class: Option<String>,
    pub model_type: ModelType,
    pub feature_type: FeatureType,
    pub best_params: ParamPoint,
    pub cv_score: f64,
    pub cv_mean_accuracy: f64,
    pub path: PathBuf,
}

impl TrainingRecord {
    fn new(outcome: &TrainingOutcome, path: PathBuf) -> Self {
        Self {
            phenotypic_class: outcome.model.phenotypic_class.clone(),
            model_type: outcome.model.model_type,
            feature_type: outcome.model.feature_type,
            best_params: outcome.model.best_params,
            cv_score: outcome.model.cv_score,
            cv_mean_accuracy: outcome.cv_mean_accuracy(),
            path,
        }
    }
}

/// Train and persist every multi-class model (feature type × model type) on
/// the train split. `on_outcome` sees each run before it is saved.
pub fn train_multi_class_models(
    features: &DataFrame,
    split_index: &SplitIndex,
    models_dir: &Path,
    dataset: &DatasetConfig,
    config: &TrainingConfig,
    mut on_outcome: impl FnMut(&TrainingOutcome),
) -> Result<Vec<TrainingRecord>> {
    let train = get_dataset(features, split_index, DataSplit::Train, dataset)?;
    let dir = multi_class_dir(models_dir);
    let mut records = Vec::new();

    for feature_type in FeatureType::all() {
        for model_type in ModelType::all() {
            let outcome = train_multi_class(&train, model_type, feature_type, dataset, config)?;
            on_outcome(&outcome);
            let path = outcome.model.save(&dir)?;
            records.push(TrainingRecord::new(&outcome, path));
        }
    }
    Ok(records)
}

/// Train and persist every one-vs-rest model (class × model type × feature
/// type) on the train split.
pub fn train_single_class_models(
    features: &DataFrame,
    split_index: &SplitIndex,
    models_dir: &Path,
    dataset: &DatasetConfig,
    config: &TrainingConfig,
) -> Result<Vec<TrainingRecord>> {
    let train = get_dataset(features, split_index, DataSplit::Train, dataset)?;
    let classes: BTreeSet<String> = string_values(&train, &dataset.label_column)?
        .into_iter()
        .collect();
    let mut records = Vec::new();

    for phenotypic_class in &classes {
        info!("Training single-class models for '{}'", phenotypic_class);
        let dir = single_class_dir(models_dir, phenotypic_class);
        for model_type in ModelType::all() {
            for feature_type in FeatureType::all() {
                let outcome = train_single_class(
                    &train,
                    phenotypic_class,
                    model_type,
                    feature_type,
                    dataset,
                    config,
                )?;
                let path = outcome.model.save(&dir)?;
                records.push(TrainingRecord::new(&outcome, path));
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_search::ParamGrid;
    use ndarray::Array2;
    use rand::prelude::*;

    fn blobs(seed: u64) -> LabeledData {
        let mut rng = StdRng::seed_from_u64(seed);
        let centers = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
        let classes = ["Interphase", "Large", "Prometaphase"];

        let mut x = Array2::zeros((30, 2));
        let mut labels = Vec::new();
        for i in 0..30 {
            let (cx, cy) = centers[i % 3];
            x[[i, 0]] = cx + rng.gen_range(-0.1..0.1);
            x[[i, 1]] = cy + rng.gen_range(-0.1..0.1);
            labels.push(classes[i % 3].to_string());
        }
        LabeledData {
            x,
            labels,
            feature_names: vec!["CP__a".to_string(), "CP__b".to_string()],
        }
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig::builder()
            .cv_folds(3)
            .param_grid(ParamGrid::new(vec![1.0, 100.0], vec![0.0, 0.5]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_train_model_outputs_are_consistent() {
        let data = blobs(1);
        let outcome =
            train_model(&data, ModelType::Final, FeatureType::Cp, &small_config()).unwrap();

        assert_eq!(outcome.cv_results.estimators.len(), 3);
        assert_eq!(outcome.predictions.len(), 30);
        assert_eq!(outcome.confusion_matrix.total(), 30);
        assert_eq!(outcome.coefficients.values.dim(), (2, 3));
        assert!(outcome.cv_mean_accuracy() > 0.9);
        assert!(outcome.model.estimator.is_fitted());
    }

    #[test]
    fn test_shuffled_baseline_trains_on_permuted_labels() {
        let data = blobs(2);
        let config = small_config();
        let outcome =
            train_model(&data, ModelType::ShuffledBaseline, FeatureType::Cp, &config).unwrap();

        assert_eq!(outcome.labels, shuffle_labels(&data.labels, config.seed));
        assert_ne!(outcome.labels, data.labels);
        assert!(outcome.model.model_type.is_shuffled());
    }
}
