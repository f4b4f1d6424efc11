//! Stratified k-fold cross-validation.
//!
//! Folds are built without shuffling: classes are encoded in order of first
//! appearance, the sorted encoded labels are dealt round-robin into `k`
//! buckets to get per-fold class counts, and each class's rows (in data order)
//! are then assigned to folds in contiguous runs of those counts. Every fold
//! therefore holds close to `1/k` of each class.

use crate::error::{LearningError, Result};
use crate::estimator::Classifier;
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Default number of folds.
pub const DEFAULT_N_SPLITS: usize = 10;

/// Row indices of one fold. Both lists are ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Unshuffled stratified k-fold splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl Default for StratifiedKFold {
    fn default() -> Self {
        Self::new(DEFAULT_N_SPLITS)
    }
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Fold id of every row.
    pub fn test_folds(&self, y: &[String]) -> Result<Vec<usize>> {
        let k = self.n_splits;
        if k < 2 {
            return Err(LearningError::InvalidConfig(format!(
                "number of folds must be at least 2, got {k}"
            )));
        }
        if k > y.len() {
            return Err(LearningError::InvalidConfig(format!(
                "cannot make {k} folds from {} samples",
                y.len()
            )));
        }

        let mut codes: HashMap<&str, usize> = HashMap::new();
        let encoded: Vec<usize> = y
            .iter()
            .map(|label| {
                let next = codes.len();
                *codes.entry(label.as_str()).or_insert(next)
            })
            .collect();
        let n_classes = codes.len();

        let mut class_counts = vec![0usize; n_classes];
        for &c in &encoded {
            class_counts[c] += 1;
        }
        if class_counts.iter().all(|&count| count < k) {
            return Err(LearningError::InvalidConfig(format!(
                "{k} folds exceed the number of members of every class"
            )));
        }
        if let Some(&smallest) = class_counts.iter().min() {
            if smallest < k {
                warn!(
                    "The least populated class has only {} members, fewer than {} folds",
                    smallest, k
                );
            }
        }

        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        // allocation[fold][class]
        let mut allocation = vec![vec![0usize; n_classes]; k];
        for (position, &c) in sorted.iter().enumerate() {
            allocation[position % k][c] += 1;
        }

        let mut fold_runs: Vec<std::vec::IntoIter<usize>> = (0..n_classes)
            .map(|c| {
                (0..k)
                    .flat_map(|fold| std::iter::repeat_n(fold, allocation[fold][c]))
                    .collect::<Vec<_>>()
                    .into_iter()
            })
            .collect();

        encoded
            .iter()
            .map(|&c| {
                fold_runs[c].next().ok_or_else(|| {
                    LearningError::InvalidData("fold allocation is inconsistent".to_string())
                })
            })
            .collect()
    }

    /// Train/test indices for every fold.
    pub fn split(&self, y: &[String]) -> Result<Vec<Fold>> {
        let test_folds = self.test_folds(y)?;
        let folds: Vec<Fold> = (0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..y.len()).partition(|&i| test_folds[i] == fold);
                Fold { train, test }
            })
            .collect();

        if let Some(empty) = folds.iter().position(|f| f.test.is_empty()) {
            return Err(LearningError::InvalidData(format!("fold {empty} is empty")));
        }
        Ok(folds)
    }
}

/// Per-fold scores and the estimators fitted on each fold.
#[derive(Debug, Clone)]
pub struct CvResults<C> {
    /// Held-out accuracy per fold.
    pub test_scores: Vec<f64>,
    pub estimators: Vec<C>,
}

impl<C> CvResults<C> {
    pub fn mean_score(&self) -> f64 {
        if self.test_scores.is_empty() {
            return 0.0;
        }
        self.test_scores.iter().sum::<f64>() / self.test_scores.len() as f64
    }
}

fn subset(x: &Array2<f64>, y: &[String], rows: &[usize]) -> (Array2<f64>, Vec<String>) {
    (
        x.select(Axis(0), rows),
        rows.iter().map(|&i| y[i].clone()).collect(),
    )
}

fn check_lengths(x: &Array2<f64>, y: &[String]) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(LearningError::InvalidData(format!(
            "feature matrix has {} rows but {} labels were given",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

/// Fit one clone of `estimator` per fold and score it on the held-out rows.
pub fn cross_validate<C: Classifier>(
    estimator: &C,
    x: &Array2<f64>,
    y: &[String],
    cv: &StratifiedKFold,
) -> Result<CvResults<C>> {
    check_lengths(x, y)?;
    let folds = cv.split(y)?;

    let fitted: Vec<(f64, C)> = folds
        .par_iter()
        .map(|fold| {
            let (x_train, y_train) = subset(x, y, &fold.train);
            let (x_test, y_test) = subset(x, y, &fold.test);
            let mut model = estimator.clone();
            model.fit(&x_train, &y_train)?;
            let score = model.score(&x_test, &y_test)?;
            Ok((score, model))
        })
        .collect::<Result<_>>()?;

    let (test_scores, estimators): (Vec<f64>, Vec<C>) = fitted.into_iter().unzip();
    debug!("Cross-validation scores: {:?}", test_scores);
    Ok(CvResults {
        test_scores,
        estimators,
    })
}

/// Out-of-fold prediction for every row, aligned with `y`.
pub fn cross_val_predict<C: Classifier>(
    estimator: &C,
    x: &Array2<f64>,
    y: &[String],
    cv: &StratifiedKFold,
) -> Result<Vec<String>> {
    check_lengths(x, y)?;
    let folds = cv.split(y)?;

    let per_fold: Vec<(Vec<usize>, Vec<String>)> = folds
        .par_iter()
        .map(|fold| {
            let (x_train, y_train) = subset(x, y, &fold.train);
            let x_test = x.select(Axis(0), &fold.test);
            let mut model = estimator.clone();
            model.fit(&x_train, &y_train)?;
            Ok((fold.test.clone(), model.predict(&x_test)?))
        })
        .collect::<Result<_>>()?;

    let mut predictions = vec![String::new(); y.len()];
    for (rows, labels) in per_fold {
        for (row, label) in rows.into_iter().zip(labels) {
            predictions[row] = label;
        }
    }
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    /// Predicts the most frequent training label.
    #[derive(Debug, Clone, Default)]
    struct Majority {
        label: Option<String>,
    }

    impl Classifier for Majority {
        fn fit(&mut self, _x: &Array2<f64>, y: &[String]) -> Result<()> {
            let mut counts: HashMap<&String, usize> = HashMap::new();
            for label in y {
                *counts.entry(label).or_default() += 1;
            }
            self.label = counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
                .map(|(label, _)| label.clone());
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Vec<String>> {
            let label = self.label.clone().ok_or(LearningError::NotFitted)?;
            Ok(vec![label; x.nrows()])
        }
    }

    // =========================================================================
    // Fold assignment
    // =========================================================================

    #[test]
    fn test_folds_are_stratified() {
        let y = labels(&["a", "a", "a", "a", "b", "b", "b", "b"]);
        let folds = StratifiedKFold::new(2).split(&y).unwrap();

        assert_eq!(folds[0].test, vec![0, 1, 4, 5]);
        assert_eq!(folds[1].test, vec![2, 3, 6, 7]);
        assert_eq!(folds[0].train, vec![2, 3, 6, 7]);
    }

    #[test]
    fn test_uneven_classes_match_round_robin_allocation() {
        // sorted codes [0,0,0,0,0,1,1,1] dealt into 3 buckets:
        // fold0 gets 2 of a and 1 of b, fold1 2 of a and 1 of b, fold2 1 of a and 1 of b
        let y = labels(&["a", "b", "a", "a", "b", "a", "b", "a"]);
        let folds = StratifiedKFold::new(3).test_folds(&y).unwrap();
        assert_eq!(folds, vec![0, 0, 0, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn test_every_row_tested_once() {
        let y: Vec<String> = (0..37).map(|i| format!("c{}", i % 4)).collect();
        let folds = StratifiedKFold::new(10).split(&y).unwrap();

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..37).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 37);
        }
    }

    #[test]
    fn test_invalid_fold_counts() {
        let y = labels(&["a", "b", "a", "b"]);
        assert!(matches!(
            StratifiedKFold::new(1).split(&y),
            Err(LearningError::InvalidConfig(_))
        ));
        assert!(matches!(
            StratifiedKFold::new(5).split(&y),
            Err(LearningError::InvalidConfig(_))
        ));
        assert!(matches!(
            StratifiedKFold::new(3).split(&y),
            Err(LearningError::InvalidConfig(_))
        ));
    }

    // =========================================================================
    // Cross-validation
    // =========================================================================

    #[test]
    fn test_cross_validate_returns_one_estimator_per_fold() {
        let x = Array2::zeros((6, 1));
        let y = labels(&["a", "a", "a", "a", "b", "b"]);
        let results =
            cross_validate(&Majority::default(), &x, &y, &StratifiedKFold::new(2)).unwrap();

        assert_eq!(results.estimators.len(), 2);
        assert_eq!(results.test_scores.len(), 2);
        assert!((0.0..=1.0).contains(&results.mean_score()));
    }

    #[test]
    fn test_cross_val_predict_aligns_with_rows() {
        let x = Array2::zeros((6, 1));
        let y = labels(&["a", "a", "a", "a", "b", "b"]);
        let predictions =
            cross_val_predict(&Majority::default(), &x, &y, &StratifiedKFold::new(2)).unwrap();
        assert_eq!(predictions, vec!["a"; 6]);
    }

    #[test]
    fn test_length_mismatch() {
        let x = Array2::zeros((3, 1));
        let y = labels(&["a", "b"]);
        assert!(matches!(
            cross_validate(&Majority::default(), &x, &y, &StratifiedKFold::new(2)),
            Err(LearningError::InvalidData(_))
        ));
    }
}
