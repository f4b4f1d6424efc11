//! Classification metrics over string labels.
//!
//! Per-class scores are reported over the classes that were actually
//! predicted. A class with no predictions in the evaluated subset (common for
//! small single-class test sets) is left out rather than reported as zero.

use crate::error::{LearningError, Result};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Per-class score used in evaluation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Metric {
    #[default]
    F1,
    Precision,
}

impl Metric {
    /// Column name of the score in compiled tables.
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::F1 => "F1_Score",
            Self::Precision => "Precision",
        }
    }

    pub fn compute(&self, y_true: &[String], y_pred: &[String]) -> ClassScores {
        match self {
            Self::F1 => f1_per_class(y_true, y_pred),
            Self::Precision => precision_per_class(y_true, y_pred),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F1 => f.write_str("f1"),
            Self::Precision => f.write_str("precision"),
        }
    }
}

impl FromStr for Metric {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "f1" | "f1_score" => Ok(Self::F1),
            "precision" => Ok(Self::Precision),
            other => Err(LearningError::InvalidConfig(format!(
                "unknown metric '{other}' (expected f1 or precision)"
            ))),
        }
    }
}

/// Scores keyed by class, sorted by class name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

impl ClassScores {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.scores[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels.iter().map(String::as_str).zip(self.scores.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Fraction of matching labels. Empty input scores 0.
pub fn accuracy(y_true: &[String], y_pred: &[String]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Sorted distinct predicted labels.
pub fn predicted_labels(y_pred: &[String]) -> Vec<String> {
    y_pred
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn counts_for(label: &str, y_true: &[String], y_pred: &[String]) -> (usize, usize, usize) {
    let (mut tp, mut fp, mut fn_) = (0, 0, 0);
    for (t, p) in y_true.iter().zip(y_pred) {
        match (t == label, p == label) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    (tp, fp, fn_)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// F1 per predicted class: `2tp / (2tp + fp + fn)`.
pub fn f1_per_class(y_true: &[String], y_pred: &[String]) -> ClassScores {
    let labels = predicted_labels(y_pred);
    let scores = labels
        .iter()
        .map(|label| {
            let (tp, fp, fn_) = counts_for(label, y_true, y_pred);
            ratio(2 * tp, 2 * tp + fp + fn_)
        })
        .collect();
    ClassScores { labels, scores }
}

/// Precision per predicted class: `tp / (tp + fp)`.
pub fn precision_per_class(y_true: &[String], y_pred: &[String]) -> ClassScores {
    let labels = predicted_labels(y_pred);
    let scores = labels
        .iter()
        .map(|label| {
            let (tp, fp, _) = counts_for(label, y_true, y_pred);
            ratio(tp, tp + fp)
        })
        .collect();
    ClassScores { labels, scores }
}

/// Counts of (true, predicted) label pairs over a fixed label list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    /// Rows are true labels, columns are predicted labels.
    pub counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn get(&self, true_label: &str, predicted_label: &str) -> Option<usize> {
        let i = self.labels.iter().position(|l| l == true_label)?;
        let j = self.labels.iter().position(|l| l == predicted_label)?;
        Some(self.counts[[i, j]])
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    /// Wide table: a `True_Label` column followed by one count column per
    /// predicted label.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns = vec![Column::new("True_Label".into(), self.labels.clone())];
        for (j, label) in self.labels.iter().enumerate() {
            let values: Vec<u64> = self.counts.column(j).iter().map(|&c| c as u64).collect();
            columns.push(Column::new(label.as_str().into(), values));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Confusion matrix over `labels`. Pairs involving a label outside the list
/// are not counted.
pub fn confusion_matrix(
    y_true: &[String],
    y_pred: &[String],
    labels: &[String],
) -> ConfusionMatrix {
    let mut counts = Array2::zeros((labels.len(), labels.len()));
    for (t, p) in y_true.iter().zip(y_pred) {
        let row = labels.iter().position(|l| l == t);
        let col = labels.iter().position(|l| l == p);
        if let (Some(i), Some(j)) = (row, col) {
            counts[[i, j]] += 1;
        }
    }
    ConfusionMatrix {
        labels: labels.to_vec(),
        counts,
    }
}
