//! Coefficient aggregation across cross-validation fold estimators.
//!
//! The fold estimators' coefficient matrices are averaged and made absolute,
//! giving one importance value per (feature, class). The table then feeds
//! ranked bar charts, heatmaps (optionally clustered) and per-class density
//! curves.

use crate::error::{LearningError, Result};
use crate::logistic::LogisticRegression;
use ndarray::{Array2, ArrayView1, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Absolute mean coefficients, `n_features × n_classes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientTable {
    pub feature_names: Vec<String>,
    pub classes: Vec<String>,
    pub values: Array2<f64>,
}

/// Average the coefficient matrices of `estimators` and take absolute values.
///
/// # Errors
///
/// [`LearningError::InvalidData`] when the list is empty, the estimators
/// disagree on shape or classes, or `feature_names` does not match the
/// coefficient width.
pub fn average_feature_weights(
    estimators: &[LogisticRegression],
    feature_names: &[String],
) -> Result<CoefficientTable> {
    let first = estimators.first().ok_or_else(|| {
        LearningError::InvalidData("no estimators to average".to_string())
    })?;
    let classes = first.classes()?.to_vec();
    let mut sum = first.coef()?.clone();

    for estimator in &estimators[1..] {
        let coef = estimator.coef()?;
        if coef.dim() != sum.dim() || estimator.classes()? != classes.as_slice() {
            return Err(LearningError::InvalidData(format!(
                "estimator coefficients {:?} do not match {:?}",
                coef.dim(),
                sum.dim()
            )));
        }
        sum += coef;
    }

    if feature_names.len() != sum.ncols() {
        return Err(LearningError::InvalidData(format!(
            "{} feature names for {} coefficients",
            feature_names.len(),
            sum.ncols()
        )));
    }

    let mean = sum / estimators.len() as f64;
    Ok(CoefficientTable {
        feature_names: feature_names.to_vec(),
        classes,
        values: mean.t().mapv(f64::abs),
    })
}

fn ranked(names: &[String], means: Vec<f64>) -> Vec<(String, f64)> {
    let mut pairs: Vec<(String, f64)> = names.iter().cloned().zip(means).collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    pairs
}

impl CoefficientTable {
    pub fn n_features(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.values.ncols()
    }

    pub fn class_column(&self, class: &str) -> Option<ArrayView1<'_, f64>> {
        let j = self.classes.iter().position(|c| c == class)?;
        Some(self.values.column(j))
    }

    /// Mean coefficient per class, highest first.
    pub fn class_means(&self) -> Vec<(String, f64)> {
        let means = self
            .values
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        ranked(&self.classes, means)
    }

    /// Mean coefficient per feature, highest first.
    pub fn feature_means(&self) -> Vec<(String, f64)> {
        let means = self
            .values
            .mean_axis(Axis(1))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        ranked(&self.feature_names, means)
    }

    /// Average-linkage leaf order of features (rows) and classes (columns).
    pub fn cluster_order(&self) -> (Vec<usize>, Vec<usize>) {
        (
            average_linkage_order(&self.values),
            average_linkage_order(&self.values.t().to_owned()),
        )
    }

    /// Table with rows and columns permuted.
    pub fn reordered(&self, rows: &[usize], cols: &[usize]) -> CoefficientTable {
        CoefficientTable {
            feature_names: rows.iter().map(|&i| self.feature_names[i].clone()).collect(),
            classes: cols.iter().map(|&j| self.classes[j].clone()).collect(),
            values: self.values.select(Axis(0), rows).select(Axis(1), cols),
        }
    }

    /// Gaussian KDE of one class's coefficients evaluated on `grid`.
    pub fn density(&self, class: &str, grid: &[f64]) -> Result<Vec<f64>> {
        let column = self.class_column(class).ok_or_else(|| {
            LearningError::InvalidData(format!("unknown class '{class}'"))
        })?;
        gaussian_kde(&column.to_vec(), grid)
    }

    /// `n` evenly spaced points covering every coefficient value.
    pub fn value_grid(&self, n: usize) -> Vec<f64> {
        let min = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !min.is_finite() || !max.is_finite() {
            return Vec::new();
        }
        crate::grid_search::linspace(min, max, n)
    }

    /// `feature` column followed by one column per class.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns = vec![Column::new("feature".into(), self.feature_names.clone())];
        for (j, class) in self.classes.iter().enumerate() {
            columns.push(Column::new(
                class.as_str().into(),
                self.values.column(j).to_vec(),
            ));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Gaussian kernel density estimate with Scott's bandwidth
/// `h = σ · n^(-1/5)` (σ with one degree of freedom removed).
///
/// Fails when fewer than two values are given or they have no spread.
pub fn gaussian_kde(values: &[f64], grid: &[f64]) -> Result<Vec<f64>> {
    let n = values.len();
    if n < 2 {
        return Err(LearningError::InvalidData(
            "density needs at least two values".to_string(),
        ));
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let bandwidth = variance.sqrt() * (n as f64).powf(-0.2);
    if bandwidth.is_nan() || bandwidth <= 0.0 {
        return Err(LearningError::InvalidData(
            "density is undefined for constant values".to_string(),
        ));
    }

    let norm = 1.0 / (n as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
    Ok(grid
        .iter()
        .map(|&x| {
            norm * values
                .iter()
                .map(|&v| (-0.5 * ((x - v) / bandwidth).powi(2)).exp())
                .sum::<f64>()
        })
        .collect())
}

fn euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Leaf order of an average-linkage (UPGMA) dendrogram over the rows of
/// `points`, Euclidean distance.
///
/// Built with the nearest-neighbour chain algorithm and Lance–Williams
/// distance updates.
pub fn average_linkage_order(points: &Array2<f64>) -> Vec<usize> {
    let n = points.nrows();
    if n < 2 {
        return (0..n).collect();
    }

    let mut dist = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean(points.row(i), points.row(j));
            dist[[i, j]] = d;
            dist[[j, i]] = d;
        }
    }

    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    // dendrogram node currently stored in each slot; leaves are 0..n
    let mut node = (0..n).collect::<Vec<usize>>();
    let mut children: Vec<(usize, usize)> = Vec::with_capacity(n - 1);
    let mut chain: Vec<usize> = Vec::new();
    let mut remaining = n;

    while remaining > 1 {
        if chain.is_empty() {
            if let Some(start) = active.iter().position(|&a| a) {
                chain.push(start);
            }
        }
        let Some(&a) = chain.last() else { break };
        let previous = chain.len().checked_sub(2).map(|i| chain[i]);

        let mut nearest = previous.unwrap_or(usize::MAX);
        let mut nearest_dist = previous.map_or(f64::INFINITY, |p| dist[[a, p]]);
        for k in 0..n {
            if active[k] && k != a && dist[[a, k]] < nearest_dist {
                nearest = k;
                nearest_dist = dist[[a, k]];
            }
        }

        if Some(nearest) != previous {
            chain.push(nearest);
            continue;
        }

        chain.truncate(chain.len() - 2);
        let (keep, drop) = (a.min(nearest), a.max(nearest));
        let (size_keep, size_drop) = (size[keep] as f64, size[drop] as f64);
        for k in 0..n {
            if active[k] && k != keep && k != drop {
                let d = (size_keep * dist[[keep, k]] + size_drop * dist[[drop, k]])
                    / (size_keep + size_drop);
                dist[[keep, k]] = d;
                dist[[k, keep]] = d;
            }
        }

        children.push((node[keep], node[drop]));
        node[keep] = n + children.len() - 1;
        size[keep] += size[drop];
        active[drop] = false;
        remaining -= 1;
    }

    // depth-first walk from the root, left child first
    let mut order = Vec::with_capacity(n);
    let mut stack = vec![n + children.len() - 1];
    while let Some(id) = stack.pop() {
        if id < n {
            order.push(id);
        } else {
            let (left, right) = children[id - n];
            stack.push(right);
            stack.push(left);
        }
    }
    order
}
