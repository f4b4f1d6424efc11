//! Elastic-net multinomial logistic regression.
//!
//! The model minimises
//!
//! ```text
//! (1/n) Σᵢ CE(yᵢ, softmax(W xᵢ + b)) + α [ ρ ‖W‖₁ + (1 - ρ)/2 ‖W‖²_F ]
//!
//! α = 1 / (C·n)
//! ```
//!
//! which is the `C`-weighted sum-of-losses objective divided by `C·n`. The
//! intercept is not penalised. Every class gets its own coefficient row, so a
//! binary problem yields a `2 × n_features` coefficient matrix.
//!
//! Optimisation uses FISTA (accelerated proximal gradient): a gradient step on
//! the smooth part (cross-entropy plus the L2 term) followed by soft
//! thresholding for the L1 term. The step is `1/L` with
//! `L = ½·mean‖[xᵢ, 1]‖² + α(1 - ρ)`, an upper bound of the gradient's
//! Lipschitz constant.

use crate::error::{LearningError, Result};
use crate::estimator::Classifier;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Default inverse regularisation strength.
pub const DEFAULT_C: f64 = 1.0;

/// Default solver iteration cap.
pub const DEFAULT_MAX_ITER: usize = 100;

/// Default relative tolerance on the largest coefficient update.
pub const DEFAULT_TOL: f64 = 1e-4;

/// Learned parameters of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParams {
    /// Sorted class labels; row `k` of `coef` belongs to `classes[k]`.
    pub classes: Vec<String>,
    /// `n_classes × n_features`.
    pub coef: Array2<f64>,
    pub intercept: Array1<f64>,
    pub n_iter: usize,
    pub converged: bool,
}

/// Elastic-net logistic regression classifier.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use pheno_learning::{Classifier, LogisticRegression};
///
/// let x = array![[0.0, 0.1], [0.1, 0.0], [1.0, 0.9], [0.9, 1.0]];
/// let y: Vec<String> = ["a", "a", "b", "b"].iter().map(|s| s.to_string()).collect();
///
/// let mut model = LogisticRegression::new(10.0, 0.5);
/// model.fit(&x, &y).unwrap();
/// assert_eq!(model.predict(&x).unwrap(), y);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularisation strength (> 0).
    pub c: f64,
    /// Elastic-net mixing: 0 is pure L2, 1 is pure L1.
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
    fitted: Option<FittedParams>,
}

static_assertions::assert_impl_all!(LogisticRegression: Send, Sync);

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(DEFAULT_C, 0.0)
    }
}

impl LogisticRegression {
    pub fn new(c: f64, l1_ratio: f64) -> Self {
        Self {
            c,
            l1_ratio,
            max_iter: DEFAULT_MAX_ITER,
            tol: DEFAULT_TOL,
            fitted: None,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Same hyperparameters, unfitted.
    pub fn with_params(&self, c: f64, l1_ratio: f64) -> Self {
        Self {
            c,
            l1_ratio,
            max_iter: self.max_iter,
            tol: self.tol,
            fitted: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fitted(&self) -> Result<&FittedParams> {
        self.fitted.as_ref().ok_or(LearningError::NotFitted)
    }

    pub fn classes(&self) -> Result<&[String]> {
        Ok(&self.fitted()?.classes)
    }

    /// Coefficients, `n_classes × n_features`.
    pub fn coef(&self) -> Result<&Array2<f64>> {
        Ok(&self.fitted()?.coef)
    }

    pub fn intercept(&self) -> Result<&Array1<f64>> {
        Ok(&self.fitted()?.intercept)
    }

    fn validate_params(&self) -> Result<()> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(LearningError::InvalidConfig(format!(
                "C must be positive and finite, got {}",
                self.c
            )));
        }
        if !(0.0..=1.0).contains(&self.l1_ratio) {
            return Err(LearningError::InvalidConfig(format!(
                "l1_ratio must be in [0, 1], got {}",
                self.l1_ratio
            )));
        }
        if self.max_iter == 0 {
            return Err(LearningError::InvalidConfig(
                "max_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Raw class scores `X Wᵀ + b`, `n_samples × n_classes`.
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.fitted()?;
        if x.ncols() != params.coef.ncols() {
            return Err(LearningError::InvalidData(format!(
                "expected {} features, got {}",
                params.coef.ncols(),
                x.ncols()
            )));
        }
        Ok(x.dot(&params.coef.t()) + &params.intercept)
    }

    /// Class probabilities, columns ordered as [`classes`](Self::classes).
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut scores = self.decision_function(x)?;
        softmax_rows(&mut scores);
        Ok(scores)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &[String]) -> Result<()> {
        self.validate_params()?;
        if x.nrows() != y.len() {
            return Err(LearningError::InvalidData(format!(
                "feature matrix has {} rows but {} labels were given",
                x.nrows(),
                y.len()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(LearningError::InvalidData(
                "feature matrix contains non-finite values".to_string(),
            ));
        }

        let classes: Vec<String> = y.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        if classes.len() < 2 {
            return Err(LearningError::TrainingFailed(format!(
                "need at least two classes to fit, found {:?}",
                classes
            )));
        }

        let targets = one_hot(y, &classes);
        let params = fista(x, &targets, self)?;

        if !params.converged {
            warn!(
                "Solver did not converge in {} iterations (C={}, l1_ratio={})",
                self.max_iter, self.c, self.l1_ratio
            );
        }
        debug!(
            "Fitted {} classes x {} features in {} iterations",
            classes.len(),
            x.ncols(),
            params.n_iter
        );

        self.fitted = Some(FittedParams { classes, ..params });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<String>> {
        let scores = self.decision_function(x)?;
        let classes = self.classes()?;

        Ok(scores
            .rows()
            .into_iter()
            .map(|row| classes[argmax(row.iter().copied())].clone())
            .collect())
    }
}

fn one_hot(y: &[String], classes: &[String]) -> Array2<f64> {
    let mut targets = Array2::zeros((y.len(), classes.len()));
    for (i, label) in y.iter().enumerate() {
        if let Ok(k) = classes.binary_search(label) {
            targets[[i, k]] = 1.0;
        }
    }
    targets
}

/// Index of the first maximum.
fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, value) in values.enumerate() {
        if value > best_value {
            best = i;
            best_value = value;
        }
    }
    best
}

fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// Accelerated proximal gradient on the elastic-net objective.
fn fista(
    x: &Array2<f64>,
    targets: &Array2<f64>,
    model: &LogisticRegression,
) -> Result<FittedParams> {
    let n = x.nrows() as f64;
    let n_classes = targets.ncols();
    let n_features = x.ncols();

    let alpha = 1.0 / (model.c * n);
    let l1 = alpha * model.l1_ratio;
    let l2 = alpha * (1.0 - model.l1_ratio);

    let mean_sq_norm = x.rows().into_iter().map(|r| r.dot(&r) + 1.0).sum::<f64>() / n;
    let lipschitz = 0.5 * mean_sq_norm + l2;
    let step = 1.0 / lipschitz;

    let mut coef = Array2::<f64>::zeros((n_classes, n_features));
    let mut intercept = Array1::<f64>::zeros(n_classes);
    let mut coef_y = coef.clone();
    let mut intercept_y = intercept.clone();
    let mut t = 1.0_f64;

    for iter in 1..=model.max_iter {
        let mut probs = x.dot(&coef_y.t()) + &intercept_y;
        softmax_rows(&mut probs);
        let residual = probs - targets;

        let grad = residual.t().dot(x) / n + &coef_y * l2;
        let grad_intercept = residual.sum_axis(Axis(0)) / n;

        let next_coef = (&coef_y - &(grad * step)).mapv(|v| soft_threshold(v, l1 * step));
        let next_intercept = &intercept_y - &(grad_intercept * step);

        let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
        let momentum = (t - 1.0) / t_next;

        let max_change = next_coef
            .iter()
            .zip(coef.iter())
            .chain(next_intercept.iter().zip(intercept.iter()))
            .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs()));
        let max_weight = next_coef
            .iter()
            .chain(next_intercept.iter())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));

        coef_y = &next_coef + &((&next_coef - &coef) * momentum);
        intercept_y = &next_intercept + &((&next_intercept - &intercept) * momentum);
        coef = next_coef;
        intercept = next_intercept;
        t = t_next;

        if coef.iter().chain(intercept.iter()).any(|v| !v.is_finite()) {
            return Err(LearningError::TrainingFailed(
                "solver diverged to non-finite coefficients".to_string(),
            ));
        }

        let converged = if max_weight > 0.0 {
            max_change / max_weight <= model.tol
        } else {
            max_change == 0.0
        };
        if converged {
            return Ok(FittedParams {
                classes: Vec::new(),
                coef,
                intercept,
                n_iter: iter,
                converged: true,
            });
        }
    }

    Ok(FittedParams {
        classes: Vec::new(),
        coef,
        intercept,
        n_iter: model.max_iter,
        converged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn three_clusters() -> (Array2<f64>, Vec<String>) {
        let x = array![
            [1.0, 0.0],
            [0.9, 0.1],
            [1.1, -0.1],
            [0.0, 1.0],
            [0.1, 0.9],
            [-0.1, 1.1],
            [-1.0, -1.0],
            [-0.9, -1.1],
            [-1.1, -0.9],
        ];
        let y = labels(&["a", "a", "a", "b", "b", "b", "c", "c", "c"]);
        (x, y)
    }

    // =========================================================================
    // Fitting
    // =========================================================================

    #[test]
    fn test_fit_separates_clusters() {
        let (x, y) = three_clusters();
        let mut model = LogisticRegression::new(100.0, 0.0).with_max_iter(2000);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        assert_eq!(model.classes().unwrap(), &["a", "b", "c"]);
        assert_eq!(model.coef().unwrap().dim(), (3, 2));
    }

    #[test]
    fn test_binary_problem_has_one_row_per_class() {
        let x = array![[0.0], [0.2], [1.0], [1.2]];
        let y = labels(&["Negative", "Negative", "Large", "Large"]);
        let mut model = LogisticRegression::new(10.0, 0.5);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.coef().unwrap().dim(), (2, 1));
        assert_eq!(model.classes().unwrap(), &["Large", "Negative"]);
    }

    #[test]
    fn test_strong_l1_zeroes_coefficients() {
        let (x, y) = three_clusters();
        let mut model = LogisticRegression::new(1e-3, 1.0);
        model.fit(&x, &y).unwrap();
        assert!(model.coef().unwrap().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = three_clusters();
        let mut model = LogisticRegression::new(1.0, 0.3);
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = three_clusters();
        let mut first = LogisticRegression::new(1.0, 0.5);
        let mut second = first.clone();
        first.fit(&x, &y).unwrap();
        second.fit(&x, &y).unwrap();
        assert_eq!(first, second);
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_single_class_fails() {
        let x = array![[0.0], [1.0]];
        let y = labels(&["a", "a"]);
        let mut model = LogisticRegression::default();
        assert!(matches!(
            model.fit(&x, &y),
            Err(LearningError::TrainingFailed(_))
        ));
    }

    #[test]
    fn test_invalid_hyperparameters() {
        let (x, y) = three_clusters();
        for (c, l1_ratio) in [(0.0, 0.5), (-1.0, 0.5), (1.0, 1.5), (1.0, -0.1)] {
            let mut model = LogisticRegression::new(c, l1_ratio);
            assert!(matches!(
                model.fit(&x, &y),
                Err(LearningError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::default();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(LearningError::NotFitted)
        ));
    }

    #[test]
    fn test_predict_wrong_width() {
        let (x, y) = three_clusters();
        let mut model = LogisticRegression::default();
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0, 3.0]]),
            Err(LearningError::InvalidData(_))
        ));
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_argmax_ties_pick_first() {
        assert_eq!(argmax([0.2, 0.7, 0.7].into_iter()), 1);
    }
}
