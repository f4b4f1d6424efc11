//! Exhaustive cross-validated search over `C × l1_ratio`.

use crate::cv::{StratifiedKFold, cross_validate};
use crate::error::{LearningError, Result};
use crate::estimator::Classifier;
use crate::logistic::LogisticRegression;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// `n` values evenly spaced in log10 between `10^start` and `10^stop`.
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    linspace(start, stop, n)
        .into_iter()
        .map(|exponent| 10f64.powf(exponent))
        .collect()
}

/// `n` values evenly spaced between `start` and `stop`, both included.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..n)
            .map(|i| start + (stop - start) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// One point of the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamPoint {
    #[serde(rename = "C")]
    pub c: f64,
    pub l1_ratio: f64,
}

/// Cartesian grid of regularisation strengths and elastic-net mixings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    #[serde(rename = "C")]
    pub c_values: Vec<f64>,
    pub l1_ratios: Vec<f64>,
}

impl Default for ParamGrid {
    /// `C = logspace(-3, 3, 7)`, `l1_ratio = linspace(0, 1, 11)`.
    fn default() -> Self {
        Self {
            c_values: logspace(-3.0, 3.0, 7),
            l1_ratios: linspace(0.0, 1.0, 11),
        }
    }
}

impl ParamGrid {
    pub fn new(c_values: Vec<f64>, l1_ratios: Vec<f64>) -> Self {
        Self {
            c_values,
            l1_ratios,
        }
    }

    /// Grid points, `C`-major.
    pub fn points(&self) -> Vec<ParamPoint> {
        self.c_values
            .iter()
            .flat_map(|&c| self.l1_ratios.iter().map(move |&l1_ratio| ParamPoint { c, l1_ratio }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.c_values.len() * self.l1_ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, point: &ParamPoint) -> bool {
        self.c_values.contains(&point.c) && self.l1_ratios.contains(&point.l1_ratio)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(LearningError::InvalidConfig(
                "parameter grid must contain at least one C and one l1_ratio".to_string(),
            ));
        }
        if let Some(c) = self.c_values.iter().find(|c| !(c.is_finite() && **c > 0.0)) {
            return Err(LearningError::InvalidConfig(format!(
                "C values must be positive, got {c}"
            )));
        }
        if let Some(r) = self.l1_ratios.iter().find(|r| !(0.0..=1.0).contains(*r)) {
            return Err(LearningError::InvalidConfig(format!(
                "l1_ratio values must be in [0, 1], got {r}"
            )));
        }
        Ok(())
    }
}

/// Cross-validated score of one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPointScore {
    pub params: ParamPoint,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Outcome of a grid search.
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_params: ParamPoint,
    pub best_score: f64,
    /// Refitted on all rows with `best_params`.
    pub best_estimator: LogisticRegression,
    /// One entry per grid point, in grid order.
    pub cv_results: Vec<GridPointScore>,
}

/// Grid search over a [`LogisticRegression`] template.
#[derive(Debug, Clone)]
pub struct GridSearchCV {
    estimator: LogisticRegression,
    grid: ParamGrid,
    cv: StratifiedKFold,
    n_jobs: Option<usize>,
}

impl GridSearchCV {
    pub fn new(estimator: LogisticRegression, grid: ParamGrid, cv: StratifiedKFold) -> Self {
        Self {
            estimator,
            grid,
            cv,
            n_jobs: None,
        }
    }

    /// Evaluate grid points on a dedicated pool of `n_jobs` threads.
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Score every grid point, pick the best mean accuracy (first in grid
    /// order on ties) and refit it on all rows.
    pub fn fit(&self, x: &Array2<f64>, y: &[String]) -> Result<GridSearchResult> {
        self.grid.validate()?;
        let points = self.grid.points();
        info!(
            "Grid search over {} points x {} folds",
            points.len(),
            self.cv.n_splits()
        );

        let evaluate = || -> Result<Vec<GridPointScore>> {
            points
                .par_iter()
                .map(|point| {
                    let candidate = self.estimator.with_params(point.c, point.l1_ratio);
                    let results = cross_validate(&candidate, x, y, &self.cv)?;
                    Ok(GridPointScore {
                        params: *point,
                        mean_score: results.mean_score(),
                        fold_scores: results.test_scores,
                    })
                })
                .collect()
        };

        let cv_results = match self.n_jobs {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| LearningError::InvalidConfig(format!("thread pool: {e}")))?
                .install(evaluate)?,
            None => evaluate()?,
        };

        let mut best = 0;
        for (i, result) in cv_results.iter().enumerate() {
            if result.mean_score > cv_results[best].mean_score {
                best = i;
            }
        }
        let best_params = cv_results[best].params;
        let best_score = cv_results[best].mean_score;
        debug!("Best grid point: {:?} ({:.4})", best_params, best_score);

        let mut best_estimator = self.estimator.with_params(best_params.c, best_params.l1_ratio);
        best_estimator.fit(x, y)?;

        info!(
            "Grid search finished: C={}, l1_ratio={}, mean accuracy {:.4}",
            best_params.c, best_params.l1_ratio, best_score
        );
        Ok(GridSearchResult {
            best_params,
            best_score,
            best_estimator,
            cv_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn two_blobs() -> (Array2<f64>, Vec<String>) {
        let x = array![
            [0.0, 0.1],
            [0.1, 0.0],
            [0.2, 0.1],
            [0.1, 0.2],
            [1.0, 0.9],
            [0.9, 1.0],
            [1.1, 1.0],
            [1.0, 1.1],
        ];
        (x, labels(&["a", "a", "a", "a", "b", "b", "b", "b"]))
    }

    #[test]
    fn test_default_grid() {
        let grid = ParamGrid::default();
        assert_eq!(grid.c_values.len(), 7);
        assert_eq!(grid.l1_ratios.len(), 11);
        assert!((grid.c_values[0] - 1e-3).abs() < 1e-15);
        assert!((grid.c_values[6] - 1e3).abs() < 1e-9);
        assert_eq!(grid.l1_ratios[0], 0.0);
        assert_eq!(grid.l1_ratios[10], 1.0);
        assert_eq!(grid.points().len(), 77);
    }

    #[test]
    fn test_points_are_c_major() {
        let grid = ParamGrid::new(vec![0.1, 1.0], vec![0.0, 0.5]);
        let points = grid.points();
        assert_eq!(points[1], ParamPoint { c: 0.1, l1_ratio: 0.5 });
        assert_eq!(points[2], ParamPoint { c: 1.0, l1_ratio: 0.0 });
    }

    #[test]
    fn test_invalid_grid() {
        assert!(ParamGrid::new(vec![], vec![0.5]).validate().is_err());
        assert!(ParamGrid::new(vec![-1.0], vec![0.5]).validate().is_err());
        assert!(ParamGrid::new(vec![1.0], vec![2.0]).validate().is_err());
    }

    #[test]
    fn test_fit_picks_point_from_grid() {
        let (x, y) = two_blobs();
        let grid = ParamGrid::new(vec![1e-3, 10.0], vec![0.0, 1.0]);
        let search = GridSearchCV::new(
            LogisticRegression::default(),
            grid.clone(),
            StratifiedKFold::new(2),
        );
        let result = search.fit(&x, &y).unwrap();

        assert!(grid.contains(&result.best_params));
        assert_eq!(result.cv_results.len(), 4);
        assert!(result.best_estimator.is_fitted());
        assert!(
            result
                .cv_results
                .iter()
                .all(|r| r.mean_score <= result.best_score)
        );
    }

    #[test]
    fn test_ties_resolve_to_first_grid_point() {
        // strong L1 zeroes every coefficient, so both points score the same
        let (x, y) = two_blobs();
        let grid = ParamGrid::new(vec![1e-6], vec![1.0, 0.9]);
        let result = GridSearchCV::new(LogisticRegression::default(), grid, StratifiedKFold::new(2))
            .fit(&x, &y)
            .unwrap();
        assert_eq!(result.best_params, ParamPoint { c: 1e-6, l1_ratio: 1.0 });
        assert_eq!(result.cv_results[0].mean_score, result.cv_results[1].mean_score);
    }

    #[test]
    fn test_dedicated_pool_gives_same_result() {
        let (x, y) = two_blobs();
        let grid = ParamGrid::new(vec![0.1, 10.0], vec![0.5]);
        let search =
            GridSearchCV::new(LogisticRegression::default(), grid, StratifiedKFold::new(2));

        let shared = search.fit(&x, &y).unwrap();
        let pooled = search.clone().with_n_jobs(Some(2)).fit(&x, &y).unwrap();
        assert_eq!(shared.cv_results, pooled.cv_results);
    }
}
