//! The classifier seam used by cross-validation and grid search.

use crate::error::Result;
use ndarray::Array2;

/// A classifier that can be cloned per fold and fitted independently.
///
/// `Send + Sync` lets fold fits and grid points run on rayon workers.
pub trait Classifier: Clone + Send + Sync {
    /// Fit on `x` (`n_samples × n_features`) with one label per row.
    fn fit(&mut self, x: &Array2<f64>, y: &[String]) -> Result<()>;

    /// Predict one label per row of `x`.
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<String>>;

    /// Fraction of rows predicted correctly.
    fn score(&self, x: &Array2<f64>, y: &[String]) -> Result<f64> {
        let predictions = self.predict(x)?;
        Ok(crate::metrics::accuracy(y, &predictions))
    }
}
