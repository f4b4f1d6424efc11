//! One-vs-rest relabeling for single-class models.

use crate::config::DatasetConfig;
use crate::error::{Result, ResultExt};
use crate::split::DataSplit;
use crate::utils::{string_values, take_rows};
use polars::prelude::*;
use rand::prelude::*;
use tracing::debug;

/// Label given to every row outside the positive class.
pub const NEGATIVE_LABEL: &str = "Negative";

/// Rewrite labels for a one-vs-rest model of `positive_class`.
///
/// Rows of the positive class keep their label, all others become
/// [`NEGATIVE_LABEL`]. On the train split the negatives are down-sampled
/// (seeded) to the number of positives; row order is preserved.
pub fn get_scm_model_data(
    df: &DataFrame,
    positive_class: &str,
    split: DataSplit,
    config: &DatasetConfig,
    seed: u64,
) -> Result<DataFrame> {
    let label = config.label_column.as_str();
    let relabeled = df
        .clone()
        .lazy()
        .with_column(
            when(col(label).cast(DataType::String).eq(lit(positive_class)))
                .then(lit(positive_class))
                .otherwise(lit(NEGATIVE_LABEL))
                .alias(label),
        )
        .collect()
        .context(format!("Failed to relabel rows for '{positive_class}'"))?;

    if split != DataSplit::Train {
        return Ok(relabeled);
    }

    let labels = string_values(&relabeled, label)?;
    let (positives, negatives): (Vec<usize>, Vec<usize>) =
        (0..labels.len()).partition(|&i| labels[i] == positive_class);

    if negatives.len() <= positives.len() {
        return Ok(relabeled);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut keep: Vec<usize> = negatives
        .choose_multiple(&mut rng, positives.len())
        .copied()
        .chain(positives.iter().copied())
        .collect();
    keep.sort_unstable();

    debug!(
        "Down-sampled negatives for '{}': {} positives, {} of {} negatives kept",
        positive_class,
        positives.len(),
        positives.len(),
        negatives.len()
    );
    take_rows(&relabeled, &keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DataFrame {
        df![
            "Mitocheck_Phenotypic_Class" => [
                "Large",
                "Interphase",
                "Apoptosis",
                "Large",
                "Interphase",
                "Prometaphase",
                "Interphase",
            ],
            "CP__Area" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
        ]
        .unwrap()
    }

    fn counts(df: &DataFrame) -> (usize, usize) {
        let labels = string_values(df, "Mitocheck_Phenotypic_Class").unwrap();
        let positives = labels.iter().filter(|l| l.as_str() == "Large").count();
        let negatives = labels.iter().filter(|l| l.as_str() == NEGATIVE_LABEL).count();
        (positives, negatives)
    }

    #[test]
    fn test_relabels_without_downsampling_outside_train() {
        let config = DatasetConfig::default();
        let df = get_scm_model_data(&table(), "Large", DataSplit::Test, &config, 0).unwrap();
        assert_eq!(df.height(), 7);
        assert_eq!(counts(&df), (2, 5));
    }

    #[test]
    fn test_train_split_is_balanced() {
        let config = DatasetConfig::default();
        let df = get_scm_model_data(&table(), "Large", DataSplit::Train, &config, 0).unwrap();
        assert_eq!(counts(&df), (2, 2));
    }

    #[test]
    fn test_train_split_preserves_row_order() {
        let config = DatasetConfig::default();
        let df = get_scm_model_data(&table(), "Large", DataSplit::Train, &config, 4).unwrap();
        let areas: Vec<f64> = df
            .column("CP__Area")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let mut sorted = areas.clone();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(areas, sorted);
    }

    #[test]
    fn test_downsampling_is_seeded() {
        let config = DatasetConfig::default();
        let first = get_scm_model_data(&table(), "Large", DataSplit::Train, &config, 9).unwrap();
        let second = get_scm_model_data(&table(), "Large", DataSplit::Train, &config, 9).unwrap();
        assert!(first.equals(&second));
    }
}
