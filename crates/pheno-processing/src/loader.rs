//! Feature table loading and label cleaning.
//!
//! Tables are read with polars (gzip-compressed CSV is accepted transparently),
//! given a row index column, and cleaned:
//!
//! - rows carrying the excluded class are dropped,
//! - legacy class labels are renamed to their canonical equivalents.
//!
//! Both steps are idempotent, so cleaning an already-clean table is a no-op.

use crate::config::DatasetConfig;
use crate::error::{ProcessingError, Result, ResultExt};
use crate::utils::{has_column, require_column};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Load a labeled feature table from CSV and clean its labels.
///
/// # Errors
///
/// - [`ProcessingError::FileNotFound`] when `path` does not exist
/// - [`ProcessingError::ColumnNotFound`] when the label column is missing
/// - [`ProcessingError::Polars`] when the CSV is malformed
pub fn load_features(path: impl AsRef<Path>, config: &DatasetConfig) -> Result<DataFrame> {
    let path = path.as_ref();
    info!("Loading feature table from: {}", path.display());

    let df = read_delimited(path, b',')?;
    let df = ensure_index_column(df, config)?;
    let df = clean_labels(df, config)?;

    info!("Feature table loaded: {:?}", df.shape());
    Ok(df)
}

/// Read a delimited text file with a header row.
pub fn read_delimited(path: &Path, separator: u8) -> Result<DataFrame> {
    if !path.exists() {
        return Err(ProcessingError::FileNotFound(path.display().to_string()));
    }

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(format!("Failed to open '{}'", path.display()))?
        .finish()
        .context(format!("Failed to parse '{}'", path.display()))
}

/// Make sure the table carries the configured index column.
///
/// A pandas export stores its index as an unnamed first column; that column
/// is renamed. Otherwise a zero-based row index is generated.
pub fn ensure_index_column(mut df: DataFrame, config: &DatasetConfig) -> Result<DataFrame> {
    let index = config.index_column.as_str();
    if has_column(&df, index) {
        return Ok(df);
    }

    let first = df
        .get_column_names()
        .first()
        .map(|name| name.to_string());

    match first {
        Some(name) if name.is_empty() => {
            debug!("Using unnamed first column as '{}'", index);
            df.rename(&name, index.into())?;
            Ok(df)
        }
        _ => {
            debug!("Generating row index column '{}'", index);
            Ok(df.with_row_index(index.into(), None)?)
        }
    }
}

/// Drop the excluded class and rename legacy labels.
pub fn clean_labels(df: DataFrame, config: &DatasetConfig) -> Result<DataFrame> {
    let label = config.label_column.as_str();
    require_column(&df, label)?;
    let rows_before = df.height();

    let mut lf = df
        .lazy()
        .with_column(col(label).cast(DataType::String));

    if let Some(excluded) = &config.excluded_class {
        lf = lf.filter(col(label).neq_missing(lit(excluded.as_str())));
    }

    let mut relabeled = col(label);
    for (legacy, canonical) in &config.label_remaps {
        relabeled = when(col(label).eq(lit(legacy.as_str())))
            .then(lit(canonical.as_str()))
            .otherwise(relabeled);
    }

    let cleaned = lf
        .with_column(relabeled.alias(label))
        .collect()
        .context("Failed to clean labels")?;

    debug!(
        "Dropped {} rows of excluded class {:?}",
        rows_before - cleaned.height(),
        config.excluded_class
    );
    Ok(cleaned)
}
