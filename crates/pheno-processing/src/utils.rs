//! Shared utilities for reading typed values out of polars tables.
//!
//! This module contains common helper functions used across multiple modules
//! to reduce code duplication and ensure consistent error reporting.

use crate::error::{ProcessingError, Result};
use polars::prelude::*;
use std::collections::HashSet;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// =============================================================================
// Column Access Utilities
// =============================================================================

/// Check whether the table has a column with the given name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names()
        .iter()
        .any(|column| column.as_str() == name)
}

/// Get a column, failing with [`ProcessingError::ColumnNotFound`] when absent.
pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    if !has_column(df, name) {
        return Err(ProcessingError::ColumnNotFound(name.to_string()));
    }
    Ok(df.column(name)?)
}

/// Read a column as owned strings. Nulls are rejected.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = require_column(df, name)?;
    let series = column.as_materialized_series().cast(&DataType::String)?;
    let values = series.str()?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.map(str::to_string).ok_or_else(|| {
                ProcessingError::InvalidData(format!("null value in column '{name}' at row {row}"))
            })
        })
        .collect()
}

/// Read a column as signed integers. Nulls are rejected.
pub fn index_values(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let column = require_column(df, name)?;
    let series = column.as_materialized_series().cast(&DataType::Int64)?;
    let values = series.i64()?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                ProcessingError::InvalidData(format!("null value in column '{name}' at row {row}"))
            })
        })
        .collect()
}

/// Distinct values in first-seen order.
pub fn unique_in_order<T: AsRef<str>>(values: &[T]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(AsRef::as_ref)
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

/// Select rows by position, preserving the given order.
pub fn take_rows(df: &DataFrame, positions: &[usize]) -> Result<DataFrame> {
    let indices: Vec<IdxSize> = positions.iter().map(|&p| p as IdxSize).collect();
    let idx = IdxCa::from_vec("positions".into(), indices);
    Ok(df.take(&idx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(is_numeric_dtype(&DataType::Int32));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_require_column_missing() {
        let df = df!["a" => [1, 2]].unwrap();
        let err = require_column(&df, "b").unwrap_err();
        assert!(matches!(err, ProcessingError::ColumnNotFound(ref c) if c == "b"));
    }

    #[test]
    fn test_string_values_rejects_nulls() {
        let df = df!["label" => [Some("a"), None]].unwrap();
        assert!(matches!(
            string_values(&df, "label"),
            Err(ProcessingError::InvalidData(_))
        ));
    }

    #[test]
    fn test_index_values_casts_unsigned() {
        let df = df!["index" => [3u32, 7, 9]].unwrap();
        assert_eq!(index_values(&df, "index").unwrap(), vec![3, 7, 9]);
    }

    #[test]
    fn test_unique_in_order() {
        let values = ["b", "a", "b", "c", "a"];
        assert_eq!(unique_in_order(&values), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_take_rows_preserves_order() {
        let df = df!["x" => [10, 20, 30]].unwrap();
        let taken = take_rows(&df, &[2, 0]).unwrap();
        let values: Vec<Option<i32>> = taken
            .column("x")
            .unwrap()
            .as_materialized_series()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(30), Some(10)]);
    }
}
