//! Train/test/holdout partitioning by replicate group.
//!
//! Cells imaged on the same plate map are strongly correlated, so the
//! holdout partition is built from whole replicate groups chosen at random.
//! The remaining rows are split into train and test with a label-stratified
//! random draw. The assignment is persisted as an index table keyed by
//! `(index, label)`.

use crate::config::{DatasetConfig, SplitConfig};
use crate::error::{ProcessingError, Result, ResultExt};
use crate::loader::read_delimited;
use crate::utils::{index_values, string_values, take_rows, unique_in_order};
use polars::prelude::*;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Name of the row index column in the split index table.
pub const SPLIT_INDEX_COLUMN: &str = "index";

/// Name of the partition label column in the split index table.
pub const SPLIT_LABEL_COLUMN: &str = "label";

/// Partition a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSplit {
    Train,
    Test,
    Holdout,
}

impl DataSplit {
    /// Returns the label written to the split index table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
            Self::Holdout => "holdout",
        }
    }

    /// All partitions in canonical order.
    pub fn all() -> [DataSplit; 3] {
        [Self::Train, Self::Test, Self::Holdout]
    }
}

impl fmt::Display for DataSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSplit {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "train" => Ok(Self::Train),
            "test" => Ok(Self::Test),
            "holdout" => Ok(Self::Holdout),
            other => Err(ProcessingError::InvalidData(format!(
                "unknown data split label '{other}'"
            ))),
        }
    }
}

/// One row of the split index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEntry {
    pub index: i64,
    pub split: DataSplit,
}

/// Row index → partition assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitIndex {
    entries: Vec<SplitEntry>,
}

impl SplitIndex {
    pub fn new(entries: Vec<SplitEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SplitEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Row indexes assigned to `split`, in table order.
    pub fn indexes_for(&self, split: DataSplit) -> Vec<i64> {
        self.entries
            .iter()
            .filter(|entry| entry.split == split)
            .map(|entry| entry.index)
            .collect()
    }

    /// Distinct partitions in first-seen order.
    pub fn labels(&self) -> Vec<DataSplit> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|entry| entry.split)
            .filter(|split| seen.insert(*split))
            .collect()
    }

    /// Number of rows per partition.
    pub fn counts(&self) -> BTreeMap<DataSplit, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.split).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let indexes: Vec<i64> = self.entries.iter().map(|e| e.index).collect();
        let labels: Vec<&str> = self.entries.iter().map(|e| e.split.as_str()).collect();
        Ok(df![
            SPLIT_INDEX_COLUMN => indexes,
            SPLIT_LABEL_COLUMN => labels,
        ]?)
    }

    /// Write the index table as TSV, creating parent directories.
    pub fn write_tsv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b'\t')
            .finish(&mut df)
            .context(format!("Failed to write '{}'", path.display()))?;

        info!("Split index written to: {}", path.display());
        Ok(())
    }

    /// Read an index table previously written by [`SplitIndex::write_tsv`].
    pub fn read_tsv(path: impl AsRef<Path>) -> Result<Self> {
        let df = read_delimited(path.as_ref(), b'\t')?;
        let indexes = index_values(&df, SPLIT_INDEX_COLUMN)?;
        let labels = string_values(&df, SPLIT_LABEL_COLUMN)?;

        let entries = indexes
            .into_iter()
            .zip(labels)
            .map(|(index, label)| {
                Ok(SplitEntry {
                    index,
                    split: label.parse()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }
}

/// Pick `n_groups` distinct replicate groups at random.
pub fn select_holdout_groups(
    df: &DataFrame,
    replicate_column: &str,
    n_groups: usize,
    rng: &mut StdRng,
) -> Result<Vec<String>> {
    let groups = unique_in_order(&string_values(df, replicate_column)?);
    if n_groups > groups.len() {
        return Err(ProcessingError::InvalidConfig(format!(
            "cannot hold out {n_groups} replicate groups, table has only {}",
            groups.len()
        )));
    }

    Ok(groups.choose_multiple(rng, n_groups).cloned().collect())
}

/// Assign every row of the table to train, test or holdout.
///
/// All rows of a selected replicate group land in holdout; the remaining
/// rows are split per label so each class keeps roughly `test_fraction` of
/// its rows in test.
pub fn partition(
    df: &DataFrame,
    dataset: &DatasetConfig,
    config: &SplitConfig,
) -> Result<SplitIndex> {
    let indexes = index_values(df, &dataset.index_column)?;
    let labels = string_values(df, &dataset.label_column)?;
    let groups = string_values(df, &dataset.replicate_column)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let holdout: HashSet<String> =
        select_holdout_groups(df, &dataset.replicate_column, config.holdout_groups, &mut rng)
            .context("While selecting holdout groups")?
            .into_iter()
            .collect();
    debug!("Holdout replicate groups: {:?}", holdout);

    let mut assignment: Vec<DataSplit> = vec![DataSplit::Train; indexes.len()];
    let mut by_label: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (position, group) in groups.iter().enumerate() {
        if holdout.contains(group) {
            assignment[position] = DataSplit::Holdout;
        } else {
            by_label
                .entry(labels[position].as_str())
                .or_default()
                .push(position);
        }
    }

    for positions in by_label.values_mut() {
        positions.shuffle(&mut rng);
        let n_test = (positions.len() as f64 * config.test_fraction).round() as usize;
        for &position in positions.iter().take(n_test) {
            assignment[position] = DataSplit::Test;
        }
    }

    let split_index = SplitIndex::new(
        indexes
            .into_iter()
            .zip(assignment)
            .map(|(index, split)| SplitEntry { index, split })
            .collect(),
    );

    info!("Partition sizes: {:?}", split_index.counts());
    Ok(split_index)
}

/// Rows of the feature table belonging to one partition, in index-table order.
///
/// The feature table's index column must be unique.
pub fn get_dataset(
    features: &DataFrame,
    split_index: &SplitIndex,
    split: DataSplit,
    dataset: &DatasetConfig,
) -> Result<DataFrame> {
    let mut positions_by_index: HashMap<i64, usize> = HashMap::new();
    for (position, index) in index_values(features, &dataset.index_column)?
        .into_iter()
        .enumerate()
    {
        if positions_by_index.insert(index, position).is_some() {
            return Err(ProcessingError::InvalidData(format!(
                "index {index} appears more than once in column '{}'",
                dataset.index_column
            )));
        }
    }

    let positions = split_index
        .indexes_for(split)
        .into_iter()
        .map(|index| {
            positions_by_index.get(&index).copied().ok_or_else(|| {
                ProcessingError::InvalidData(format!(
                    "split index {index} is not present in the feature table"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    take_rows(features, &positions)
}
