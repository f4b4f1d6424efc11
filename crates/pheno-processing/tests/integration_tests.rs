//! Integration tests for loading, partitioning and extracting feature tables.
//!
//! These tests run the processing stages end to end on a small fixture table
//! that mimics a MitoCheck export.

use pheno_processing::utils::index_values;
use pheno_processing::{
    DataSplit, DatasetConfig, FeatureType, NEGATIVE_LABEL, ProcessingError, SplitConfig,
    SplitIndex, get_dataset, get_scm_model_data, get_x_y, load_features, partition,
    string_values,
};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_fixture() -> DataFrame {
    load_features(
        fixtures_path().join("labeled_features.csv"),
        &DatasetConfig::default(),
    )
    .expect("Failed to load fixture table")
}

fn split_config() -> SplitConfig {
    SplitConfig::builder()
        .holdout_groups(2)
        .test_fraction(0.25)
        .seed(0)
        .build()
        .unwrap()
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_fixture_cleans_labels() {
    let df = load_fixture();
    let labels = string_values(&df, "Mitocheck_Phenotypic_Class").unwrap();

    assert_eq!(df.height(), 40);
    assert!(!labels.iter().any(|l| l == "ADCCM"));
    assert!(!labels.iter().any(|l| l == "Shape1" || l == "Shape3"));
    assert_eq!(labels.iter().filter(|l| l.as_str() == "Polylobed").count(), 16);
}

#[test]
fn test_load_gzipped_table_matches_plain() {
    let dataset = DatasetConfig::default();
    let dir = tempfile::tempdir().unwrap();
    let gz_path = dir.path().join("data/labeled_data.csv.gz");
    std::fs::create_dir_all(gz_path.parent().unwrap()).unwrap();
    std::fs::copy(fixtures_path().join("labeled_features.csv.gz"), &gz_path).unwrap();

    let plain = load_fixture();
    let gzipped = load_features(&gz_path, &dataset).expect("Failed to load gzipped table");

    assert_eq!(gzipped.shape(), plain.shape());
    assert_eq!(gzipped.get_column_names(), plain.get_column_names());
    assert_eq!(
        string_values(&gzipped, "Mitocheck_Phenotypic_Class").unwrap(),
        string_values(&plain, "Mitocheck_Phenotypic_Class").unwrap()
    );
    assert!(gzipped.equals(&plain));
}

#[test]
fn test_load_keeps_unnamed_index_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pandas_export.csv");
    std::fs::write(
        &path,
        ",Metadata_Plate_Map_Name,Mitocheck_Phenotypic_Class,CP__AreaShape_Area\n\
         10,plate_map_1,Interphase,0.5\n\
         11,plate_map_1,ADCCM,0.6\n\
         12,plate_map_2,Shape3,0.7\n",
    )
    .unwrap();

    let df = load_features(&path, &DatasetConfig::default()).unwrap();

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "index",
            "Metadata_Plate_Map_Name",
            "Mitocheck_Phenotypic_Class",
            "CP__AreaShape_Area",
        ]
    );
    assert_eq!(index_values(&df, "index").unwrap(), vec![10, 12]);
    assert_eq!(
        string_values(&df, "Mitocheck_Phenotypic_Class").unwrap(),
        vec!["Interphase", "Polylobed"]
    );
}

#[test]
fn test_load_missing_file() {
    let result = load_features(
        fixtures_path().join("missing.csv.gz"),
        &DatasetConfig::default(),
    );
    assert!(matches!(result, Err(ProcessingError::FileNotFound(_))));
}

// ============================================================================
// Partitioning
// ============================================================================

#[test]
fn test_partition_covers_every_row_once() {
    let df = load_fixture();
    let dataset = DatasetConfig::default();
    let split_index = partition(&df, &dataset, &split_config()).unwrap();

    let total: usize = DataSplit::all()
        .into_iter()
        .map(|split| {
            get_dataset(&df, &split_index, split, &dataset)
                .unwrap()
                .height()
        })
        .sum();
    assert_eq!(total, df.height());

    let unique: HashSet<i64> = split_index.entries().iter().map(|e| e.index).collect();
    assert_eq!(unique.len(), df.height());
}

#[test]
fn test_holdout_groups_never_leak() {
    let df = load_fixture();
    let dataset = DatasetConfig::default();
    let split_index = partition(&df, &dataset, &split_config()).unwrap();

    let mut splits_per_group: HashMap<String, HashSet<bool>> = HashMap::new();
    for split in DataSplit::all() {
        let part = get_dataset(&df, &split_index, split, &dataset).unwrap();
        for group in string_values(&part, "Metadata_Plate_Map_Name").unwrap() {
            splits_per_group
                .entry(group)
                .or_default()
                .insert(split == DataSplit::Holdout);
        }
    }

    let holdout_groups = splits_per_group
        .values()
        .filter(|flags| flags.contains(&true))
        .count();
    assert_eq!(holdout_groups, 2);
    assert!(splits_per_group.values().all(|flags| flags.len() == 1));
}

#[test]
fn test_split_index_tsv_round_trip() {
    let df = load_fixture();
    let dataset = DatasetConfig::default();
    let split_index = partition(&df, &dataset, &split_config()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_split_indexes.tsv");
    split_index.write_tsv(&path).unwrap();

    let loaded = SplitIndex::read_tsv(&path).unwrap();
    assert_eq!(loaded, split_index);
    assert_eq!(loaded.labels().len(), 3);
}

// ============================================================================
// Feature Extraction
// ============================================================================

#[test]
fn test_feature_matrices_per_type() {
    let df = load_fixture();
    let dataset = DatasetConfig::default();

    let widths: Vec<usize> = FeatureType::all()
        .into_iter()
        .map(|ft| get_x_y(&df, ft, &dataset).unwrap().n_features())
        .collect();
    assert_eq!(widths, vec![2, 2, 4]);
}

#[test]
fn test_single_class_training_data_is_balanced() {
    let df = load_fixture();
    let dataset = DatasetConfig::default();
    let split_index = partition(&df, &dataset, &split_config()).unwrap();
    let train = get_dataset(&df, &split_index, DataSplit::Train, &dataset).unwrap();

    let scm = get_scm_model_data(&train, "Interphase", DataSplit::Train, &dataset, 0).unwrap();
    let data = get_x_y(&scm, FeatureType::Cp, &dataset).unwrap();

    let positives = data.labels.iter().filter(|l| l.as_str() == "Interphase").count();
    let negatives = data.labels.iter().filter(|l| l.as_str() == NEGATIVE_LABEL).count();
    assert!(positives > 0);
    assert_eq!(positives, negatives);
}
