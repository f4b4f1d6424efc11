//! CLI entry point for the phenotype classification workflow.

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pheno_learning::plots::{
    DEFAULT_BAR_WIDTH, bar_chart, clustered_heatmap, coefficient_heatmap, confusion_heatmap,
    density_plot, scores_chart,
};
use pheno_learning::{
    EvaluationConfig, MULTI_CLASS_SCORES_FILE, Metric, ParamGrid, SINGLE_CLASS_SCORES_FILE,
    ScoreTable, TrainingConfig, TrainingOutcome, evaluate_multi_class_cms,
    evaluate_multi_class_models, evaluate_single_class_models, train_multi_class_models,
    train_single_class_models,
};
use pheno_processing::{DataSplit, DatasetConfig, SplitConfig, SplitIndex, load_features, partition};
use std::path::{Path, PathBuf};
use tracing::info;

/// CLI-compatible metric enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMetric {
    /// Harmonic mean of precision and recall
    F1,
    /// Share of predictions of a class that are correct
    Precision,
}

impl From<CliMetric> for Metric {
    fn from(cli: CliMetric) -> Self {
        match cli {
            CliMetric::F1 => Metric::F1,
            CliMetric::Precision => Metric::Precision,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Phenotype classification from single-cell features",
    long_about = "Train and evaluate elastic-net logistic regression models that classify \
                  single-cell phenotypes from CellProfiler (CP) and deep-learning (DP) \
                  features.\n\n\
                  EXAMPLES:\n  \
                  # Assign rows to train/test/holdout\n  \
                  pheno split\n\n  \
                  # Train every multi-class and single-class model\n  \
                  pheno train --n-jobs 8\n\n  \
                  # Score the models and write the compiled tables\n  \
                  pheno evaluate --metric f1"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Partition the labeled features into train, test and holdout
    Split(SplitArgs),
    /// Train multi-class and single-class models on the train split
    Train(TrainArgs),
    /// Score persisted models and write the compiled score tables
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Labeled feature table (CSV, optionally gzip-compressed)
    #[arg(short, long, default_value = "data/labeled_data.csv.gz")]
    input: PathBuf,

    /// Split index TSV
    #[arg(long, default_value = "indexes/data_split_indexes.tsv")]
    split_index: PathBuf,
}

#[derive(Args, Debug)]
struct SplitArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Number of replicate groups held out entirely
    #[arg(long, default_value = "5")]
    holdout_groups: usize,

    /// Fraction of the remaining rows assigned to the test split
    #[arg(long, default_value = "0.15")]
    test_fraction: f64,

    /// Random seed for the partition
    #[arg(long, default_value = "0")]
    seed: u64,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Root directory of the persisted models
    #[arg(short, long, default_value = "models")]
    models: PathBuf,

    /// Number of stratified folds
    #[arg(long, default_value = "10")]
    cv_folds: usize,

    /// Solver iteration cap
    #[arg(long, default_value = "100")]
    max_iter: usize,

    /// Seed for shuffled baselines and negative down-sampling
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Worker threads for the grid search (default: all cores)
    #[arg(long)]
    n_jobs: Option<usize>,

    /// Only train the multi-class models
    #[arg(long)]
    skip_single_class: bool,

    /// Do not print confusion matrices and coefficient plots
    #[arg(long)]
    no_plots: bool,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Root directory of the persisted models
    #[arg(short, long, default_value = "models")]
    models: PathBuf,

    /// Output directory for the compiled score tables
    #[arg(short, long, default_value = "evaluations/F1_scores")]
    output: PathBuf,

    /// Per-class score
    #[arg(long, value_enum, default_value = "f1")]
    metric: CliMetric,

    /// Seed for down-sampling negatives on the train split
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Only evaluate the multi-class models
    #[arg(long)]
    skip_single_class: bool,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet);

    let dataset = DatasetConfig::default();
    match cli.command {
        Command::Split(args) => run_split(&args, &dataset),
        Command::Train(args) => run_train(&args, &dataset),
        Command::Evaluate(args) => run_evaluate(&args, &dataset),
    }
}

fn load(data: &DataArgs, dataset: &DatasetConfig) -> Result<polars::prelude::DataFrame> {
    if !data.input.exists() {
        return Err(anyhow!("Input file not found: {}", data.input.display()));
    }
    info!("Loading features from: {}", data.input.display());
    let features = load_features(&data.input, dataset)?;
    info!("Features loaded: {:?}", features.shape());
    Ok(features)
}

fn load_split_index(path: &Path) -> Result<SplitIndex> {
    if !path.exists() {
        return Err(anyhow!(
            "Split index not found: {} (run `pheno split` first)",
            path.display()
        ));
    }
    Ok(SplitIndex::read_tsv(path)?)
}

fn run_split(args: &SplitArgs, dataset: &DatasetConfig) -> Result<()> {
    let features = load(&args.data, dataset)?;
    let config = SplitConfig::builder()
        .holdout_groups(args.holdout_groups)
        .test_fraction(args.test_fraction)
        .seed(args.seed)
        .build()?;

    let split_index = partition(&features, dataset, &config)?;
    split_index.write_tsv(&args.data.split_index)?;

    println!("\n{}", "=".repeat(60));
    println!("DATA SPLITS");
    println!("{}", "-".repeat(60));
    for (split, count) in split_index.counts() {
        println!("  {:<10} {:>8}", split.as_str(), count);
    }
    println!("  Written to: {}", args.data.split_index.display());
    Ok(())
}

fn run_train(args: &TrainArgs, dataset: &DatasetConfig) -> Result<()> {
    let features = load(&args.data, dataset)?;
    let split_index = load_split_index(&args.data.split_index)?;

    let mut builder = TrainingConfig::builder()
        .cv_folds(args.cv_folds)
        .param_grid(ParamGrid::default())
        .max_iter(args.max_iter)
        .seed(args.seed);
    if let Some(jobs) = args.n_jobs {
        builder = builder.n_jobs(jobs);
    }
    let config = builder.build()?;

    let show_plots = !args.no_plots;
    let records = train_multi_class_models(
        &features,
        &split_index,
        &args.models,
        dataset,
        &config,
        |outcome| {
            if show_plots {
                print_training_outcome(outcome);
            }
        },
    )?;

    println!("\n{}", "=".repeat(60));
    println!("MULTI-CLASS MODELS");
    println!("{}", "-".repeat(60));
    for record in &records {
        println!(
            "  {:<18} {:<10} C={:<8} l1_ratio={:<4} CV accuracy {:.4}",
            record.model_type.as_str(),
            record.feature_type.as_str(),
            record.best_params.c,
            record.best_params.l1_ratio,
            record.cv_mean_accuracy
        );
    }

    if !args.skip_single_class {
        let records =
            train_single_class_models(&features, &split_index, &args.models, dataset, &config)?;
        info!("Trained {} single-class models", records.len());
    }
    Ok(())
}

/// Confusion matrix, precision and coefficient views of one training run.
///
/// Uses `println!` on purpose: the plots are the primary output of the run
/// and must be visible regardless of the log level.
fn print_training_outcome(outcome: &TrainingOutcome) {
    let title = format!(
        "{} / {}",
        outcome.model.model_type.as_str(),
        outcome.model.feature_type.as_str()
    );
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "-".repeat(60));

    println!("Cross-validated confusion matrix");
    println!("{}", confusion_heatmap(&outcome.confusion_matrix));
    println!(
        "{}",
        scores_chart("Precision per class", &outcome.precision, DEFAULT_BAR_WIDTH)
    );

    let coefficients = &outcome.coefficients;
    println!(
        "{}",
        bar_chart(
            "Mean |coefficient| per class",
            &coefficients.class_means(),
            DEFAULT_BAR_WIDTH
        )
    );
    let top_features: Vec<(String, f64)> =
        coefficients.feature_means().into_iter().take(20).collect();
    println!(
        "{}",
        bar_chart(
            "Mean |coefficient| per feature (top 20)",
            &top_features,
            DEFAULT_BAR_WIDTH
        )
    );
    if coefficients.n_features() <= 60 {
        println!("{}", coefficient_heatmap("Coefficients", coefficients));
    }
    if coefficients.n_features() <= 60 && coefficients.n_features() > 1 {
        println!("{}", clustered_heatmap("Coefficients (clustered)", coefficients));
    }
    println!("{}", density_plot("Coefficient density per class", coefficients, 48));
}

fn run_evaluate(args: &EvaluateArgs, dataset: &DatasetConfig) -> Result<()> {
    let features = load(&args.data, dataset)?;
    let split_index = load_split_index(&args.data.split_index)?;
    let config = EvaluationConfig::builder()
        .metric(args.metric.into())
        .output_dir(&args.output)
        .seed(args.seed)
        .build()?;

    print_confusion_matrices(&args.models, &features, &split_index, dataset)?;

    let scores = evaluate_multi_class_models(
        &args.models,
        &features,
        &split_index,
        dataset,
        config.metric,
    )?;
    print_scores("MULTI-CLASS SCORES", &scores);
    scores.write_tsv(&config.output_dir.join(MULTI_CLASS_SCORES_FILE))?;

    if !args.skip_single_class {
        let scm_scores =
            evaluate_single_class_models(&args.models, &features, &split_index, dataset, &config)?;
        print_scores("SINGLE-CLASS SCORES", &scm_scores);
        scm_scores.write_tsv(&config.output_dir.join(SINGLE_CLASS_SCORES_FILE))?;
    }
    Ok(())
}

fn print_confusion_matrices(
    models_dir: &Path,
    features: &polars::prelude::DataFrame,
    split_index: &SplitIndex,
    dataset: &DatasetConfig,
) -> Result<()> {
    for record in evaluate_multi_class_cms(models_dir, features, split_index, dataset)? {
        println!(
            "\n{} / {} on {}",
            record.model_type.as_str(),
            record.feature_type.as_str(),
            record.data_split
        );
        println!("{}", confusion_heatmap(&record.matrix));
    }
    Ok(())
}

fn print_scores(title: &str, table: &ScoreTable) {
    println!("\n{}", "=".repeat(60));
    println!("{title} ({})", table.metric());
    println!("{}", "-".repeat(60));

    for split in DataSplit::all() {
        for shuffled in [false, true] {
            let entries: Vec<(String, f64)> = table
                .records()
                .iter()
                .filter(|r| r.data_split == split && r.shuffled == shuffled)
                .map(|r| {
                    (
                        format!("{} {}", r.feature_type.as_str(), r.phenotypic_class),
                        r.score,
                    )
                })
                .collect();
            if entries.is_empty() {
                continue;
            }
            let label = if shuffled { "shuffled" } else { "final" };
            println!(
                "{}",
                bar_chart(&format!("{split} / {label}"), &entries, DEFAULT_BAR_WIDTH)
            );
        }
    }
}
