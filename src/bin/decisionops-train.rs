//! Offline utility to train a model once and write its artifact set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use decisionops::config::{self, LoggingSettings, TrainingSettings};
use decisionops::dataset::Dataset;
use decisionops::dataset::loader::parse_csv;
use decisionops::logging;
use decisionops::ml::explain;
use decisionops::ml::pipeline::ClassifierKind;
use decisionops::ml::train::resolve_source;
use decisionops::ml::{ModelStore, TrainOutcome, TrainedModel, Trainer};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let service = config::load_or_default().map_err(|err| err.to_string())?;
    if let Err(err) = logging::init(&LoggingSettings {
        file: false,
        ..service.logging.clone()
    }) {
        eprintln!("Logging disabled: {err}");
    }

    let out_dir = match options.out {
        Some(dir) => dir,
        None => service
            .storage
            .resolved_model_dir()
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "Persistence is disabled; pass --out <dir>".to_string())?,
    };
    let dataset = match &options.csv {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
            parse_csv(&text).map_err(|err| err.to_string())?
        }
        None => resolve_source(&options.source).map_err(|err| err.to_string())?,
    };

    let mut settings: TrainingSettings = service.training;
    if let Some(seed) = options.seed {
        settings.seed = seed;
    }
    if let Some(classifier) = options.classifier {
        settings.classifier = classifier;
    }

    let (outcome, model) = train_to_dir(
        &dataset,
        &options.target,
        options.test_size,
        settings,
        &out_dir,
    )?;

    let metrics = &outcome.metrics;
    println!("target: {}", outcome.schema.target);
    println!("rows: {}", outcome.schema.row_count);
    println!("trained_at: {}", outcome.trained_at);
    println!("classifier: {}", model.pipeline.classifier_name());
    println!("accuracy: {:.4}", metrics.accuracy);
    println!("precision: {:.4}", metrics.precision);
    println!("recall: {:.4}", metrics.recall);
    println!("f1: {:.4}", metrics.f1);
    match metrics.roc_auc {
        Some(auc) => println!("roc_auc: {auc:.4}"),
        None => println!("roc_auc: n/a"),
    }
    let cm = &metrics.confusion_matrix;
    println!("confusion matrix (rows=true, cols=pred):");
    println!("{:6}{:6}", cm.true_negatives, cm.false_positives);
    println!("{:6}{:6}", cm.false_negatives, cm.true_positives);
    match explain::explain(&model) {
        Ok(top) => {
            println!("top features:");
            for weight in top {
                println!("  {:<40} {:+.4}", weight.feature, weight.weight);
            }
        }
        Err(err) => println!("explanation unavailable: {err}"),
    }
    println!("artifacts: {}", out_dir.display());
    Ok(())
}

/// Train in memory, then write the artifact set to `out_dir` exactly once.
fn train_to_dir(
    dataset: &Dataset,
    target: &str,
    test_size: Option<f64>,
    settings: TrainingSettings,
    out_dir: &Path,
) -> Result<(TrainOutcome, Arc<TrainedModel>), String> {
    let store = Arc::new(ModelStore::in_memory());
    let trainer = Trainer::new(Arc::clone(&store), settings);
    let outcome = trainer
        .train_dataset(dataset, target, test_size)
        .map_err(|err| err.to_string())?;
    let model = store.get().map_err(|err| err.to_string())?;
    ModelStore::new(Some(out_dir.to_path_buf()))
        .persist(&model)
        .map_err(|err| err.to_string())?;
    Ok((outcome, model))
}

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    target: String,
    source: String,
    csv: Option<PathBuf>,
    test_size: Option<f64>,
    seed: Option<u64>,
    classifier: Option<ClassifierKind>,
    out: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut target: Option<String> = None;
    let mut source = "demo".to_string();
    let mut csv: Option<PathBuf> = None;
    let mut test_size: Option<f64> = None;
    let mut seed: Option<u64> = None;
    let mut classifier: Option<ClassifierKind> = None;
    let mut out: Option<PathBuf> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--target" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--target requires a value".to_string())?;
                target = Some(value.clone());
            }
            "--source" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--source requires a value".to_string())?;
                source = value.clone();
            }
            "--csv" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--csv requires a value".to_string())?;
                csv = Some(PathBuf::from(value));
            }
            "--test-size" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--test-size requires a value".to_string())?;
                test_size = Some(
                    value
                        .parse::<f64>()
                        .map_err(|_| format!("Invalid --test-size value: {value}"))?,
                );
            }
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            "--classifier" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--classifier requires a value".to_string())?;
                classifier = Some(
                    ClassifierKind::parse(value)
                        .ok_or_else(|| format!("Invalid --classifier value: {value}"))?,
                );
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                out = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let target = target.ok_or_else(help_text)?;
    Ok(CliOptions {
        target,
        source,
        csv,
        test_size,
        seed,
        classifier,
        out,
    })
}

fn help_text() -> String {
    [
        "decisionops-train",
        "",
        "Trains a binary classifier on a tabular dataset and writes its artifacts.",
        "",
        "Usage:",
        "  decisionops-train --target <column> [options]",
        "",
        "Options:",
        "  --target <column>       Binary 0/1 label column (required).",
        "  --source <name>         Dataset source (default: demo).",
        "  --csv <file>            Train on a local CSV file instead of --source.",
        "  --test-size <f64>       Test fraction in [0.05, 0.5] (default: config).",
        "  --seed <u64>            Split and fit seed (default: config).",
        "  --classifier <name>     logistic_regression or prior (default: config).",
        "  --out <dir>             Artifact directory (default: configured model dir).",
    ]
    .join("\n")
}
