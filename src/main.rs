//! Entry point for the decisionops HTTP service.

use std::path::PathBuf;
use std::sync::Arc;

use decisionops::config::{self, ServiceConfig};
use decisionops::logging;
use decisionops::ml::{ModelStore, RestoreOutcome, Trainer};
use decisionops::server::{self, AppState};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path_arg()?)?;
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("Logging disabled: {err}");
    }

    let model_dir = config.storage.resolved_model_dir()?;
    let store = Arc::new(ModelStore::new(model_dir));
    match store.restore() {
        RestoreOutcome::Restored => info!("Serving restored model"),
        RestoreOutcome::Empty => info!("No persisted model; waiting for /train"),
        RestoreOutcome::Discarded(reason) => warn!("Starting without a model: {reason}"),
    }

    let trainer = Trainer::new(store, config.training.clone());
    server::serve(config.server.bind, AppState::new(trainer)).await?;
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<ServiceConfig, config::ConfigError> {
    match path {
        Some(path) => config::load_from(&path),
        None => config::load_or_default(),
    }
}

fn config_path_arg() -> Result<Option<PathBuf>, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => Ok(None),
        [flag, path] if flag == "--config" => Ok(Some(PathBuf::from(path))),
        [flag] if flag == "-h" || flag == "--help" => {
            Err("Usage: decisionops [--config <file.toml>]".to_string())
        }
        _ => Err(format!(
            "Unknown arguments: {}\nUsage: decisionops [--config <file.toml>]",
            args.join(" ")
        )),
    }
}
