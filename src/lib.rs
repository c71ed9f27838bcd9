//! Library exports for the server binary, the training CLI, tests and benchmarks.
/// Application directory helpers.
pub mod app_dirs;
/// TOML service configuration.
pub mod config;
/// Tabular datasets, CSV loading and train/test splitting.
pub mod dataset;
/// Tracing subscriber setup.
pub mod logging;
/// Model lifecycle: training, storage, scoring and explanation.
pub mod ml;
/// HTTP API.
pub mod server;
