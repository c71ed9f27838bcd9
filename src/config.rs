//! Service configuration stored as TOML under the app root.
//!
//! Config keys: `[server] bind`, `[storage] model_dir, persist`,
//! `[training] seed, default_test_size, classifier, epochs, learning_rate, l2, batch_size`,
//! `[logging] filter, file`. Missing keys fall back to defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
use crate::dataset::split::{MAX_TEST_FRACTION, MIN_TEST_FRACTION};
use crate::ml::pipeline::ClassifierKind;

/// Default filename used to store the service configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors that may occur while loading or saving service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to resolve or create an app directory.
    #[error("Unable to prepare app directory: {0}")]
    AppDir(#[from] app_dirs::AppDirError),
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write a config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to serialize config to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML serialization error.
        source: toml::ser::Error,
    },
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Where the trained model artifacts are mirrored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// Artifact directory; `None` resolves to `<app root>/models`.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    /// Disable to keep the model store memory-only.
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            model_dir: None,
            persist: true,
        }
    }
}

impl StorageSettings {
    /// Resolve the artifact directory, or `None` when persistence is disabled.
    pub fn resolved_model_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        if !self.persist {
            return Ok(None);
        }
        let dir = match &self.model_dir {
            Some(dir) => app_dirs::ensure_dir(dir.clone())?,
            None => app_dirs::models_dir()?,
        };
        Ok(Some(dir))
    }
}

/// Training hyperparameters and split policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingSettings {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_test_size")]
    pub default_test_size: f64,
    #[serde(default)]
    pub classifier: ClassifierKind,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_l2")]
    pub l2: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            default_test_size: default_test_size(),
            classifier: ClassifierKind::default(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            l2: default_l2(),
            batch_size: default_batch_size(),
        }
    }
}

impl TrainingSettings {
    fn normalized(mut self) -> Self {
        self.default_test_size = if self.default_test_size.is_finite() {
            self.default_test_size
                .clamp(MIN_TEST_FRACTION, MAX_TEST_FRACTION)
        } else {
            default_test_size()
        };
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            self.learning_rate = default_learning_rate();
        }
        if !self.l2.is_finite() || self.l2 < 0.0 {
            self.l2 = default_l2();
        }
        self.epochs = self.epochs.max(1);
        self.batch_size = self.batch_size.max(1);
        self
    }
}

/// Tracing filter and file sink toggle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: true,
        }
    }
}

impl ServiceConfig {
    /// Clamp values into their supported ranges.
    pub fn normalized(self) -> Self {
        Self {
            training: self.training.normalized(),
            ..self
        }
    }
}

/// Resolve the default configuration file path under the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the default path, returning defaults if missing.
pub fn load_or_default() -> Result<ServiceConfig, ConfigError> {
    load_from(&config_path()?)
}

/// Load configuration from `path`, returning defaults if the file is missing.
pub fn load_from(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if !path.exists() {
        return Ok(ServiceConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text, path)
}

/// Persist configuration to `path`, creating parent directories as needed.
pub fn save_to_path(config: &ServiceConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        app_dirs::ensure_dir(parent.to_path_buf())?;
    }
    let text = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(text: &str, path: &Path) -> Result<ServiceConfig, ConfigError> {
    toml::from_str::<ServiceConfig>(text)
        .map(ServiceConfig::normalized)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

fn default_test_size() -> f64 {
    0.2
}

fn default_epochs() -> usize {
    200
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_l2() -> f64 {
    1e-4
}

fn default_batch_size() -> usize {
    32
}

fn default_log_filter() -> String {
    "info".to_string()
}
