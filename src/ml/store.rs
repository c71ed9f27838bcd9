//! Active-model registry with best-effort artifact persistence.
//!
//! At most one [`TrainedModel`] is active. Readers receive `Arc` clones, so a
//! replacement published by [`ModelStore::set`] never changes a model a reader
//! already holds. When an artifact directory is configured, the active model is
//! mirrored into four JSON files, each written through a temp file in the same
//! directory and renamed into place. Every file carries the same random
//! generation id, so a set mixing two persists is never restored.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use crate::ml::error::MlError;
use crate::ml::metrics::Metrics;
use crate::ml::pipeline::{FeaturePipeline, PipelineDecoder, PipelineError, TabularPipeline};
use crate::ml::schema::Schema;

const PIPELINE_FILE: &str = "pipeline.json";
const SCHEMA_FILE: &str = "schema.json";
const METRICS_FILE: &str = "metrics.json";
const TRAINED_AT_FILE: &str = "trained_at.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to encode {file}: {source}")]
    Encode {
        file: &'static str,
        source: serde_json::Error,
    },
    #[error("Pipeline artifact rejected: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Invalid training timestamp: {0}")]
    Timestamp(String),
    #[error("Artifacts are inconsistent: {0}")]
    Inconsistent(String),
}

/// A fitted pipeline bundled with the metadata it was trained under.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub pipeline: Arc<dyn FeaturePipeline>,
    pub schema: Schema,
    /// Pipeline output column names, aligned with its coefficients.
    pub feature_names_transformed: Vec<String>,
    pub metrics: Metrics,
    /// RFC 3339 UTC timestamp of training completion.
    pub trained_at: String,
}

/// Current UTC time as an RFC 3339 string.
pub fn now_utc_rfc3339() -> Result<String, StoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| StoreError::Timestamp(err.to_string()))
}

#[derive(Debug, Serialize, Deserialize)]
struct TrainedAtRecord {
    generation: String,
    trained_at: String,
}

/// Side artifact tagged with the persist that wrote it.
#[derive(Debug, Serialize, Deserialize)]
struct Stamped<T> {
    generation: String,
    artifact: T,
}

fn new_generation() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Locations of the persisted artifact set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub pipeline: PathBuf,
    pub schema: PathBuf,
    pub metrics: PathBuf,
    pub trained_at: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            pipeline: dir.join(PIPELINE_FILE),
            schema: dir.join(SCHEMA_FILE),
            metrics: dir.join(METRICS_FILE),
            trained_at: dir.join(TRAINED_AT_FILE),
            dir,
        }
    }

    fn all(&self) -> [&Path; 4] {
        [
            self.pipeline.as_path(),
            self.schema.as_path(),
            self.metrics.as_path(),
            self.trained_at.as_path(),
        ]
    }
}

/// Result of loading persisted artifacts at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// A complete, consistent model was published.
    Restored,
    /// Nothing persisted (or persistence disabled).
    Empty,
    /// Artifacts existed but were unusable; the store stays empty.
    Discarded(String),
}

#[derive(Debug)]
pub struct ModelStore {
    active: RwLock<Option<Arc<TrainedModel>>>,
    paths: Option<ArtifactPaths>,
    decoder: PipelineDecoder,
}

impl ModelStore {
    /// Store persisting into `dir`, or memory-only when `dir` is `None`.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self::with_decoder(dir, TabularPipeline::decode_boxed)
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Store whose restored pipelines are decoded by `decoder`.
    pub fn with_decoder(dir: Option<PathBuf>, decoder: PipelineDecoder) -> Self {
        Self {
            active: RwLock::new(None),
            paths: dir.map(ArtifactPaths::new),
            decoder,
        }
    }

    /// Publish `model` as the active model, then mirror it to disk.
    ///
    /// Persistence failures are logged; the in-memory model stays published.
    pub fn set(&self, model: TrainedModel) -> Arc<TrainedModel> {
        let model = Arc::new(model);
        *self.write_guard() = Some(Arc::clone(&model));
        info!(
            target_column = %model.schema.target,
            trained_at = %model.trained_at,
            "Published trained model"
        );
        if let Err(err) = self.persist(&model) {
            warn!("Model artifacts not persisted: {err}");
        }
        model
    }

    pub fn get(&self) -> Result<Arc<TrainedModel>, MlError> {
        self.read_guard().clone().ok_or(MlError::NoModelTrained)
    }

    pub fn has(&self) -> bool {
        self.read_guard().is_some()
    }

    /// Drop the in-memory model. Persisted files are left untouched.
    pub fn clear(&self) {
        *self.write_guard() = None;
    }

    /// Write the artifact set for `model`; a no-op for memory-only stores.
    pub fn persist(&self, model: &TrainedModel) -> Result<(), StoreError> {
        let Some(paths) = &self.paths else {
            return Ok(());
        };
        fs::create_dir_all(&paths.dir).map_err(|source| StoreError::Write {
            path: paths.dir.clone(),
            source,
        })?;
        let generation = new_generation();
        let pipeline: serde_json::Value = serde_json::from_slice(&model.pipeline.encode()?)
            .map_err(|source| StoreError::Encode {
                file: PIPELINE_FILE,
                source,
            })?;
        let pipeline = encode_stamped(PIPELINE_FILE, &generation, &pipeline)?;
        let schema = encode_stamped(SCHEMA_FILE, &generation, &model.schema)?;
        let metrics = encode_stamped(METRICS_FILE, &generation, &model.metrics)?;
        let trained_at = encode_json(
            TRAINED_AT_FILE,
            &TrainedAtRecord {
                generation,
                trained_at: model.trained_at.clone(),
            },
        )?;
        write_atomic(&paths.pipeline, &pipeline)?;
        write_atomic(&paths.schema, &schema)?;
        write_atomic(&paths.metrics, &metrics)?;
        write_atomic(&paths.trained_at, &trained_at)?;
        Ok(())
    }

    /// Load persisted artifacts and publish them if complete and consistent.
    pub fn restore(&self) -> RestoreOutcome {
        let Some(paths) = &self.paths else {
            return RestoreOutcome::Empty;
        };
        if paths.all().iter().all(|path| !path.exists()) {
            return RestoreOutcome::Empty;
        }
        match self.load(paths) {
            Ok(model) => {
                info!(
                    dir = %paths.dir.display(),
                    target_column = %model.schema.target,
                    "Restored persisted model"
                );
                *self.write_guard() = Some(Arc::new(model));
                RestoreOutcome::Restored
            }
            Err(err) => {
                self.clear();
                warn!(dir = %paths.dir.display(), "Discarding persisted model: {err}");
                RestoreOutcome::Discarded(err.to_string())
            }
        }
    }

    fn load(&self, paths: &ArtifactPaths) -> Result<TrainedModel, StoreError> {
        if let Some(missing) = paths.all().iter().find(|path| !path.exists()) {
            return Err(StoreError::Inconsistent(format!(
                "{} is missing",
                missing.display()
            )));
        }
        let stamped_pipeline: Stamped<serde_json::Value> = read_json(&paths.pipeline)?;
        let schema: Stamped<Schema> = read_json(&paths.schema)?;
        let metrics: Stamped<Metrics> = read_json(&paths.metrics)?;
        let TrainedAtRecord {
            generation,
            trained_at,
        } = read_json(&paths.trained_at)?;
        let generations = [
            stamped_pipeline.generation.as_str(),
            schema.generation.as_str(),
            metrics.generation.as_str(),
        ];
        if generations.iter().any(|other| *other != generation) {
            return Err(StoreError::Inconsistent(format!(
                "artifacts come from different training runs: {generations:?} vs {generation}"
            )));
        }

        let pipeline_bytes =
            serde_json::to_vec(&stamped_pipeline.artifact).map_err(|source| StoreError::Encode {
                file: PIPELINE_FILE,
                source,
            })?;
        let pipeline = (self.decoder)(&pipeline_bytes)?;
        let schema = schema.artifact;
        schema.validate().map_err(StoreError::Inconsistent)?;
        if pipeline.input_columns() != schema.feature_names.as_slice() {
            return Err(StoreError::Inconsistent(format!(
                "pipeline inputs {:?} differ from schema features {:?}",
                pipeline.input_columns(),
                schema.feature_names
            )));
        }
        let metrics = metrics.artifact;
        metrics.validate().map_err(StoreError::Inconsistent)?;
        OffsetDateTime::parse(&trained_at, &Rfc3339)
            .map_err(|err| StoreError::Timestamp(format!("{trained_at}: {err}")))?;

        let feature_names_transformed = pipeline.output_feature_names()?;
        if feature_names_transformed.is_empty() {
            return Err(StoreError::Inconsistent(
                "pipeline has no output features".to_string(),
            ));
        }
        if let Some(coefficients) = pipeline.coefficients() {
            if coefficients.len() != feature_names_transformed.len() {
                return Err(StoreError::Inconsistent(format!(
                    "{} feature names but {} coefficients",
                    feature_names_transformed.len(),
                    coefficients.len()
                )));
            }
        }
        Ok(TrainedModel {
            pipeline: Arc::from(pipeline),
            schema,
            feature_names_transformed,
            metrics,
            trained_at,
        })
    }

    // A panic while holding the lock cannot leave the slot half-written, so
    // poisoned guards are recovered.
    fn read_guard(&self) -> RwLockReadGuard<'_, Option<Arc<TrainedModel>>> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Option<Arc<TrainedModel>>> {
        self.active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn encode_json<T: Serialize>(file: &'static str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode { file, source })
}

fn encode_stamped<T: Serialize>(
    file: &'static str,
    generation: &str,
    artifact: &T,
) -> Result<Vec<u8>, StoreError> {
    encode_json(
        file,
        &Stamped {
            generation: generation.to_string(),
            artifact,
        },
    )
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".artifact")
        .tempfile_in(dir)
        .map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, StoreError> {
    fs::read(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    serde_json::from_slice(&read_bytes(path)?).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}
