//! Training orchestration: source resolution, split, fit, evaluation and publish.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TrainingSettings;
use crate::dataset::Dataset;
use crate::dataset::loader::{self, DatasetSource};
use crate::dataset::split::train_test_split;
use crate::ml::error::MlError;
use crate::ml::metrics::{self, Metrics};
use crate::ml::pipeline::{FeaturePipeline, PipelineOptions, TabularPipeline};
use crate::ml::schema::{self, Schema};
use crate::ml::store::{self, ModelStore, TrainedModel};

/// Parameters of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRequest {
    pub source: String,
    pub target: String,
    /// Test partition fraction; the configured default when absent.
    #[serde(default)]
    pub test_size: Option<f64>,
}

/// Summary of a published model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainOutcome {
    pub schema: Schema,
    pub metrics: Metrics,
    pub trained_at: String,
}

impl From<&TrainedModel> for TrainOutcome {
    fn from(model: &TrainedModel) -> Self {
        Self {
            schema: model.schema.clone(),
            metrics: model.metrics.clone(),
            trained_at: model.trained_at.clone(),
        }
    }
}

/// Runs training and publishes results into a shared [`ModelStore`].
///
/// Concurrent calls are serialized, so each completed run publishes a complete
/// model and the last one to finish wins.
#[derive(Debug)]
pub struct Trainer {
    store: Arc<ModelStore>,
    settings: TrainingSettings,
    train_lock: Mutex<()>,
}

impl Trainer {
    pub fn new(store: Arc<ModelStore>, settings: TrainingSettings) -> Self {
        Self {
            store,
            settings,
            train_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Resolve `request.source`, train on it and publish the model.
    pub fn train(&self, request: &TrainRequest) -> Result<TrainOutcome, MlError> {
        let dataset = resolve_source(&request.source)?;
        self.train_dataset(&dataset, &request.target, request.test_size)
    }

    /// Train on an already loaded dataset and publish the model.
    pub fn train_dataset(
        &self,
        dataset: &Dataset,
        target: &str,
        test_size: Option<f64>,
    ) -> Result<TrainOutcome, MlError> {
        let _guard = self
            .train_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let test_size = test_size.unwrap_or(self.settings.default_test_size);
        let model = fit_model(dataset, target, test_size, &self.settings)?;
        let published = self.store.set(model);
        Ok(TrainOutcome::from(published.as_ref()))
    }
}

/// Load the dataset named by `source`.
pub fn resolve_source(source: &str) -> Result<Dataset, MlError> {
    match DatasetSource::parse(source).map_err(MlError::UnsupportedSource)? {
        DatasetSource::Demo => Ok(loader::load_demo()?),
        DatasetSource::Upload => Err(MlError::NotImplemented("Upload")),
    }
}

/// Fit and evaluate a model without publishing it.
pub fn fit_model(
    dataset: &Dataset,
    target: &str,
    test_size: f64,
    settings: &TrainingSettings,
) -> Result<TrainedModel, MlError> {
    let derived = schema::derive(dataset, target)?;
    let split = train_test_split(derived.schema.row_count, test_size, settings.seed)?;
    debug!(
        train_rows = split.train.len(),
        test_rows = split.test.len(),
        test_size,
        "Split dataset"
    );

    let train_x = derived.features.select_rows(&split.train);
    let train_y: Vec<u8> = split.train.iter().map(|&idx| derived.labels[idx]).collect();
    let test_x = derived.features.select_rows(&split.test);
    let test_y: Vec<u8> = split.test.iter().map(|&idx| derived.labels[idx]).collect();

    let mut pipeline = TabularPipeline::new(
        derived.schema.feature_names.clone(),
        derived.schema.numeric_features.clone(),
        derived.schema.categorical_features.clone(),
        PipelineOptions::from_settings(settings),
    );
    pipeline.fit(&train_x, &train_y).map_err(MlError::Fit)?;

    let predicted = pipeline.predict(&test_x).map_err(MlError::Fit)?;
    let scores = pipeline.predict_score(&test_x).map_err(MlError::Fit)?;
    let metrics = metrics::compute(&test_y, &predicted, Some(&scores));

    let feature_names_transformed = pipeline
        .output_feature_names()
        .map_err(|err| MlError::PipelineIntegrity(err.to_string()))?;
    check_integrity(&pipeline, &feature_names_transformed)?;

    let trained_at = store::now_utc_rfc3339()?;
    info!(
        target_column = target,
        rows = derived.schema.row_count,
        classifier = pipeline.classifier_name(),
        accuracy = metrics.accuracy,
        "Trained model"
    );
    Ok(TrainedModel {
        pipeline: Arc::new(pipeline),
        schema: derived.schema,
        feature_names_transformed,
        metrics,
        trained_at,
    })
}

fn check_integrity(pipeline: &dyn FeaturePipeline, names: &[String]) -> Result<(), MlError> {
    if names.is_empty() {
        return Err(MlError::PipelineIntegrity(
            "pipeline exposes no output feature names".to_string(),
        ));
    }
    if let Some(coefficients) = pipeline.coefficients() {
        if coefficients.len() != names.len() {
            return Err(MlError::PipelineIntegrity(format!(
                "{} output feature names but {} coefficients",
                names.len(),
                coefficients.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::parse_csv;
    use crate::dataset::split::SplitError;

    fn trainer() -> Trainer {
        Trainer::new(Arc::new(ModelStore::in_memory()), TrainingSettings::default())
    }

    fn request(source: &str, target: &str) -> TrainRequest {
        TrainRequest {
            source: source.to_string(),
            target: target.to_string(),
            test_size: Some(0.2),
        }
    }

    #[test]
    fn demo_training_publishes_model() {
        let trainer = trainer();
        let outcome = trainer.train(&request("demo", "churn")).unwrap();
        assert_eq!(outcome.schema.row_count, 400);
        assert_eq!(outcome.metrics.confusion_matrix.total(), 80);
        let model = trainer.store().get().unwrap();
        assert_eq!(model.trained_at, outcome.trained_at);
        assert_eq!(
            model.feature_names_transformed.len(),
            model.pipeline.coefficients().unwrap().len()
        );
    }

    #[test]
    fn unknown_and_upload_sources_are_unsupported() {
        let trainer = trainer();
        assert!(matches!(
            trainer.train(&request("s3", "churn")),
            Err(MlError::UnsupportedSource(name)) if name == "s3"
        ));
        assert!(matches!(
            trainer.train(&request("upload", "churn")),
            Err(MlError::NotImplemented(_))
        ));
        assert!(!trainer.store().has());
    }

    #[test]
    fn missing_target_lists_columns() {
        let err = trainer().train(&request("demo", "nope")).unwrap_err();
        match err {
            MlError::TargetNotFound { available, .. } => {
                assert!(available.contains(&"churn".to_string()))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_size_bounds_still_split() {
        let trainer = trainer();
        for size in [0.05, 0.5] {
            let mut req = request("demo", "churn");
            req.test_size = Some(size);
            let outcome = trainer.train(&req).unwrap();
            let test_rows = outcome.metrics.confusion_matrix.total() as usize;
            assert!(test_rows > 0 && test_rows < 400);
        }
        let mut req = request("demo", "churn");
        req.test_size = Some(0.9);
        assert!(matches!(
            trainer.train(&req),
            Err(MlError::Split(SplitError::InvalidFraction(_)))
        ));
    }

    #[test]
    fn same_inputs_give_same_metrics() {
        let trainer = trainer();
        let a = trainer.train(&request("demo", "churn")).unwrap();
        let b = trainer.train(&request("demo", "churn")).unwrap();
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.schema, b.schema);
    }

    #[test]
    fn failed_training_keeps_previous_model() {
        let trainer = trainer();
        let first = trainer.train(&request("demo", "churn")).unwrap();
        assert!(trainer.train(&request("demo", "missing")).is_err());
        assert_eq!(trainer.store().get().unwrap().trained_at, first.trained_at);
    }

    #[test]
    fn single_class_training_set_fails_to_fit() {
        let csv = "x,y\n1,1\n2,1\n3,1\n4,1\n5,1\n";
        let dataset = parse_csv(csv).unwrap();
        let err = trainer().train_dataset(&dataset, "y", Some(0.2)).unwrap_err();
        assert!(matches!(err, MlError::Fit(_)));
    }
}
