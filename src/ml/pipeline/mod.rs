//! Feature pipeline capability and the bundled tabular implementation.
//!
//! The lifecycle code only talks to [`FeaturePipeline`]; [`TabularPipeline`]
//! is the default implementation (impute + scale + one-hot, then a classifier).

mod preprocess;

pub use preprocess::{CategoricalColumn, ColumnPreprocessor, NumericColumn};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TrainingSettings;
use crate::dataset::FeatureFrame;
use crate::ml::logreg::{LogRegModel, TrainOptions, train_logreg};

/// Current on-disk format of [`TabularPipeline`].
pub const PIPELINE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is not fitted")]
    NotFitted,
    #[error("pipeline artifact is missing the '{0}' step")]
    MissingStep(&'static str),
    #[error("input column '{0}' is missing")]
    MissingColumn(String),
    #[error("input columns {found:?} do not match fitted columns {expected:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("column '{column}' row {row}: expected {expected}")]
    InvalidValue {
        column: String,
        row: usize,
        expected: &'static str,
    },
    #[error("training labels contain a single class")]
    SingleClass,
    #[error("{0} rows but {1} labels")]
    LabelCount(usize, usize),
    #[error("classifier fit failed: {0}")]
    Fit(String),
    #[error("invalid pipeline artifact: {0}")]
    Invalid(String),
    #[error("pipeline artifact encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fit/predict capability over a [`FeatureFrame`].
pub trait FeaturePipeline: Send + Sync + fmt::Debug {
    fn fit(&mut self, features: &FeatureFrame, labels: &[u8]) -> Result<(), PipelineError>;

    /// Positive-class probability per row.
    fn predict_score(&self, features: &FeatureFrame) -> Result<Vec<f64>, PipelineError>;

    /// Hard 0/1 labels; positive when the score exceeds one half.
    fn predict(&self, features: &FeatureFrame) -> Result<Vec<u8>, PipelineError> {
        Ok(self
            .predict_score(features)?
            .into_iter()
            .map(|score| u8::from(score > 0.5))
            .collect())
    }

    /// Column names after transformation, one per classifier input.
    fn output_feature_names(&self) -> Result<Vec<String>, PipelineError>;

    /// Linear coefficients aligned with [`Self::output_feature_names`], if any.
    fn coefficients(&self) -> Option<Vec<f64>>;

    /// Raw input columns, in the order the pipeline expects them.
    fn input_columns(&self) -> &[String];

    fn classifier_name(&self) -> &str;

    /// Serialize the fitted pipeline into artifact bytes.
    fn encode(&self) -> Result<Vec<u8>, PipelineError>;
}

/// Restores a pipeline from artifact bytes.
pub type PipelineDecoder = fn(&[u8]) -> Result<Box<dyn FeaturePipeline>, PipelineError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    LogisticRegression,
    /// Predicts the training positive rate for every row.
    Prior,
}

impl ClassifierKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "logistic_regression" | "logreg" => Some(Self::LogisticRegression),
            "prior" => Some(Self::Prior),
            _ => None,
        }
    }
}

/// Construction parameters recorded with the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub classifier: ClassifierKind,
    pub logreg: TrainOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_settings(&TrainingSettings::default())
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &TrainingSettings) -> Self {
        Self {
            classifier: settings.classifier,
            logreg: TrainOptions {
                epochs: settings.epochs,
                learning_rate: settings.learning_rate,
                l2: settings.l2,
                batch_size: settings.batch_size,
                seed: settings.seed,
            },
        }
    }
}

/// Constant-probability baseline without coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorModel {
    pub positive_rate: f64,
    pub n_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    LogisticRegression(LogRegModel),
    Prior(PriorModel),
}

impl Classifier {
    pub fn name(&self) -> &'static str {
        match self {
            Classifier::LogisticRegression(_) => "LogisticRegression",
            Classifier::Prior(_) => "PriorClassifier",
        }
    }

    fn n_features(&self) -> usize {
        match self {
            Classifier::LogisticRegression(model) => model.n_features,
            Classifier::Prior(model) => model.n_features,
        }
    }

    fn score(&self, row: &[f64]) -> f64 {
        match self {
            Classifier::LogisticRegression(model) => model.predict_proba(row),
            Classifier::Prior(model) => model.positive_rate,
        }
    }
}

/// Preprocessor + classifier pair fitted on a schema's feature groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularPipeline {
    pub format_version: u32,
    pub input_columns: Vec<String>,
    pub numeric_features: Vec<String>,
    pub categorical_features: Vec<String>,
    pub options: PipelineOptions,
    #[serde(default)]
    pub preprocessor: Option<ColumnPreprocessor>,
    #[serde(default)]
    pub classifier: Option<Classifier>,
}

impl TabularPipeline {
    /// Unfitted pipeline for the given feature groups.
    pub fn new(
        input_columns: Vec<String>,
        numeric_features: Vec<String>,
        categorical_features: Vec<String>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            format_version: PIPELINE_FORMAT_VERSION,
            input_columns,
            numeric_features,
            categorical_features,
            options,
            preprocessor: None,
            classifier: None,
        }
    }

    /// Decode artifact bytes and check that both steps are present and aligned.
    pub fn decode(bytes: &[u8]) -> Result<Self, PipelineError> {
        let pipeline: Self = serde_json::from_slice(bytes)?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// [`PipelineDecoder`] for this implementation.
    pub fn decode_boxed(bytes: &[u8]) -> Result<Box<dyn FeaturePipeline>, PipelineError> {
        Ok(Box::new(Self::decode(bytes)?))
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.format_version != PIPELINE_FORMAT_VERSION {
            return Err(PipelineError::Invalid(format!(
                "unsupported format_version {}",
                self.format_version
            )));
        }
        let (preprocessor, classifier) = self.steps()?;
        let grouped: Vec<&String> = self
            .numeric_features
            .iter()
            .chain(&self.categorical_features)
            .collect();
        if grouped.len() != self.input_columns.len()
            || grouped.iter().any(|name| !self.input_columns.contains(name))
        {
            return Err(PipelineError::Invalid(
                "feature groups do not cover the input columns".to_string(),
            ));
        }
        if let Classifier::LogisticRegression(model) = classifier {
            model.validate().map_err(PipelineError::Invalid)?;
        }
        if classifier.n_features() != preprocessor.output_width() {
            return Err(PipelineError::Invalid(format!(
                "classifier expects {} inputs but preprocessor emits {}",
                classifier.n_features(),
                preprocessor.output_width()
            )));
        }
        Ok(())
    }

    fn steps(&self) -> Result<(&ColumnPreprocessor, &Classifier), PipelineError> {
        let preprocessor = self
            .preprocessor
            .as_ref()
            .ok_or(PipelineError::MissingStep("preprocessor"))?;
        let classifier = self
            .classifier
            .as_ref()
            .ok_or(PipelineError::MissingStep("classifier"))?;
        Ok((preprocessor, classifier))
    }

    fn check_columns(&self, features: &FeatureFrame) -> Result<(), PipelineError> {
        if features.columns != self.input_columns {
            return Err(PipelineError::ColumnMismatch {
                expected: self.input_columns.clone(),
                found: features.columns.clone(),
            });
        }
        Ok(())
    }
}

impl FeaturePipeline for TabularPipeline {
    fn fit(&mut self, features: &FeatureFrame, labels: &[u8]) -> Result<(), PipelineError> {
        self.check_columns(features)?;
        if features.len() != labels.len() {
            return Err(PipelineError::LabelCount(features.len(), labels.len()));
        }
        let preprocessor = ColumnPreprocessor::fit(
            features,
            &self.numeric_features,
            &self.categorical_features,
        )?;
        let x = preprocessor.transform(features)?;
        let width = preprocessor.output_width();
        let positives = labels.iter().filter(|&&y| y != 0).count();

        let classifier = match self.options.classifier {
            ClassifierKind::LogisticRegression => {
                if positives == 0 || positives == labels.len() {
                    return Err(PipelineError::SingleClass);
                }
                let model =
                    train_logreg(&x, labels, &self.options.logreg).map_err(PipelineError::Fit)?;
                Classifier::LogisticRegression(model)
            }
            ClassifierKind::Prior => {
                if labels.is_empty() {
                    return Err(PipelineError::Fit("Empty training set".to_string()));
                }
                Classifier::Prior(PriorModel {
                    positive_rate: positives as f64 / labels.len() as f64,
                    n_features: width,
                })
            }
        };
        self.preprocessor = Some(preprocessor);
        self.classifier = Some(classifier);
        Ok(())
    }

    fn predict_score(&self, features: &FeatureFrame) -> Result<Vec<f64>, PipelineError> {
        let (preprocessor, classifier) = self.steps().map_err(|_| PipelineError::NotFitted)?;
        self.check_columns(features)?;
        let x = preprocessor.transform(features)?;
        Ok(x.iter().map(|row| classifier.score(row)).collect())
    }

    fn output_feature_names(&self) -> Result<Vec<String>, PipelineError> {
        let (preprocessor, _) = self.steps().map_err(|_| PipelineError::NotFitted)?;
        Ok(preprocessor.feature_names_out())
    }

    fn coefficients(&self) -> Option<Vec<f64>> {
        match self.classifier.as_ref()? {
            Classifier::LogisticRegression(model) => Some(model.weights.clone()),
            Classifier::Prior(_) => None,
        }
    }

    fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    fn classifier_name(&self) -> &str {
        match &self.classifier {
            Some(classifier) => classifier.name(),
            None => match self.options.classifier {
                ClassifierKind::LogisticRegression => "LogisticRegression",
                ClassifierKind::Prior => "PriorClassifier",
            },
        }
    }

    fn encode(&self) -> Result<Vec<u8>, PipelineError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;

    fn frame() -> FeatureFrame {
        let mut rows = Vec::new();
        for i in 0..30 {
            let tickets = (i % 6) as f64;
            let plan = if i % 3 == 0 { "basic" } else { "pro" };
            rows.push(vec![Value::Number(tickets), Value::Text(plan.into())]);
        }
        FeatureFrame {
            columns: vec!["tickets".into(), "plan".into()],
            rows,
        }
    }

    fn labels(frame: &FeatureFrame) -> Vec<u8> {
        frame
            .rows
            .iter()
            .map(|row| u8::from(row[0].as_number().unwrap_or(0.0) >= 3.0))
            .collect()
    }

    fn pipeline(kind: ClassifierKind) -> TabularPipeline {
        TabularPipeline::new(
            vec!["tickets".into(), "plan".into()],
            vec!["tickets".into()],
            vec!["plan".into()],
            PipelineOptions {
                classifier: kind,
                ..PipelineOptions::default()
            },
        )
    }

    #[test]
    fn fitted_pipeline_aligns_names_and_coefficients() {
        let frame = frame();
        let mut pipeline = pipeline(ClassifierKind::LogisticRegression);
        pipeline.fit(&frame, &labels(&frame)).unwrap();
        let names = pipeline.output_feature_names().unwrap();
        assert_eq!(names, vec!["num__tickets", "cat__plan_basic", "cat__plan_pro"]);
        assert_eq!(pipeline.coefficients().unwrap().len(), names.len());
        let predictions = pipeline.predict(&frame).unwrap();
        assert_eq!(predictions, labels(&frame));
    }

    #[test]
    fn unfitted_pipeline_refuses_to_predict() {
        let pipeline = pipeline(ClassifierKind::LogisticRegression);
        assert!(matches!(
            pipeline.predict_score(&frame()),
            Err(PipelineError::NotFitted)
        ));
        assert!(pipeline.output_feature_names().is_err());
    }

    #[test]
    fn column_order_must_match_fit() {
        let frame = frame();
        let mut pipeline = pipeline(ClassifierKind::LogisticRegression);
        pipeline.fit(&frame, &labels(&frame)).unwrap();
        let swapped = FeatureFrame {
            columns: vec!["plan".into(), "tickets".into()],
            rows: vec![vec![Value::Text("pro".into()), Value::Number(1.0)]],
        };
        assert!(matches!(
            pipeline.predict(&swapped),
            Err(PipelineError::ColumnMismatch { .. })
        ));
    }

    #[test]
    fn logistic_regression_needs_two_classes() {
        let frame = frame();
        let mut pipeline = pipeline(ClassifierKind::LogisticRegression);
        let ones = vec![1u8; frame.len()];
        assert!(matches!(
            pipeline.fit(&frame, &ones),
            Err(PipelineError::SingleClass)
        ));
    }

    #[test]
    fn prior_classifier_has_no_coefficients() {
        let frame = frame();
        let mut pipeline = pipeline(ClassifierKind::Prior);
        pipeline.fit(&frame, &labels(&frame)).unwrap();
        assert!(pipeline.coefficients().is_none());
        assert_eq!(pipeline.classifier_name(), "PriorClassifier");
        let scores = pipeline.predict_score(&frame).unwrap();
        assert!(scores.iter().all(|&s| (s - 0.5).abs() < 1e-12));
    }

    #[test]
    fn encode_decode_preserves_predictions() {
        let frame = frame();
        let mut pipeline = pipeline(ClassifierKind::LogisticRegression);
        pipeline.fit(&frame, &labels(&frame)).unwrap();
        let decoded = TabularPipeline::decode(&pipeline.encode().unwrap()).unwrap();
        assert_eq!(decoded, pipeline);
        assert_eq!(
            decoded.predict_score(&frame).unwrap(),
            pipeline.predict_score(&frame).unwrap()
        );
    }

    #[test]
    fn decode_rejects_missing_classifier_step() {
        let frame = frame();
        let mut pipeline = pipeline(ClassifierKind::LogisticRegression);
        pipeline.fit(&frame, &labels(&frame)).unwrap();
        pipeline.classifier = None;
        let bytes = serde_json::to_vec(&pipeline).unwrap();
        assert!(matches!(
            TabularPipeline::decode(&bytes),
            Err(PipelineError::MissingStep("classifier"))
        ));
    }
}
