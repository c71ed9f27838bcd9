//! Error taxonomy for the model lifecycle operations.

use thiserror::Error;

use crate::dataset::loader::DatasetLoadError;
use crate::dataset::split::SplitError;
use crate::ml::pipeline::PipelineError;
use crate::ml::store::StoreError;
use crate::ml::validate::ValidationReport;

/// Coarse classes callers branch on (HTTP status, retry policy, logging level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Client-caused: bad request shape or values.
    Validation,
    /// No model has been trained yet.
    NotFound,
    /// Recognized but unavailable operation.
    Unsupported,
    /// Persisted or fitted state is internally inconsistent.
    Integrity,
    /// I/O or serialization fault inside the service.
    Internal,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Unsupported => "unsupported",
            Self::Integrity => "integrity",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Target '{target}' not found in dataset. Available columns: {available:?}")]
    TargetNotFound {
        target: String,
        available: Vec<String>,
    },
    #[error("Target '{target}' must hold only 0/1 values: {detail}")]
    NonBinaryTarget { target: String, detail: String },
    #[error("{0}")]
    Split(#[from] SplitError),
    #[error("Unknown source: {0}")]
    UnsupportedSource(String),
    #[error("{0} not implemented yet")]
    NotImplemented(&'static str),
    #[error("{0}")]
    Validation(#[from] ValidationReport),
    #[error("No model trained yet. Call /train first.")]
    NoModelTrained,
    #[error("Classifier {0} does not support coefficient-based explanation")]
    UnsupportedClassifier(String),
    #[error("Pipeline integrity error: {0}")]
    PipelineIntegrity(String),
    #[error("Training failed: {0}")]
    Fit(PipelineError),
    #[error("Prediction error: {0}")]
    Inference(PipelineError),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetLoadError),
    #[error("Model store error: {0}")]
    Store(#[from] StoreError),
}

impl MlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MlError::TargetNotFound { .. }
            | MlError::NonBinaryTarget { .. }
            | MlError::Split(_)
            | MlError::Validation(_)
            | MlError::Fit(_)
            | MlError::Inference(_) => ErrorCategory::Validation,
            MlError::NoModelTrained => ErrorCategory::NotFound,
            MlError::UnsupportedSource(_)
            | MlError::NotImplemented(_)
            | MlError::UnsupportedClassifier(_) => ErrorCategory::Unsupported,
            MlError::PipelineIntegrity(_) => ErrorCategory::Integrity,
            MlError::Dataset(_) | MlError::Store(_) => ErrorCategory::Internal,
        }
    }

    /// Individual violations when the error aggregates several.
    pub fn violations(&self) -> Vec<String> {
        match self {
            MlError::Validation(report) => report.messages(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(MlError::NoModelTrained.category(), ErrorCategory::NotFound);
        assert_eq!(
            MlError::NotImplemented("Upload").category(),
            ErrorCategory::Unsupported
        );
        assert_eq!(
            MlError::UnsupportedSource("s3".into()).category(),
            ErrorCategory::Unsupported
        );
        assert_eq!(
            MlError::PipelineIntegrity("empty".into()).category(),
            ErrorCategory::Integrity
        );
        assert_eq!(
            MlError::Split(SplitError::InvalidFraction(0.9)).category(),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn no_model_message_points_at_train() {
        assert!(MlError::NoModelTrained.to_string().to_lowercase().contains("train"));
    }
}
