//! Coefficient-based global explanation of the active model.

use std::cmp::Ordering;

use serde::Serialize;

use crate::ml::error::MlError;
use crate::ml::store::TrainedModel;

/// Number of features reported by [`explain`].
pub const TOP_FEATURES: usize = 10;

/// Method label reported alongside the ranked weights.
pub const EXPLAIN_METHOD: &str = "logreg_coefficients";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

/// Rank transformed features by absolute coefficient, largest first.
///
/// Equal magnitudes are ordered by feature name so the ranking is stable
/// across restarts.
pub fn explain(model: &TrainedModel) -> Result<Vec<FeatureWeight>, MlError> {
    let coefficients = model
        .pipeline
        .coefficients()
        .ok_or_else(|| MlError::UnsupportedClassifier(model.pipeline.classifier_name().to_string()))?;
    if coefficients.len() != model.feature_names_transformed.len() {
        return Err(MlError::PipelineIntegrity(format!(
            "{} feature names but {} coefficients",
            model.feature_names_transformed.len(),
            coefficients.len()
        )));
    }
    Ok(rank(&model.feature_names_transformed, &coefficients))
}

fn rank(names: &[String], coefficients: &[f64]) -> Vec<FeatureWeight> {
    let mut weights: Vec<FeatureWeight> = names
        .iter()
        .zip(coefficients)
        .map(|(feature, &weight)| FeatureWeight {
            feature: feature.clone(),
            weight,
        })
        .collect();
    weights.sort_by(|a, b| {
        b.weight
            .abs()
            .partial_cmp(&a.weight.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    weights.truncate(TOP_FEATURES);
    weights
}
