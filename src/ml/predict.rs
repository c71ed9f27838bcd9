//! Batch scoring against the active model.

use serde::Serialize;
use serde_json::Value as Json;

use crate::ml::error::MlError;
use crate::ml::store::TrainedModel;
use crate::ml::validate;

/// Hard label plus positive-class probability for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: u8,
    pub probability: f64,
}

/// Validate `records` against the model schema and score them in order.
pub fn predict(model: &TrainedModel, records: &[Json]) -> Result<Vec<Prediction>, MlError> {
    let frame = validate::validate(records, &model.schema)?;
    let labels = model.pipeline.predict(&frame).map_err(MlError::Inference)?;
    let scores = model
        .pipeline
        .predict_score(&frame)
        .map_err(MlError::Inference)?;
    Ok(labels
        .into_iter()
        .zip(scores)
        .map(|(label, probability)| Prediction { label, probability })
        .collect())
}
