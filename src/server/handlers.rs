//! Axum handlers for the model lifecycle API.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use crate::ml::explain::{self as explainer, EXPLAIN_METHOD};
use crate::ml::predict as scorer;
use crate::ml::train::TrainRequest;
use crate::server::{
    ApiError, AppState, ExplainResponse, HealthResponse, PredictRequest, PredictResponse,
    StatusResponse, TrainResponse, VersionResponse,
};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Summary of the active model, or nulls when none is trained.
pub async fn model_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let response = match state.store.get() {
        Ok(model) => StatusResponse {
            has_model: true,
            trained_at: Some(model.trained_at.clone()),
            target: Some(model.schema.target.clone()),
            rows: Some(model.schema.row_count),
            metrics: Some(model.metrics.clone()),
            feature_names: Some(model.schema.feature_names.clone()),
            numeric_features: Some(model.schema.numeric_features.clone()),
            categorical_features: Some(model.schema.categorical_features.clone()),
        },
        Err(_) => StatusResponse {
            has_model: false,
            trained_at: None,
            target: None,
            rows: None,
            metrics: None,
            feature_names: None,
            numeric_features: None,
            categorical_features: None,
        },
    };
    Json(response)
}

/// Train on the requested source; fitting runs on the blocking pool.
pub async fn train(
    State(state): State<AppState>,
    payload: Result<Json<TrainRequest>, JsonRejection>,
) -> Result<Json<TrainResponse>, ApiError> {
    let Json(request) = payload?;
    let trainer = state.trainer.clone();
    let outcome = tokio::task::spawn_blocking(move || trainer.train(&request))
        .await
        .map_err(|err| ApiError::internal(format!("training task failed: {err}")))??;
    Ok(Json(TrainResponse {
        status: "trained".to_string(),
        target: outcome.schema.target,
        rows: outcome.schema.row_count,
        metrics: outcome.metrics,
        trained_at: outcome.trained_at,
    }))
}

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload?;
    let model = state.store.get()?;
    let predictions = scorer::predict(&model, &request.records)?;
    Ok(Json(PredictResponse { predictions }))
}

pub async fn explain(State(state): State<AppState>) -> Result<Json<ExplainResponse>, ApiError> {
    let model = state.store.get()?;
    let top_features = explainer::explain(&model)?;
    Ok(Json(ExplainResponse {
        method: EXPLAIN_METHOD.to_string(),
        top_features,
    }))
}
