//! HTTP surface for the model lifecycle.
//!
//! Thin axum layer: handlers translate JSON bodies into [`crate::ml`] calls and
//! map [`MlError`] categories onto status codes.

mod handlers;

pub use handlers::*;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::ml::explain::FeatureWeight;
use crate::ml::metrics::Metrics;
use crate::ml::predict::Prediction;
use crate::ml::{ErrorCategory, MlError, ModelStore, Trainer};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<ModelStore>,
    pub trainer: Arc<Trainer>,
}

impl AppState {
    pub fn new(trainer: Trainer) -> Self {
        Self {
            store: Arc::clone(trainer.store()),
            trainer: Arc::new(trainer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}

/// Active-model summary; every field but `has_model` is null without a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResponse {
    pub has_model: bool,
    pub trained_at: Option<String>,
    pub target: Option<String>,
    pub rows: Option<usize>,
    pub metrics: Option<Metrics>,
    pub feature_names: Option<Vec<String>>,
    pub numeric_features: Option<Vec<String>>,
    pub categorical_features: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainResponse {
    pub status: String,
    pub target: String,
    pub rows: usize,
    pub metrics: Metrics,
    pub trained_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub records: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainResponse {
    pub method: String,
    pub top_features: Vec<FeatureWeight>,
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

/// Error returned by handlers, rendered as `{detail, kind, violations?}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                detail: detail.into(),
                kind: ErrorCategory::Internal.as_str().to_string(),
                violations: Vec::new(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl From<MlError> for ApiError {
    fn from(err: MlError) -> Self {
        let category = err.category();
        let status = match category {
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            body: ErrorBody {
                detail: err.to_string(),
                kind: category.as_str().to_string(),
                violations: err.violations(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                detail: rejection.body_text(),
                kind: ErrorCategory::Validation.as_str().to_string(),
                violations: Vec::new(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, "{}", self.body.detail);
        }
        (self.status, axum::Json(self.body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/model/status", get(model_status))
        .route("/train", post(train))
        .route("/predict", post(predict))
        .route("/explain", get(explain))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "Serving HTTP API");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
