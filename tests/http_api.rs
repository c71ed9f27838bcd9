use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{FromRequest, State};
use axum::http::{Request, StatusCode, header};
use decisionops::config::TrainingSettings;
use decisionops::ml::pipeline::ClassifierKind;
use decisionops::ml::train::TrainRequest;
use decisionops::ml::{ModelStore, Trainer};
use decisionops::server::{
    AppState, PredictRequest, explain, model_status, predict, router, train, version,
};
use serde_json::json;

fn state_with(settings: TrainingSettings) -> AppState {
    AppState::new(Trainer::new(Arc::new(ModelStore::in_memory()), settings))
}

fn demo_train() -> TrainRequest {
    TrainRequest {
        source: "demo".to_string(),
        target: "churn".to_string(),
        test_size: None,
    }
}

async fn json_body<T: serde::de::DeserializeOwned>(
    body: &'static str,
) -> Result<Json<T>, axum::extract::rejection::JsonRejection> {
    let request = Request::builder()
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    Json::<T>::from_request(request, &()).await
}

#[tokio::test]
async fn router_builds_with_state() {
    let _ = router(state_with(TrainingSettings::default()));
    let Json(body) = version().await;
    assert_eq!(body.name, "decisionops");
}

#[tokio::test]
async fn status_is_idempotent_between_trains() {
    let state = state_with(TrainingSettings::default());
    train(State(state.clone()), Ok(Json(demo_train())))
        .await
        .unwrap();
    let Json(first) = model_status(State(state.clone())).await;
    let Json(second) = model_status(State(state.clone())).await;
    assert_eq!(first, second);
    assert_eq!(first.rows, Some(400));
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[tokio::test]
async fn default_test_size_comes_from_settings() {
    let state = state_with(TrainingSettings::default());
    let Json(trained) = train(State(state), Ok(Json(demo_train()))).await.unwrap();
    assert_eq!(trained.metrics.confusion_matrix.total(), 80);
}

#[tokio::test]
async fn upload_source_is_unsupported() {
    let state = state_with(TrainingSettings::default());
    let request = TrainRequest {
        source: "upload".to_string(),
        ..demo_train()
    };
    let err = train(State(state), Ok(Json(request))).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.body().kind, "unsupported");
}

#[tokio::test]
async fn missing_target_is_bad_request() {
    let state = state_with(TrainingSettings::default());
    let request = TrainRequest {
        target: "cancelled".to_string(),
        ..demo_train()
    };
    let err = train(State(state), Ok(Json(request))).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert!(err.body().detail.contains("cancelled"));
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let state = state_with(TrainingSettings::default());
    let payload = json_body::<PredictRequest>("{\"records\": 5}").await;
    assert!(payload.is_err());
    let err = predict(State(state), payload).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.body().kind, "validation");
}

#[tokio::test]
async fn predict_parses_records_and_scores_them() {
    let state = state_with(TrainingSettings::default());
    train(State(state.clone()), Ok(Json(demo_train())))
        .await
        .unwrap();
    let payload = json_body::<PredictRequest>(
        r#"{"records": [
            {"age": 33, "tenure_months": 40, "monthly_spend": 25.0,
             "support_tickets_last_90d": 0, "plan": "enterprise", "region": "na"},
            {"age": null, "tenure_months": 1, "monthly_spend": 99.0,
             "support_tickets_last_90d": 7, "plan": "basic", "region": "eu"}
        ]}"#,
    )
    .await;
    let Json(body) = predict(State(state), payload).await.unwrap();
    assert_eq!(body.predictions.len(), 2);
    assert!(
        body.predictions
            .iter()
            .all(|p| (0.0..=1.0).contains(&p.probability))
    );
}

#[tokio::test]
async fn explain_without_coefficients_is_unsupported() {
    let settings = TrainingSettings {
        classifier: ClassifierKind::Prior,
        ..TrainingSettings::default()
    };
    let state = state_with(settings);
    train(State(state.clone()), Ok(Json(demo_train())))
        .await
        .unwrap();
    let err = explain(State(state)).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.body().kind, "unsupported");
}

#[tokio::test]
async fn explain_before_train_is_not_found() {
    let err = explain(State(state_with(TrainingSettings::default())))
        .await
        .unwrap_err();
    assert_eq!(err.body().kind, "not_found");
    assert!(err.body().detail.contains("/train"));
}
