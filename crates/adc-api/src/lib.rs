//! HTTP endpoints
//!
//! - `POST /evaluate`: one change notification, answered with the reported evaluation
//! - `GET /health`, `GET /ready`: liveness and readiness, with sync status when present
//! - `GET /metrics`: Prometheus exposition

use std::sync::Arc;

use adc_common::AdcError;
use adc_rules::{ChangeEvent, ComplianceEvaluator};
use adc_sync::SyncState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::error;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

pub struct ApiErrorResponse(pub AdcError);

impl From<AdcError> for ApiErrorResponse {
    fn from(e: AdcError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AdcError::Data(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AdcError::Store(_) | AdcError::Directory(_) => StatusCode::BAD_GATEWAY,
            AdcError::Configuration(_) | AdcError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ApiError {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct EvaluationState {
    pub evaluator: Arc<ComplianceEvaluator>,
}

pub fn evaluation_router(evaluator: Arc<ComplianceEvaluator>) -> Router {
    Router::new()
        .route("/evaluate", post(evaluate_handler))
        .with_state(EvaluationState { evaluator })
}

async fn evaluate_handler(
    State(state): State<EvaluationState>,
    Json(event): Json<ChangeEvent>,
) -> Result<impl IntoResponse, ApiErrorResponse> {
    let result = state.evaluator.handle_event(&event).await.map_err(|e| {
        error!(error = %e, kind = e.kind(), "Evaluation failed");
        e
    })?;
    Ok(Json(result))
}

#[derive(Clone, Default)]
pub struct HealthState {
    pub sync_state: Option<Arc<SyncState>>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<HealthState>) -> Json<serde_json::Value> {
    let sync = state.sync_state.as_ref().map(|s| s.snapshot());
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
        "sync": sync,
    }))
}

// Ready once a sync cycle has succeeded; always ready without a scheduler.
async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<serde_json::Value>) {
    let ready = state
        .sync_state
        .as_ref()
        .map(|s| s.snapshot().last_success_at.is_some())
        .unwrap_or(true);

    if ready {
        (StatusCode::OK, Json(serde_json::json!({ "status": "READY" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "NOT_READY" })),
        )
    }
}

async fn metrics_handler(State(state): State<HealthState>) -> String {
    state.metrics.as_ref().map(|h| h.render()).unwrap_or_default()
}
