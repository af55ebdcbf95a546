//! Readiness and metrics endpoints.
//!
//! Liveness comes from `enrollment_web::handlers::health_check`; readiness
//! additionally checks the repository answers.

use super::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use enrollment_runtime::HealthCheck;
use enrollment_web::handlers::{health::ReadinessBody, readiness_response};

/// `GET /ready`
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessBody>) {
    let repository = match state.service.ping().await {
        Ok(()) => HealthCheck::healthy("repository"),
        Err(error) => {
            tracing::warn!(%error, "Repository readiness check failed");
            HealthCheck::unhealthy("repository", error.to_string())
        },
    };
    let sweeper = HealthCheck::healthy("expiry_sweeper");
    readiness_response(vec![repository, sweeper])
}

/// `GET /metrics` in Prometheus text format
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(recorder) => (StatusCode::OK, recorder.render()),
        None => (StatusCode::NOT_FOUND, "metrics are not enabled".to_string()),
    }
}
