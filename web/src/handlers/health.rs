//! Liveness and readiness endpoints.
//!
//! Liveness only says the process answers. Readiness reports each dependency
//! the service needs and answers 503 if any of them is down.

use axum::{Json, http::StatusCode};
use chrono::{DateTime, Utc};
use enrollment_runtime::{HealthCheck, HealthStatus};
use serde::Serialize;

/// Liveness probe
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// One dependency in a readiness report
#[derive(Debug, Serialize)]
pub struct CheckBody {
    /// Dependency name
    pub component: String,
    /// `healthy` or `unhealthy`
    pub status: String,
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Readiness response body
#[derive(Debug, Serialize)]
pub struct ReadinessBody {
    /// Worst status across all checks
    pub status: String,
    /// Individual checks
    pub checks: Vec<CheckBody>,
    /// When the report was produced
    pub timestamp: DateTime<Utc>,
}

/// Turn dependency checks into a readiness response
#[must_use]
pub fn readiness_response(checks: Vec<HealthCheck>) -> (StatusCode, Json<ReadinessBody>) {
    let healthy = checks.iter().all(|c| c.status.is_healthy());
    let overall = if healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    let body = ReadinessBody {
        status: overall.to_string(),
        checks: checks
            .into_iter()
            .map(|c| CheckBody {
                component: c.component,
                status: c.status.to_string(),
                message: c.message,
            })
            .collect(),
        timestamp: Utc::now(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_is_ok() {
        assert_eq!(health_check().await, (StatusCode::OK, "ok"));
    }

    #[test]
    fn one_failing_check_makes_service_unready() {
        let (status, Json(body)) = readiness_response(vec![
            HealthCheck::healthy("catalog"),
            HealthCheck::unhealthy("repository", "pool timed out"),
        ]);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "unhealthy");
        assert_eq!(body.checks.len(), 2);
    }

    #[test]
    fn all_healthy_is_ready() {
        let (status, Json(body)) = readiness_response(vec![HealthCheck::healthy("repository")]);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "healthy");
    }
}
