//! Back-office endpoints. Admin role required.

use crate::server::state::AppState;
use crate::sweeper::SweepReport;
use axum::{Json, extract::State, http::StatusCode};
use enrollment_runtime::RunOutcome;
use enrollment_web::{AppError, Identity};
use serde::Serialize;

/// Result of a manual sweep
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    /// `completed` or `skipped`
    pub outcome: &'static str,
    /// Counts, when the sweep ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SweepReport>,
}

/// `POST /api/admin/sweeps`: run the expiry sweeper now.
///
/// Answers `200` with the report, or `202` when a sweep was already running
/// and this trigger was skipped.
///
/// # Errors
///
/// `FORBIDDEN` unless the caller is an admin.
pub async fn trigger_sweep(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SweepResponse>), AppError> {
    if !identity.is_admin() {
        return Err(AppError::forbidden("UNAUTHORIZED", "Admin role required"));
    }

    tracing::info!(user_id = %identity.user_id, "Manual sweep requested");
    let response = match state.sweeper.trigger().await {
        RunOutcome::Completed(report) => (
            StatusCode::OK,
            Json(SweepResponse {
                outcome: "completed",
                report: Some(report),
            }),
        ),
        RunOutcome::Skipped => (
            StatusCode::ACCEPTED,
            Json(SweepResponse {
                outcome: "skipped",
                report: None,
            }),
        ),
    };
    Ok(response)
}
