//! Cohort read endpoints.

use super::parse_id;
use crate::server::state::AppState;
use crate::service::Availability;
use crate::types::CohortId;
use axum::{
    Json,
    extract::{Path, State},
};
use enrollment_web::{AppError, Identity};

/// `GET /api/cohorts/:id/availability`
///
/// # Errors
///
/// `NOT_FOUND` for a cohort the catalog does not know.
pub async fn get_availability(
    _identity: Identity,
    State(state): State<AppState>,
    Path(cohort_id): Path<String>,
) -> Result<Json<Availability>, AppError> {
    let cohort_id: CohortId = parse_id("cohort id", &cohort_id)?;
    let availability = state.service.availability(cohort_id).await?;
    Ok(Json(availability))
}
