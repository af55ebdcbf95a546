//! Waitlist endpoints.
//!
//! - `POST /api/cohorts/:id/waitlist` - queue for a full cohort
//! - `GET /api/cohorts/:id/waitlist/position` - the caller's place in line
//! - `DELETE /api/waitlist/:entry_id` - leave the queue

use super::{parse_id, validate_promo_code};
use crate::server::state::AppState;
use crate::service::{Actor, WaitlistPosition};
use crate::types::{CohortId, RegistrationId, WaitlistEntry, WaitlistEntryId, WaitlistStatus};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use enrollment_web::{AppError, Identity};
use serde::{Deserialize, Serialize};

/// Optional body of `POST /api/cohorts/:id/waitlist`
#[derive(Debug, Default, Deserialize)]
pub struct JoinWaitlistRequest {
    /// Promo code applied to the price once promoted
    pub promo_code: Option<String>,
}

/// A waitlist entry as returned to the learner
#[derive(Debug, Serialize)]
pub struct WaitlistEntryResponse {
    /// Entry id, used to leave
    pub entry_id: WaitlistEntryId,
    /// Cohort
    pub cohort_id: CohortId,
    /// Registration standing behind the entry
    pub registration_id: RegistrationId,
    /// Position in line
    pub position: u32,
    /// Entry state
    pub status: WaitlistStatus,
}

impl From<WaitlistEntry> for WaitlistEntryResponse {
    fn from(entry: WaitlistEntry) -> Self {
        Self {
            entry_id: entry.id,
            cohort_id: entry.cohort_id,
            registration_id: entry.registration_id,
            position: entry.position,
            status: entry.status,
        }
    }
}

/// Join a cohort's waitlist.
///
/// # Errors
///
/// `INVALID_STATE` while seats are free, `DUPLICATE_REGISTRATION` if already
/// registered or queued.
pub async fn join_waitlist(
    identity: Identity,
    State(state): State<AppState>,
    Path(cohort_id): Path<String>,
    body: Option<Json<JoinWaitlistRequest>>,
) -> Result<(StatusCode, Json<WaitlistEntryResponse>), AppError> {
    let cohort_id: CohortId = parse_id("cohort id", &cohort_id)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let promo_code = validate_promo_code(request.promo_code.as_deref())?;

    let (_, entry) = state
        .service
        .join_waitlist(Actor::from(identity), cohort_id, promo_code)
        .await?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

/// The caller's position in a cohort's waitlist.
///
/// # Errors
///
/// `NOT_FOUND` if the caller is not queued.
pub async fn get_position(
    identity: Identity,
    State(state): State<AppState>,
    Path(cohort_id): Path<String>,
) -> Result<Json<WaitlistPosition>, AppError> {
    let cohort_id: CohortId = parse_id("cohort id", &cohort_id)?;
    let position = state.service.waitlist_position(identity.into(), cohort_id).await?;
    Ok(Json(position))
}

/// Leave a waitlist.
///
/// # Errors
///
/// `NOT_FOUND`, `UNAUTHORIZED` for another learner's entry, `INVALID_STATE`
/// if the entry is already closed.
pub async fn leave_waitlist(
    identity: Identity,
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<WaitlistEntryResponse>, AppError> {
    let entry_id: WaitlistEntryId = parse_id("entry id", &entry_id)?;
    let entry = state.service.leave_waitlist(identity.into(), entry_id).await?;
    Ok(Json(entry.into()))
}
