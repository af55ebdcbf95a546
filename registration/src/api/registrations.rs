//! Registration endpoints.
//!
//! - `POST /api/registrations` - register for a cohort (seat hold or waitlist)
//! - `GET /api/registrations` - the caller's registrations
//! - `GET /api/registrations/:id` - one registration
//! - `POST /api/registrations/:id/payment` - open a payment for the hold
//! - `POST /api/registrations/:id/confirm` - confirm once the payment settled
//! - `POST /api/registrations/:id/cancel` - cancel, refunding if confirmed
//!
//! # Example
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/registrations \
//!   -H "X-User-Id: 7d0c2b8e-5f61-4a53-9a43-0c8f8f3f2f55" \
//!   -H "Content-Type: application/json" \
//!   -d '{"cohort_id": "550e8400-e29b-41d4-a716-446655440000", "promo_code": "SAVE20"}'
//! ```

use super::{parse_id, validate_payment_id, validate_promo_code, validate_reason};
use crate::server::state::AppState;
use crate::service::{Actor, PaymentSession};
use crate::types::{Registration, RegistrationId, RegistrationStatus};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use enrollment_web::{AppError, Identity};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /api/registrations`
#[derive(Debug, Deserialize)]
pub struct CreateRegistrationRequest {
    /// Cohort to register for
    pub cohort_id: String,
    /// Optional promo code
    pub promo_code: Option<String>,
}

/// Body of `POST /api/registrations/:id/confirm`
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    /// Gateway payment reference
    pub payment_id: String,
}

/// Body of `POST /api/registrations/:id/cancel`
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    /// Why the learner is cancelling
    pub reason: Option<String>,
}

/// Response for a newly created registration
#[derive(Debug, Serialize)]
pub struct CreateRegistrationResponse {
    /// The registration
    pub registration: Registration,
    /// Queue position when waitlisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_position: Option<u32>,
    /// What happens next
    pub message: String,
}

/// Response listing registrations
#[derive(Debug, Serialize)]
pub struct RegistrationList {
    /// Newest first
    pub registrations: Vec<Registration>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register the caller for a cohort.
///
/// Answers `201` with a `PENDING_PAYMENT` registration when a seat was held,
/// `202` with a `WAITLISTED` one when the cohort is full.
///
/// # Errors
///
/// `VALIDATION_ERROR`, `NOT_FOUND`, `DUPLICATE_REGISTRATION`,
/// `REGISTRATION_CLOSED` and the `PROMO_*` codes.
pub async fn create_registration(
    identity: Identity,
    State(state): State<AppState>,
    body: Result<Json<CreateRegistrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRegistrationResponse>), AppError> {
    let Json(request) = body?;
    let cohort_id = parse_id("cohort_id", &request.cohort_id)?;
    let promo_code = validate_promo_code(request.promo_code.as_deref())?;

    let actor = Actor::from(identity);
    let registration = state.service.initiate(actor, cohort_id, promo_code).await?;

    let (status, waitlist_position, message) = if registration.status == RegistrationStatus::Waitlisted {
        let position = state.service.waitlist_position(actor, cohort_id).await?.position;
        (
            StatusCode::ACCEPTED,
            Some(position),
            format!("Cohort is full. You are number {position} on the waitlist."),
        )
    } else {
        let deadline = registration
            .expires_at
            .map_or_else(String::new, |at| format!(" before {}", at.to_rfc3339()));
        (
            StatusCode::CREATED,
            None,
            format!("Seat held. Complete payment{deadline}."),
        )
    };

    Ok((
        status,
        Json(CreateRegistrationResponse {
            registration,
            waitlist_position,
            message,
        }),
    ))
}

/// The caller's registrations, newest first.
///
/// # Errors
///
/// Storage failures.
pub async fn list_registrations(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<Json<RegistrationList>, AppError> {
    let registrations = state.service.registrations_for(identity.into()).await?;
    Ok(Json(RegistrationList { registrations }))
}

/// One registration.
///
/// # Errors
///
/// `NOT_FOUND`, or `UNAUTHORIZED` for another learner's registration.
pub async fn get_registration(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Registration>, AppError> {
    let id: RegistrationId = parse_id("registration id", &id)?;
    let registration = state.service.get(identity.into(), id).await?;
    Ok(Json(registration))
}

/// Open a payment for a held seat. Repeated calls return the same payment.
///
/// # Errors
///
/// `INVALID_STATE` unless pending payment, `EXTERNAL_SERVICE_ERROR` if the
/// gateway fails.
pub async fn start_payment(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentSession>, AppError> {
    let id: RegistrationId = parse_id("registration id", &id)?;
    let session = state.service.start_payment(identity.into(), id).await?;
    Ok(Json(session))
}

/// Confirm a registration whose payment settled.
///
/// # Errors
///
/// `PAYMENT_NOT_SETTLED`, `INVALID_STATE`, or a retryable
/// `EXTERNAL_SERVICE_ERROR` when the gateway cannot be reached.
pub async fn confirm_registration(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<Registration>, AppError> {
    let Json(request) = body?;
    let id: RegistrationId = parse_id("registration id", &id)?;
    let payment_id = validate_payment_id(&request.payment_id)?;

    let registration = state.service.confirm(identity.into(), id, payment_id).await?;
    Ok(Json(registration))
}

/// Cancel a registration. The body is optional.
///
/// # Errors
///
/// `INVALID_STATE` if already closed, `EXTERNAL_SERVICE_ERROR` if the refund
/// fails (the registration stays confirmed).
pub async fn cancel_registration(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Registration>, AppError> {
    let id: RegistrationId = parse_id("registration id", &id)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let reason = validate_reason(request.reason)?;

    let registration = state.service.cancel(identity.into(), id, reason).await?;
    Ok(Json(registration))
}
