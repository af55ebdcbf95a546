//! Payment gateway webhook.
//!
//! `POST /api/payments/webhook` with `{"payment_id": "...", "status": "paid"}`.
//! Deliveries may repeat; a repeat for a confirmed registration is a no-op.
//! When a webhook secret is configured the gateway must send it in
//! `X-Webhook-Secret`; there is no learner identity on this route.

use super::validate_payment_id;
use crate::payment_gateway::PaymentStatus;
use crate::server::state::AppState;
use crate::service::WebhookOutcome;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use enrollment_web::AppError;
use serde::{Deserialize, Serialize};

/// Header carrying the webhook shared secret
pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// Webhook body
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    /// Gateway payment reference
    pub payment_id: String,
    /// Final or interim status
    pub status: PaymentStatus,
}

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// What the delivery did
    pub outcome: WebhookOutcome,
}

/// Receive a payment status update.
///
/// # Errors
///
/// `UNAUTHORIZED` on a missing or wrong secret, `NOT_FOUND` for a payment no
/// registration carries.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<WebhookRequest>, JsonRejection>,
) -> Result<Json<WebhookResponse>, AppError> {
    if let Some(expected) = state.webhook_secret.as_deref() {
        let presented = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            tracing::warn!("Webhook rejected: bad or missing secret");
            return Err(AppError::unauthorized("Invalid webhook secret"));
        }
    }

    let Json(request) = body?;
    let payment_id = validate_payment_id(&request.payment_id)?;
    let outcome = state
        .service
        .handle_payment_webhook(payment_id, request.status)
        .await?;
    Ok(Json(WebhookResponse { outcome }))
}
