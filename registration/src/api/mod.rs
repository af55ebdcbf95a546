//! HTTP API handlers.
//!
//! Handlers are thin: validate input with the functions below, turn the
//! caller's [`Identity`](enrollment_web::Identity) into an [`Actor`], call
//! the service, map the result. Ids in paths are taken as strings and parsed
//! here so malformed ids get the same structured 422 as malformed bodies.
//!
//! - Registrations: create, list, get, pay, confirm, cancel
//! - Waitlist: join, position, leave
//! - Cohorts: availability
//! - Payments: gateway webhook
//! - Admin: manual sweep

pub mod admin;
pub mod cohorts;
pub mod payments;
pub mod registrations;
pub mod waitlist;

use crate::aggregates::promo::MAX_CODE_LEN;
use crate::types::PaymentId;
use enrollment_web::AppError;
use std::str::FromStr;
use uuid::Uuid;

/// Longest accepted cancellation reason, in characters
pub const MAX_REASON_LEN: usize = 500;

/// Longest accepted gateway payment reference
pub const MAX_PAYMENT_ID_LEN: usize = 128;

/// Parse a path id into a typed id.
///
/// # Errors
///
/// `VALIDATION_ERROR` if `raw` is not a UUID.
pub fn parse_id<T: From<Uuid>>(field: &str, raw: &str) -> Result<T, AppError> {
    Uuid::from_str(raw.trim())
        .map(T::from)
        .map_err(|_| AppError::validation(format!("{field} must be a UUID")))
}

/// Check a promo code as typed by the learner. Blank means none.
///
/// # Errors
///
/// `VALIDATION_ERROR` for overlong codes or characters outside
/// letters, digits, `-` and `_`.
pub fn validate_promo_code(raw: Option<&str>) -> Result<Option<&str>, AppError> {
    let Some(code) = raw.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if code.chars().count() > MAX_CODE_LEN {
        return Err(AppError::validation(format!(
            "promo_code must be at most {MAX_CODE_LEN} characters"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::validation(
            "promo_code may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(Some(code))
}

/// Check a cancellation reason. Blank means none.
///
/// # Errors
///
/// `VALIDATION_ERROR` if longer than [`MAX_REASON_LEN`].
pub fn validate_reason(raw: Option<String>) -> Result<Option<String>, AppError> {
    let Some(reason) = raw.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(AppError::validation(format!(
            "reason must be at most {MAX_REASON_LEN} characters"
        )));
    }
    Ok(Some(reason))
}

/// Check a gateway payment reference.
///
/// # Errors
///
/// `VALIDATION_ERROR` if empty, overlong or containing whitespace.
pub fn validate_payment_id(raw: &str) -> Result<PaymentId, AppError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(AppError::validation("payment_id is required"));
    }
    if id.len() > MAX_PAYMENT_ID_LEN || id.chars().any(char::is_whitespace) {
        return Err(AppError::validation("payment_id is malformed"));
    }
    Ok(PaymentId::new(id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::CohortId;
    use axum::http::StatusCode;

    #[test]
    fn ids_must_be_uuids() {
        let id = Uuid::new_v4();
        let parsed: CohortId = parse_id("cohort_id", &id.to_string()).unwrap();
        assert_eq!(parsed.as_uuid(), &id);

        let err = parse_id::<CohortId>("cohort_id", "42").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn promo_codes_are_checked_before_lookup() {
        assert_eq!(validate_promo_code(None).unwrap(), None);
        assert_eq!(validate_promo_code(Some("   ")).unwrap(), None);
        assert_eq!(validate_promo_code(Some(" save20 ")).unwrap(), Some("save20"));
        assert!(validate_promo_code(Some("SAVE 20")).is_err());
        assert!(validate_promo_code(Some(&"X".repeat(MAX_CODE_LEN + 1))).is_err());
    }

    #[test]
    fn reasons_are_trimmed_and_bounded() {
        assert_eq!(validate_reason(Some("  ".into())).unwrap(), None);
        assert_eq!(validate_reason(Some(" moving ".into())).unwrap(), Some("moving".into()));
        assert!(validate_reason(Some("x".repeat(MAX_REASON_LEN + 1))).is_err());
    }

    #[test]
    fn payment_ids_reject_blank_and_whitespace() {
        assert_eq!(validate_payment_id(" pay_1 ").unwrap(), PaymentId::new("pay_1"));
        assert!(validate_payment_id("").is_err());
        assert!(validate_payment_id("pay 1").is_err());
    }
}
