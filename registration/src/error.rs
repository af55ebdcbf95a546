//! Registration error taxonomy.
//!
//! Every variant carries a stable reason code for API clients. Mapping to
//! HTTP lives at the bottom of this file so handlers can use `?` directly.

use crate::types::{CohortId, PaymentId, RegistrationId, UserId};
use enrollment_web::AppError;
use thiserror::Error;

/// Why a promo code was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoRejection {
    /// No such code
    #[error("promo code not found")]
    NotFound,
    /// Validity window has ended
    #[error("promo code has expired")]
    Expired,
    /// Validity window has not started
    #[error("promo code is not active yet")]
    NotYetActive,
    /// Global or per-learner limit reached
    #[error("promo code usage limit reached")]
    UsageLimitExceeded,
    /// Restricted to other cohorts or programs
    #[error("promo code does not apply to this cohort")]
    NotApplicableToCohort,
}

impl PromoRejection {
    /// Machine-readable reason code
    #[must_use]
    pub const fn reason_code(self) -> &'static str {
        match self {
            Self::NotFound => "PROMO_NOT_FOUND",
            Self::Expired => "PROMO_EXPIRED",
            Self::NotYetActive => "PROMO_NOT_YET_ACTIVE",
            Self::UsageLimitExceeded => "PROMO_USAGE_LIMIT_EXCEEDED",
            Self::NotApplicableToCohort => "PROMO_NOT_APPLICABLE",
        }
    }
}

/// Errors surfaced by registration operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Malformed input, caught before any state change
    #[error("validation failed: {0}")]
    Validation(String),

    /// The learner already has an active registration for the cohort
    #[error("user {user_id} already has an active registration for cohort {cohort_id}")]
    DuplicateRegistration {
        /// Learner
        user_id: UserId,
        /// Cohort
        cohort_id: CohortId,
    },

    /// Outside the cohort's registration window
    #[error("registration for cohort {0} is closed")]
    RegistrationClosed(CohortId),

    /// No seat free. Initiation turns this into a waitlist join.
    #[error("cohort {0} has no free seats")]
    NoCapacity(CohortId),

    /// Transition not allowed from the current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The gateway does not report the payment as paid
    #[error("payment {payment_id} is not settled (status: {status})")]
    PaymentNotSettled {
        /// Payment
        payment_id: PaymentId,
        /// Status reported by the gateway
        status: String,
    },

    /// Unknown id
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of thing
        resource: &'static str,
        /// Id as given
        id: String,
    },

    /// A collaborator failed or timed out
    #[error("{service} failed: {message}")]
    ExternalService {
        /// Collaborator name
        service: &'static str,
        /// Failure detail
        message: String,
        /// Whether the caller may retry
        retryable: bool,
    },

    /// The caller lacks rights over the target
    #[error("not allowed: {0}")]
    Unauthorized(String),

    /// A supplied promo code was refused
    #[error(transparent)]
    PromoRejected(#[from] PromoRejection),

    /// Persistence failed
    #[error("storage error: {message}")]
    Storage {
        /// Failure detail
        message: String,
        /// Another writer got there first; retrying will reload fresh state
        conflict: bool,
    },
}

impl RegistrationError {
    /// Shorthand for [`RegistrationError::NotFound`] on a registration
    #[must_use]
    pub fn registration_not_found(id: RegistrationId) -> Self {
        Self::NotFound {
            resource: "registration",
            id: id.to_string(),
        }
    }

    /// Machine-readable reason code
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateRegistration { .. } => "DUPLICATE_REGISTRATION",
            Self::RegistrationClosed(_) => "REGISTRATION_CLOSED",
            Self::NoCapacity(_) => "NO_CAPACITY",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::PaymentNotSettled { .. } => "PAYMENT_NOT_SETTLED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::PromoRejected(reason) => reason.reason_code(),
            Self::Storage { conflict: true, .. } => "CONCURRENCY_CONFLICT",
            Self::Storage { .. } => "STORAGE_ERROR",
        }
    }

    /// Whether retrying the same call may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalService { retryable, .. } => *retryable,
            Self::Storage { conflict, .. } => *conflict,
            _ => false,
        }
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        let code = err.reason_code();
        let message = err.to_string();
        let app = match &err {
            RegistrationError::Validation(_) | RegistrationError::PromoRejected(_) => {
                Self::unprocessable(code, message)
            },
            RegistrationError::DuplicateRegistration { .. }
            | RegistrationError::RegistrationClosed(_)
            | RegistrationError::NoCapacity(_)
            | RegistrationError::InvalidState(_)
            | RegistrationError::PaymentNotSettled { .. }
            | RegistrationError::Storage { conflict: true, .. } => Self::conflict(code, message),
            RegistrationError::NotFound { resource, id } => Self::not_found(resource, id),
            RegistrationError::Unauthorized(_) => Self::forbidden(code, message),
            RegistrationError::ExternalService { .. } => Self::bad_gateway(code, message),
            RegistrationError::Storage { .. } => Self::internal("An internal error occurred")
                .with_source(anyhow::Error::new(err.clone())),
        };
        if err.is_retryable() { app.retryable() } else { app }
    }
}
