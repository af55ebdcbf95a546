//! The routing table.
//!
//! Every public operation is listed once in [`Operation::ALL`] with its
//! method and path; [`api_router`] folds the table into an axum router.

use super::state::AppState;
use crate::api::{admin, cohorts, payments, registrations, waitlist};
use axum::{
    Router,
    http::Method,
    routing::{MethodRouter, delete, get, post},
};

/// A public operation of the registration API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `POST /api/registrations`
    CreateRegistration,
    /// `GET /api/registrations`
    ListRegistrations,
    /// `GET /api/registrations/:id`
    GetRegistration,
    /// `POST /api/registrations/:id/payment`
    StartPayment,
    /// `POST /api/registrations/:id/confirm`
    ConfirmRegistration,
    /// `POST /api/registrations/:id/cancel`
    CancelRegistration,
    /// `POST /api/cohorts/:id/waitlist`
    JoinWaitlist,
    /// `GET /api/cohorts/:id/waitlist/position`
    WaitlistPosition,
    /// `DELETE /api/waitlist/:entry_id`
    LeaveWaitlist,
    /// `GET /api/cohorts/:id/availability`
    CohortAvailability,
    /// `POST /api/payments/webhook`
    PaymentWebhook,
    /// `POST /api/admin/sweeps`
    TriggerSweep,
}

impl Operation {
    /// Every operation, in routing order
    pub const ALL: [Self; 12] = [
        Self::CreateRegistration,
        Self::ListRegistrations,
        Self::GetRegistration,
        Self::StartPayment,
        Self::ConfirmRegistration,
        Self::CancelRegistration,
        Self::JoinWaitlist,
        Self::WaitlistPosition,
        Self::LeaveWaitlist,
        Self::CohortAvailability,
        Self::PaymentWebhook,
        Self::TriggerSweep,
    ];

    /// Stable name, used in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreateRegistration => "create_registration",
            Self::ListRegistrations => "list_registrations",
            Self::GetRegistration => "get_registration",
            Self::StartPayment => "start_payment",
            Self::ConfirmRegistration => "confirm_registration",
            Self::CancelRegistration => "cancel_registration",
            Self::JoinWaitlist => "join_waitlist",
            Self::WaitlistPosition => "waitlist_position",
            Self::LeaveWaitlist => "leave_waitlist",
            Self::CohortAvailability => "cohort_availability",
            Self::PaymentWebhook => "payment_webhook",
            Self::TriggerSweep => "trigger_sweep",
        }
    }

    /// HTTP method
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::ListRegistrations | Self::GetRegistration | Self::WaitlistPosition | Self::CohortAvailability => {
                Method::GET
            },
            Self::LeaveWaitlist => Method::DELETE,
            Self::CreateRegistration
            | Self::StartPayment
            | Self::ConfirmRegistration
            | Self::CancelRegistration
            | Self::JoinWaitlist
            | Self::PaymentWebhook
            | Self::TriggerSweep => Method::POST,
        }
    }

    /// Path relative to `/api`
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::CreateRegistration | Self::ListRegistrations => "/registrations",
            Self::GetRegistration => "/registrations/:id",
            Self::StartPayment => "/registrations/:id/payment",
            Self::ConfirmRegistration => "/registrations/:id/confirm",
            Self::CancelRegistration => "/registrations/:id/cancel",
            Self::JoinWaitlist => "/cohorts/:id/waitlist",
            Self::WaitlistPosition => "/cohorts/:id/waitlist/position",
            Self::LeaveWaitlist => "/waitlist/:entry_id",
            Self::CohortAvailability => "/cohorts/:id/availability",
            Self::PaymentWebhook => "/payments/webhook",
            Self::TriggerSweep => "/admin/sweeps",
        }
    }

    fn handler(self) -> MethodRouter<AppState> {
        match self {
            Self::CreateRegistration => post(registrations::create_registration),
            Self::ListRegistrations => get(registrations::list_registrations),
            Self::GetRegistration => get(registrations::get_registration),
            Self::StartPayment => post(registrations::start_payment),
            Self::ConfirmRegistration => post(registrations::confirm_registration),
            Self::CancelRegistration => post(registrations::cancel_registration),
            Self::JoinWaitlist => post(waitlist::join_waitlist),
            Self::WaitlistPosition => get(waitlist::get_position),
            Self::LeaveWaitlist => delete(waitlist::leave_waitlist),
            Self::CohortAvailability => get(cohorts::get_availability),
            Self::PaymentWebhook => post(payments::payment_webhook),
            Self::TriggerSweep => post(admin::trigger_sweep),
        }
    }
}

/// Router for every operation in the table, to be nested under `/api`.
///
/// Operations sharing a path are merged onto one route.
pub fn api_router() -> Router<AppState> {
    Operation::ALL.into_iter().fold(Router::new(), |router, operation| {
        tracing::debug!(
            operation = operation.name(),
            method = %operation.method(),
            path = operation.path(),
            "Route registered"
        );
        router.route(operation.path(), operation.handler())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn method_and_path_pairs_are_unique() {
        let pairs: HashSet<_> = Operation::ALL
            .iter()
            .map(|op| (op.method(), op.path()))
            .collect();
        assert_eq!(pairs.len(), Operation::ALL.len());
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = Operation::ALL.iter().map(|op| op.name()).collect();
        assert_eq!(names.len(), Operation::ALL.len());
    }
}
