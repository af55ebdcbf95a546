//! Business metrics for registrations.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `registration_initiated_total{outcome}` - `pending_payment` or `waitlisted`
//! - `registration_confirmed_total`
//! - `registration_cancelled_total{from}`
//! - `registration_expired_total`
//! - `waitlist_joined_total`
//! - `waitlist_promoted_total`
//! - `waitlist_offer_expired_total`
//! - `sweeper_runs_total{outcome}` - `completed` or `skipped`
//! - `sweeper_item_failures_total`
//! - `payment_gateway_calls_total{operation,outcome}`
//!
//! ## Histograms
//! - `payment_gateway_call_duration_seconds{operation}`

use crate::aggregates::CohortEvent;
use crate::types::RegistrationStatus;
use metrics::{describe_counter, describe_histogram};

/// Register descriptions for every business metric.
///
/// Call once at startup, after the recorder is installed.
pub fn register_registration_metrics() {
    describe_counter!(
        "registration_initiated_total",
        "Registrations created, by initial status (pending_payment, waitlisted)"
    );
    describe_counter!("registration_confirmed_total", "Registrations confirmed after payment");
    describe_counter!(
        "registration_cancelled_total",
        "Registrations cancelled, by the status they were cancelled from"
    );
    describe_counter!("registration_expired_total", "Seat holds that lapsed unpaid");
    describe_counter!("waitlist_joined_total", "Learners added to a waitlist");
    describe_counter!("waitlist_promoted_total", "Waitlist entries offered a freed seat");
    describe_counter!("waitlist_offer_expired_total", "Waitlist offers that lapsed");
    describe_counter!("sweeper_runs_total", "Expiry sweeps, by outcome (completed, skipped)");
    describe_counter!(
        "sweeper_item_failures_total",
        "Individual expiries that failed during a sweep"
    );
    describe_counter!(
        "payment_gateway_calls_total",
        "Payment gateway calls, by operation and outcome"
    );
    describe_histogram!(
        "payment_gateway_call_duration_seconds",
        "Payment gateway call latency, including retries"
    );

    tracing::info!("Registration metrics registered");
}

/// Record one reducer event
pub fn record_event(event: &CohortEvent) {
    match event {
        CohortEvent::RegistrationInitiated { status, .. } => {
            let outcome = if *status == RegistrationStatus::Waitlisted {
                "waitlisted"
            } else {
                "pending_payment"
            };
            metrics::counter!("registration_initiated_total", "outcome" => outcome).increment(1);
        },
        CohortEvent::RegistrationConfirmed { .. } => {
            metrics::counter!("registration_confirmed_total").increment(1);
        },
        CohortEvent::RegistrationCancelled { from, .. } => {
            metrics::counter!("registration_cancelled_total", "from" => from.as_str()).increment(1);
        },
        CohortEvent::RegistrationExpired { .. } => {
            metrics::counter!("registration_expired_total").increment(1);
        },
        CohortEvent::WaitlistJoined { .. } => {
            metrics::counter!("waitlist_joined_total").increment(1);
        },
        CohortEvent::WaitlistPromoted { .. } => {
            metrics::counter!("waitlist_promoted_total").increment(1);
        },
        CohortEvent::WaitlistOfferExpired { .. } => {
            metrics::counter!("waitlist_offer_expired_total").increment(1);
        },
        CohortEvent::PaymentAttached { .. }
        | CohortEvent::SeatFreed { .. }
        | CohortEvent::WaitlistLeft { .. }
        | CohortEvent::WaitlistConverted { .. }
        | CohortEvent::PaymentHoldVoided { .. } => {},
    }
}

/// Record a gateway call and how long it took
pub fn record_gateway_call(operation: &'static str, success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("payment_gateway_calls_total", "operation" => operation, "outcome" => outcome).increment(1);
    metrics::histogram!("payment_gateway_call_duration_seconds", "operation" => operation).record(duration_secs);
}

/// Record a sweep run
pub fn record_sweep(skipped: bool) {
    let outcome = if skipped { "skipped" } else { "completed" };
    metrics::counter!("sweeper_runs_total", "outcome" => outcome).increment(1);
}

/// Record failed expiries within one sweep
pub fn record_sweep_failures(count: usize) {
    if count > 0 {
        metrics::counter!("sweeper_item_failures_total").increment(u64::try_from(count).unwrap_or(u64::MAX));
    }
}
