//! Periodic expiry of lapsed seat holds and waitlist offers.
//!
//! The sweeper only finds candidates; every expiry goes through the service
//! and so through the same per-cohort lock and reducer checks as a learner
//! request. A candidate that was confirmed or cancelled in the meantime is
//! refused by the reducer and counted as skipped, as is one that another
//! sweep already expired.

use crate::error::RegistrationError;
use crate::metrics;
use crate::service::RegistrationService;
use enrollment_runtime::{OverlapGuard, RunOutcome, spawn_periodic};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Task name used in logs and scheduler metrics
pub const SWEEPER_TASK: &str = "expiry_sweeper";

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Holds moved to `EXPIRED`
    pub expired_registrations: usize,
    /// Waitlist offers moved to `EXPIRED`
    pub expired_offers: usize,
    /// Candidates that were no longer due
    pub skipped: usize,
    /// Candidates that failed; retried next sweep
    pub failures: usize,
}

/// Runs expiry sweeps, never two at once
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    service: RegistrationService,
    guard: OverlapGuard,
    interval: Duration,
}

impl ExpirySweeper {
    /// Sweeper over `service`, ticking every `interval`
    #[must_use]
    pub fn new(service: RegistrationService, interval: Duration) -> Self {
        Self {
            service,
            guard: OverlapGuard::new(),
            interval,
        }
    }

    /// Whether a sweep is in flight
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Sweep now unless a sweep is already running.
    pub async fn trigger(&self) -> RunOutcome<SweepReport> {
        let outcome = self.guard.run(|| self.run_once()).await;
        metrics::record_sweep(matches!(outcome, RunOutcome::Skipped));
        if matches!(outcome, RunOutcome::Skipped) {
            tracing::info!("Sweep already in progress, trigger skipped");
        }
        outcome
    }

    /// Start the periodic schedule. Stops when `shutdown` flips to `true`.
    #[must_use]
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let sweeper = self.clone();
        spawn_periodic(
            SWEEPER_TASK,
            self.interval,
            self.guard.clone(),
            move || {
                let sweeper = sweeper.clone();
                async move {
                    sweeper.run_once().await;
                    metrics::record_sweep(false);
                }
            },
            shutdown,
        )
    }

    /// One pass over everything due. Failures are logged and counted; the
    /// pass always runs to the end.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.service.now();

        let due = match self.service.repository().due_expiries(now).await {
            Ok(due) => due,
            Err(error) => {
                tracing::error!(%error, "Failed to list due expiries");
                report.failures += 1;
                metrics::record_sweep_failures(report.failures);
                return report;
            },
        };

        for (cohort_id, registration_id) in due.holds {
            match self.service.expire_registration(cohort_id, registration_id).await {
                Ok(true) => report.expired_registrations += 1,
                Ok(false) => report.skipped += 1,
                Err(RegistrationError::InvalidState(reason)) => {
                    tracing::debug!(%registration_id, %reason, "Hold no longer due");
                    report.skipped += 1;
                },
                Err(error) => {
                    tracing::warn!(%cohort_id, %registration_id, %error, "Failed to expire hold");
                    report.failures += 1;
                },
            }
        }

        for (cohort_id, entry_id) in due.offers {
            match self.service.expire_offer(cohort_id, entry_id).await {
                Ok(true) => report.expired_offers += 1,
                Ok(false) => report.skipped += 1,
                Err(RegistrationError::InvalidState(reason)) => {
                    tracing::debug!(%entry_id, %reason, "Offer no longer due");
                    report.skipped += 1;
                },
                Err(error) => {
                    tracing::warn!(%cohort_id, %entry_id, %error, "Failed to expire waitlist offer");
                    report.failures += 1;
                },
            }
        }

        let pruned = self.service.locks().prune();
        metrics::record_sweep_failures(report.failures);
        tracing::info!(
            expired_registrations = report.expired_registrations,
            expired_offers = report.expired_offers,
            skipped = report.skipped,
            failures = report.failures,
            pruned_locks = pruned,
            "Expiry sweep finished"
        );
        report
    }
}
