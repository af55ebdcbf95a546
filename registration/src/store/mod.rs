//! Persistence for cohort aggregates.
//!
//! A cohort's ledger, registrations and waitlist are loaded and saved as one
//! unit. Saves are guarded by an optimistic version so a writer that did not
//! hold the cohort lock (another process, say) can never overwrite newer
//! state.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

use crate::aggregates::CohortState;
use crate::error::RegistrationError;
use crate::types::{CohortId, PaymentId, PromoUsage, Registration, RegistrationId, UserId, WaitlistEntryId};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;

/// Result alias for repository calls
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Stored version moved since the state was loaded
    #[error("cohort {0} was modified concurrently")]
    Conflict(CohortId),
    /// Database unreachable or query failed
    #[error("storage backend error: {0}")]
    Backend(String),
    /// Stored row could not be mapped back into the domain
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl From<RepositoryError> for RegistrationError {
    fn from(err: RepositoryError) -> Self {
        Self::Storage {
            conflict: matches!(err, RepositoryError::Conflict(_)),
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Work the expiry sweeper has to do
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DueExpiries {
    /// `PENDING_PAYMENT` registrations whose hold lapsed
    pub holds: Vec<(CohortId, RegistrationId)>,
    /// `NOTIFIED` waitlist entries whose offer lapsed
    pub offers: Vec<(CohortId, WaitlistEntryId)>,
}

impl DueExpiries {
    /// Whether there is nothing to expire
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holds.is_empty() && self.offers.is_empty()
    }
}

/// Storage for cohort aggregates and the lookups that span cohorts
pub trait RegistrationRepository: Send + Sync {
    /// Load a cohort's state, `None` if nothing was ever saved for it
    fn load(&self, cohort_id: CohortId) -> BoxFuture<'_, RepoResult<Option<CohortState>>>;

    /// Persist `state` if the stored version still equals `state.version`.
    /// Returns the new version.
    fn save<'a>(&'a self, state: &'a CohortState) -> BoxFuture<'a, RepoResult<u64>>;

    /// Cohort owning a registration
    fn locate_registration(&self, id: RegistrationId) -> BoxFuture<'_, RepoResult<Option<CohortId>>>;

    /// Cohort owning a waitlist entry
    fn locate_entry(&self, id: WaitlistEntryId) -> BoxFuture<'_, RepoResult<Option<CohortId>>>;

    /// Registration a gateway payment is attached to
    fn locate_payment<'a>(
        &'a self,
        payment_id: &'a PaymentId,
    ) -> BoxFuture<'a, RepoResult<Option<(CohortId, RegistrationId)>>>;

    /// Redemptions of a promo code: `PENDING_PAYMENT` and `CONFIRMED`
    /// registrations count, overall and for `user`
    fn promo_usage<'a>(&'a self, code: &'a str, user: UserId) -> BoxFuture<'a, RepoResult<PromoUsage>>;

    /// Holds and offers that lapsed before `now`
    fn due_expiries(&self, now: DateTime<Utc>) -> BoxFuture<'_, RepoResult<DueExpiries>>;

    /// Every registration a learner has made, newest first
    fn registrations_for_user(&self, user: UserId) -> BoxFuture<'_, RepoResult<Vec<Registration>>>;

    /// Cheap liveness probe
    fn ping(&self) -> BoxFuture<'_, RepoResult<()>>;
}
