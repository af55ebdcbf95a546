//! In-process repository for development and tests.

use super::{DueExpiries, RegistrationRepository, RepoResult, RepositoryError};
use crate::aggregates::CohortState;
use crate::types::{
    CohortId, PaymentId, PromoUsage, Registration, RegistrationId, RegistrationStatus, UserId, WaitlistEntryId,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cohort states kept in a map, cloned in and out
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    cohorts: Arc<RwLock<HashMap<CohortId, CohortState>>>,
}

impl InMemoryRepository {
    /// Empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cohorts stored
    pub async fn len(&self) -> usize {
        self.cohorts.read().await.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.cohorts.read().await.is_empty()
    }
}

/// A waitlisted registration already carries its discounted price, so it
/// holds a redemption until it is cancelled or expires.
fn counts_towards_usage(status: RegistrationStatus) -> bool {
    status.is_active()
}

impl RegistrationRepository for InMemoryRepository {
    fn load(&self, cohort_id: CohortId) -> BoxFuture<'_, RepoResult<Option<CohortState>>> {
        Box::pin(async move { Ok(self.cohorts.read().await.get(&cohort_id).cloned()) })
    }

    fn save<'a>(&'a self, state: &'a CohortState) -> BoxFuture<'a, RepoResult<u64>> {
        Box::pin(async move {
            let mut cohorts = self.cohorts.write().await;
            let stored = cohorts.get(&state.cohort_id).map_or(0, |s| s.version);
            if stored != state.version {
                return Err(RepositoryError::Conflict(state.cohort_id));
            }

            let version = state.version + 1;
            let mut snapshot = state.clone();
            snapshot.version = version;
            snapshot.events.clear();
            snapshot.last_error = None;
            cohorts.insert(state.cohort_id, snapshot);
            Ok(version)
        })
    }

    fn locate_registration(&self, id: RegistrationId) -> BoxFuture<'_, RepoResult<Option<CohortId>>> {
        Box::pin(async move {
            Ok(self
                .cohorts
                .read()
                .await
                .values()
                .find(|s| s.registrations.contains_key(&id))
                .map(|s| s.cohort_id))
        })
    }

    fn locate_entry(&self, id: WaitlistEntryId) -> BoxFuture<'_, RepoResult<Option<CohortId>>> {
        Box::pin(async move {
            Ok(self
                .cohorts
                .read()
                .await
                .values()
                .find(|s| s.waitlist.get(id).is_some())
                .map(|s| s.cohort_id))
        })
    }

    fn locate_payment<'a>(
        &'a self,
        payment_id: &'a PaymentId,
    ) -> BoxFuture<'a, RepoResult<Option<(CohortId, RegistrationId)>>> {
        Box::pin(async move {
            let cohorts = self.cohorts.read().await;
            Ok(cohorts
                .values()
                .flat_map(|s| s.registrations.values())
                .find(|r| r.payment_id.as_ref() == Some(payment_id))
                .map(|r| (r.cohort_id, r.id)))
        })
    }

    fn promo_usage<'a>(&'a self, code: &'a str, user: UserId) -> BoxFuture<'a, RepoResult<PromoUsage>> {
        Box::pin(async move {
            let cohorts = self.cohorts.read().await;
            let mut usage = PromoUsage::default();
            for registration in cohorts.values().flat_map(|s| s.registrations.values()) {
                if registration.promo_code.as_deref() == Some(code) && counts_towards_usage(registration.status) {
                    usage.total += 1;
                    if registration.user_id == user {
                        usage.by_user += 1;
                    }
                }
            }
            Ok(usage)
        })
    }

    fn due_expiries(&self, now: DateTime<Utc>) -> BoxFuture<'_, RepoResult<DueExpiries>> {
        Box::pin(async move {
            let cohorts = self.cohorts.read().await;
            let mut due = DueExpiries::default();
            for state in cohorts.values() {
                due.holds
                    .extend(state.lapsed_holds(now).map(|id| (state.cohort_id, id)));
                due.offers
                    .extend(state.waitlist.lapsed_offers(now).map(|e| (state.cohort_id, e.id)));
            }
            Ok(due)
        })
    }

    fn registrations_for_user(&self, user: UserId) -> BoxFuture<'_, RepoResult<Vec<Registration>>> {
        Box::pin(async move {
            let cohorts = self.cohorts.read().await;
            let mut found: Vec<Registration> = cohorts
                .values()
                .flat_map(|s| s.registrations.values())
                .filter(|r| r.user_id == user)
                .cloned()
                .collect();
            found.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
            Ok(found)
        })
    }

    fn ping(&self) -> BoxFuture<'_, RepoResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
