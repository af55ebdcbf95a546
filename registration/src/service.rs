//! Registration service: the entry point for every operation.
//!
//! Each command follows the same path:
//!
//! 1. Resolve the owning cohort and check the caller's rights.
//! 2. Make any slow collaborator call (payment status) outside the lock.
//! 3. Take the cohort's lock, load, reduce, save, release.
//! 4. Run the reducer's effects (notifications, voids) and feed any
//!    resulting actions back through step 3.
//!
//! Work on different cohorts never contends; work on one cohort is strictly
//! serialized, which is what keeps seat counts and queue positions exact.

use crate::aggregates::{CohortAction, CohortEnvironment, CohortReducer, CohortState, Policy, PromoInput, promo};
use crate::catalog::{Catalog, CatalogError};
use crate::config::Config;
use crate::error::RegistrationError;
use crate::metrics;
use crate::notifier::Notifier;
use crate::payment_gateway::{PaymentGateway, PaymentGatewayError, PaymentStatus};
use crate::store::RegistrationRepository;
use crate::types::{
    Cohort, CohortId, Money, PaymentId, Registration, RegistrationId, RegistrationStatus, UserId, WaitlistEntry,
    WaitlistEntryId, WaitlistStatus,
};
use enrollment_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use enrollment_runtime::{KeyedLocks, RetryPolicy, execute_all, retry_with_backoff};
use enrollment_web::{Identity, Role};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Result<T> = std::result::Result<T, RegistrationError>;

type Effects = SmallVec<[Effect<CohortAction>; 4]>;

impl From<PaymentGatewayError> for RegistrationError {
    fn from(err: PaymentGatewayError) -> Self {
        Self::ExternalService {
            service: "payment gateway",
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

impl From<CatalogError> for RegistrationError {
    fn from(err: CatalogError) -> Self {
        Self::ExternalService {
            service: "catalog",
            retryable: matches!(err, CatalogError::Unavailable(_)),
            message: err.to_string(),
        }
    }
}

/// Who is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Caller
    pub user_id: UserId,
    /// Admins may act on anyone's registrations
    pub is_admin: bool,
}

impl Actor {
    /// A learner acting for themselves
    #[must_use]
    pub const fn learner(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    /// Back-office staff
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self { user_id, is_admin: true }
    }

    fn authorize(&self, owner: UserId) -> Result<()> {
        if self.is_admin || self.user_id == owner {
            Ok(())
        } else {
            Err(RegistrationError::Unauthorized(
                "resource belongs to another learner".to_string(),
            ))
        }
    }
}

impl From<Identity> for Actor {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: UserId::from_uuid(identity.user_id),
            is_admin: identity.role == Role::Admin,
        }
    }
}

/// Tunables that are not part of the reducer's policy
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Currency sent to the gateway
    pub currency: String,
    /// Bound on every gateway call
    pub gateway_timeout: Duration,
    /// Retries for payment status reads
    pub status_retry: RetryPolicy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            currency: "SAR".to_string(),
            gateway_timeout: Duration::from_secs(10),
            status_retry: RetryPolicy::default(),
        }
    }
}

impl ServiceSettings {
    /// Settings from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            currency: config.registration.currency.clone(),
            gateway_timeout: config.gateway_timeout(),
            status_retry: RetryPolicy::builder()
                .max_retries(config.gateway.max_retries)
                .build(),
        }
    }
}

/// External systems the service talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Persistence
    pub repository: Arc<dyn RegistrationRepository>,
    /// Cohorts and promo codes
    pub catalog: Arc<dyn Catalog>,
    /// Payments
    pub gateway: Arc<dyn PaymentGateway>,
    /// Learner notifications
    pub notifier: Arc<dyn Notifier>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// A payment opened for a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSession {
    /// Registration
    pub registration_id: RegistrationId,
    /// Gateway reference
    pub payment_id: PaymentId,
    /// Amount due
    pub amount: Money,
    /// Currency
    pub currency: String,
}

/// A learner's place in a cohort's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitlistPosition {
    /// Entry
    pub entry_id: WaitlistEntryId,
    /// Cohort
    pub cohort_id: CohortId,
    /// 1-based position
    pub position: u32,
    /// `WAITING` or `NOTIFIED`
    pub status: WaitlistStatus,
}

/// Seat counts for a cohort
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    /// Cohort
    pub cohort_id: CohortId,
    /// Seats offered
    pub capacity: u32,
    /// Confirmed enrollments
    pub enrolled: u32,
    /// Seats on hold
    pub held: u32,
    /// Free seats
    pub available: u32,
    /// Learners queued
    pub waitlist_length: usize,
}

/// What a webhook delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The registration was confirmed
    Confirmed,
    /// Duplicate delivery; nothing changed
    AlreadyConfirmed,
    /// Non-final or failed status recorded; the hold stays until expiry
    Acknowledged,
    /// Paid, but the registration can no longer be confirmed
    Ignored,
}

/// Orchestrates the cohort reducer with persistence and collaborators
#[derive(Clone)]
pub struct RegistrationService {
    repository: Arc<dyn RegistrationRepository>,
    catalog: Arc<dyn Catalog>,
    gateway: Arc<dyn PaymentGateway>,
    env: CohortEnvironment,
    locks: Arc<KeyedLocks<CohortId>>,
    settings: Arc<ServiceSettings>,
}

impl std::fmt::Debug for RegistrationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationService")
            .field("env", &self.env)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RegistrationService {
    /// Wire the service
    #[must_use]
    pub fn new(collaborators: Collaborators, policy: Policy, settings: ServiceSettings) -> Self {
        let Collaborators {
            repository,
            catalog,
            gateway,
            notifier,
            clock,
        } = collaborators;
        Self {
            env: CohortEnvironment {
                clock,
                policy,
                notifier,
                gateway: Arc::clone(&gateway),
                call_timeout: settings.gateway_timeout,
            },
            repository,
            catalog,
            gateway,
            locks: Arc::new(KeyedLocks::new()),
            settings: Arc::new(settings),
        }
    }

    /// Current time as the service sees it
    #[must_use]
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.env.clock.now()
    }

    /// Per-cohort lock registry
    #[must_use]
    pub fn locks(&self) -> &KeyedLocks<CohortId> {
        &self.locks
    }

    /// Repository, for readiness checks and the sweeper
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn RegistrationRepository> {
        &self.repository
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Register for a cohort: a held seat if one is free, the waitlist if not.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown cohort, `DuplicateRegistration`,
    /// `RegistrationClosed`, `PromoRejected`, or storage/catalog failures.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn initiate(&self, actor: Actor, cohort_id: CohortId, promo_code: Option<&str>) -> Result<Registration> {
        let (registration, _) = self.register(actor, cohort_id, promo_code, false).await?;
        tracing::info!(
            registration_id = %registration.id,
            status = %registration.status,
            price = %registration.price,
            "Registration initiated"
        );
        Ok(registration)
    }

    /// Queue for a full cohort.
    ///
    /// # Errors
    ///
    /// `InvalidState` if a seat is free, plus everything [`Self::initiate`]
    /// can return.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn join_waitlist(
        &self,
        actor: Actor,
        cohort_id: CohortId,
        promo_code: Option<&str>,
    ) -> Result<(Registration, WaitlistEntry)> {
        let (registration, state) = self.register(actor, cohort_id, promo_code, true).await?;
        let entry = state
            .waitlist
            .active_for_registration(registration.id)
            .cloned()
            .ok_or_else(|| RegistrationError::InvalidState("registration was not queued".to_string()))?;
        tracing::info!(entry_id = %entry.id, position = entry.position, "Joined waitlist");
        Ok((registration, entry))
    }

    async fn register(
        &self,
        actor: Actor,
        cohort_id: CohortId,
        promo_code: Option<&str>,
        waitlist_only: bool,
    ) -> Result<(Registration, CohortState)> {
        let cohort = self.cohort(cohort_id).await?;
        let promo = self.promo_input(promo_code, actor.user_id).await?;
        let registration_id = RegistrationId::new();

        let state = self
            .dispatch(
                cohort_id,
                CohortAction::Initiate {
                    registration_id,
                    entry_id: WaitlistEntryId::new(),
                    user_id: actor.user_id,
                    cohort,
                    promo,
                    waitlist_only,
                },
            )
            .await?;
        let registration = state
            .registration(registration_id)
            .cloned()
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))?;
        Ok((registration, state))
    }

    /// Open a payment for a `PENDING_PAYMENT` registration. Returns the
    /// existing payment if one is already attached.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless pending payment, `ExternalService` on gateway
    /// failure.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn start_payment(&self, actor: Actor, registration_id: RegistrationId) -> Result<PaymentSession> {
        let cohort_id = self.locate(registration_id).await?;

        let guard = self.locks.lock(&cohort_id).await;
        let mut state = self.load_existing(cohort_id).await?;
        let registration = find(&state, registration_id)?.clone();
        actor.authorize(registration.user_id)?;

        if registration.status != RegistrationStatus::PendingPayment {
            return Err(RegistrationError::InvalidState(format!(
                "cannot pay for a {} registration",
                registration.status
            )));
        }
        let session = |payment_id| PaymentSession {
            registration_id,
            payment_id,
            amount: registration.price,
            currency: self.settings.currency.clone(),
        };
        if let Some(payment_id) = registration.payment_id.clone() {
            return Ok(session(payment_id));
        }

        let started = Instant::now();
        let created = self
            .bounded(self.gateway.create_payment(registration_id, registration.price, &self.settings.currency))
            .await;
        metrics::record_gateway_call("create_payment", created.is_ok(), started.elapsed().as_secs_f64());
        let payment_id = created?;

        let effects = self.apply(
            &mut state,
            CohortAction::AttachPayment {
                registration_id,
                payment_id: payment_id.clone(),
            },
        )?;
        self.persist(&mut state).await?;
        drop(guard);
        self.run_effects(cohort_id, effects).await;

        tracing::info!(%registration_id, %payment_id, "Payment started");
        Ok(session(payment_id))
    }

    /// Confirm after verifying the payment settled.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless pending payment, `PaymentNotSettled` if the
    /// gateway does not report it paid, `ExternalService` if the gateway
    /// cannot be reached.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn confirm(
        &self,
        actor: Actor,
        registration_id: RegistrationId,
        payment_id: PaymentId,
    ) -> Result<Registration> {
        let cohort_id = self.locate(registration_id).await?;
        let current = self.snapshot(cohort_id, registration_id).await?;
        actor.authorize(current.user_id)?;
        if current.status != RegistrationStatus::PendingPayment {
            return Err(RegistrationError::InvalidState(format!(
                "cannot confirm a {} registration",
                current.status
            )));
        }
        if let Some((_, owner)) = self.repository.locate_payment(&payment_id).await? {
            if owner != registration_id {
                return Err(RegistrationError::Validation(format!(
                    "payment {payment_id} belongs to another registration"
                )));
            }
        }

        self.verify_paid(&payment_id).await?;

        let state = self
            .dispatch(
                cohort_id,
                CohortAction::Confirm {
                    registration_id,
                    payment_id,
                },
            )
            .await?;
        let registration = find(&state, registration_id)?.clone();
        tracing::info!(%registration_id, "Registration confirmed");
        Ok(registration)
    }

    /// Cancel. A confirmed registration is refunded first; if the refund
    /// fails nothing changes.
    ///
    /// # Errors
    ///
    /// `InvalidState` from `CANCELLED`/`EXPIRED`, `ExternalService` if the
    /// refund fails.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn cancel(
        &self,
        actor: Actor,
        registration_id: RegistrationId,
        reason: Option<String>,
    ) -> Result<Registration> {
        let cohort_id = self.locate(registration_id).await?;

        let guard = self.locks.lock(&cohort_id).await;
        let mut state = self.load_existing(cohort_id).await?;
        let registration = find(&state, registration_id)?.clone();
        actor.authorize(registration.user_id)?;

        let refunded = match (&registration.status, &registration.payment_id) {
            (RegistrationStatus::Confirmed, Some(payment_id)) => {
                let started = Instant::now();
                let refund = self.bounded(self.gateway.refund(payment_id, reason.as_deref())).await;
                metrics::record_gateway_call("refund", refund.is_ok(), started.elapsed().as_secs_f64());
                let refund_id = refund?;
                tracing::info!(%registration_id, %payment_id, %refund_id, "Refund issued");
                true
            },
            (RegistrationStatus::Cancelled | RegistrationStatus::Expired, _) => {
                return Err(RegistrationError::InvalidState(format!(
                    "cannot cancel a {} registration",
                    registration.status
                )));
            },
            _ => false,
        };

        let effects = self.apply(
            &mut state,
            CohortAction::Cancel {
                registration_id,
                reason,
                refunded,
            },
        )?;
        self.persist(&mut state).await?;
        let cancelled = find(&state, registration_id)?.clone();
        drop(guard);
        self.run_effects(cohort_id, effects).await;

        tracing::info!(%registration_id, refunded, "Registration cancelled");
        Ok(cancelled)
    }

    /// Leave a cohort's waitlist; the underlying registration is cancelled.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown entry, `InvalidState` if already terminal.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn leave_waitlist(&self, actor: Actor, entry_id: WaitlistEntryId) -> Result<WaitlistEntry> {
        let cohort_id = self
            .repository
            .locate_entry(entry_id)
            .await?
            .ok_or_else(|| entry_not_found(entry_id))?;
        let state = self.load_existing(cohort_id).await?;
        let owner = state.waitlist.get(entry_id).ok_or_else(|| entry_not_found(entry_id))?.user_id;
        actor.authorize(owner)?;

        let state = self.dispatch(cohort_id, CohortAction::LeaveWaitlist { entry_id }).await?;
        let entry = state.waitlist.get(entry_id).cloned().ok_or_else(|| entry_not_found(entry_id))?;
        tracing::info!(%entry_id, "Left waitlist");
        Ok(entry)
    }

    /// Apply a gateway webhook. A `paid` delivery confirms only after the
    /// gateway itself reports the payment settled; duplicates are no-ops.
    ///
    /// # Errors
    ///
    /// `NotFound` if no registration carries the payment, `ExternalService`
    /// if the gateway cannot be asked.
    #[tracing::instrument(skip(self))]
    pub async fn handle_payment_webhook(&self, payment_id: PaymentId, status: PaymentStatus) -> Result<WebhookOutcome> {
        let (cohort_id, registration_id) = self
            .repository
            .locate_payment(&payment_id)
            .await?
            .ok_or_else(|| RegistrationError::NotFound {
                resource: "payment",
                id: payment_id.to_string(),
            })?;

        if status != PaymentStatus::Paid {
            tracing::info!(%registration_id, %status, "Payment not settled; hold kept until expiry");
            return Ok(WebhookOutcome::Acknowledged);
        }
        match self.snapshot(cohort_id, registration_id).await?.status {
            RegistrationStatus::Confirmed => return Ok(WebhookOutcome::AlreadyConfirmed),
            RegistrationStatus::PendingPayment => {},
            other => {
                tracing::warn!(%registration_id, status = %other, "Payment settled for a closed registration");
                return Ok(WebhookOutcome::Ignored);
            },
        }

        // The delivery is only a hint; the gateway's own status decides.
        match self.verify_paid(&payment_id).await {
            Ok(()) => {},
            Err(RegistrationError::PaymentNotSettled { status, .. }) => {
                tracing::warn!(
                    %registration_id,
                    %payment_id,
                    gateway_status = %status,
                    "Webhook claims paid but gateway disagrees"
                );
                return Ok(WebhookOutcome::Acknowledged);
            },
            Err(err) => return Err(err),
        }

        let guard = self.locks.lock(&cohort_id).await;
        let mut state = self.load_existing(cohort_id).await?;
        let current = find(&state, registration_id)?.status;
        let outcome = match current {
            RegistrationStatus::Confirmed => WebhookOutcome::AlreadyConfirmed,
            RegistrationStatus::PendingPayment => {
                let effects = self.apply(
                    &mut state,
                    CohortAction::Confirm {
                        registration_id,
                        payment_id,
                    },
                )?;
                self.persist(&mut state).await?;
                drop(guard);
                self.run_effects(cohort_id, effects).await;
                WebhookOutcome::Confirmed
            },
            other => {
                tracing::warn!(%registration_id, status = %other, "Payment settled for a closed registration");
                WebhookOutcome::Ignored
            },
        };
        tracing::info!(%registration_id, ?outcome, "Payment webhook handled");
        Ok(outcome)
    }

    /// Expire a lapsed hold. Returns `false` when the registration was
    /// already expired and nothing changed.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the hold has not lapsed or the registration moved on.
    pub async fn expire_registration(&self, cohort_id: CohortId, registration_id: RegistrationId) -> Result<bool> {
        let (_, changed) = self
            .dispatch_tracked(cohort_id, CohortAction::Expire { registration_id })
            .await?;
        Ok(changed)
    }

    /// Expire a lapsed waitlist offer, releasing its hold. Returns `false`
    /// when the offer had already expired.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the offer has not lapsed or was taken up.
    pub async fn expire_offer(&self, cohort_id: CohortId, entry_id: WaitlistEntryId) -> Result<bool> {
        let (_, changed) = self
            .dispatch_tracked(cohort_id, CohortAction::ExpireOffer { entry_id })
            .await?;
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Fetch one registration.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `Unauthorized` for someone else's registration.
    pub async fn get(&self, actor: Actor, registration_id: RegistrationId) -> Result<Registration> {
        let cohort_id = self.locate(registration_id).await?;
        let registration = self.snapshot(cohort_id, registration_id).await?;
        actor.authorize(registration.user_id)?;
        Ok(registration)
    }

    /// A learner's registrations, newest first.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    pub async fn registrations_for(&self, actor: Actor) -> Result<Vec<Registration>> {
        Ok(self.repository.registrations_for_user(actor.user_id).await?)
    }

    /// The caller's place in a cohort's queue.
    ///
    /// # Errors
    ///
    /// `NotFound` if the caller is not queued.
    pub async fn waitlist_position(&self, actor: Actor, cohort_id: CohortId) -> Result<WaitlistPosition> {
        let not_queued = || RegistrationError::NotFound {
            resource: "waitlist entry",
            id: format!("{}/{}", cohort_id, actor.user_id),
        };
        let state = self.repository.load(cohort_id).await?.ok_or_else(not_queued)?;
        let entry = state
            .waitlist
            .active()
            .iter()
            .find(|e| e.user_id == actor.user_id)
            .ok_or_else(not_queued)?;
        Ok(WaitlistPosition {
            entry_id: entry.id,
            cohort_id,
            position: entry.position,
            status: entry.status,
        })
    }

    /// Seat counts for a cohort.
    ///
    /// # Errors
    ///
    /// `NotFound` if neither the store nor the catalog knows the cohort.
    pub async fn availability(&self, cohort_id: CohortId) -> Result<Availability> {
        let (ledger, waitlist_length) = match self.repository.load(cohort_id).await? {
            Some(state) => (state.ledger, state.waitlist.len()),
            None => (crate::aggregates::SeatLedger::new(self.cohort(cohort_id).await?.capacity), 0),
        };
        Ok(Availability {
            cohort_id,
            capacity: ledger.capacity(),
            enrolled: ledger.enrolled(),
            held: ledger.held(),
            available: ledger.available(),
            waitlist_length,
        })
    }

    /// Repository reachability.
    ///
    /// # Errors
    ///
    /// If the repository does not answer.
    pub async fn ping(&self) -> Result<()> {
        Ok(self.repository.ping().await?)
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    /// Lock, load, reduce, save, unlock, then run effects.
    async fn dispatch(&self, cohort_id: CohortId, action: CohortAction) -> Result<CohortState> {
        let (state, _) = self.dispatch_tracked(cohort_id, action).await?;
        Ok(state)
    }

    /// As [`Self::dispatch`], also reporting whether the action changed state.
    async fn dispatch_tracked(&self, cohort_id: CohortId, action: CohortAction) -> Result<(CohortState, bool)> {
        let (state, effects, changed) = self.commit(cohort_id, action).await?;
        self.run_effects(cohort_id, effects).await;
        Ok((state, changed))
    }

    async fn commit(&self, cohort_id: CohortId, action: CohortAction) -> Result<(CohortState, Effects, bool)> {
        let _guard = self.locks.lock(&cohort_id).await;
        let mut state = self
            .repository
            .load(cohort_id)
            .await?
            .unwrap_or_else(|| CohortState::new(cohort_id, 0));
        let effects = self.apply(&mut state, action)?;
        let changed = self.persist(&mut state).await?;
        Ok((state, effects, changed))
    }

    fn apply(&self, state: &mut CohortState, action: CohortAction) -> Result<Effects> {
        let effects = CohortReducer.reduce(state, action, &self.env);
        match state.last_error.take() {
            Some(err) => Err(err),
            None => Ok(effects),
        }
    }

    /// Save if the reducer emitted events; `false` means nothing to save.
    async fn persist(&self, state: &mut CohortState) -> Result<bool> {
        let events = state.take_events();
        if events.is_empty() {
            return Ok(false);
        }
        state.version = self.repository.save(state).await?;
        for event in &events {
            tracing::debug!(cohort_id = %state.cohort_id, ?event, "Cohort event");
            metrics::record_event(event);
        }
        Ok(true)
    }

    /// Execute effects, feeding resulting actions back until none remain.
    async fn run_effects(&self, cohort_id: CohortId, effects: Effects) {
        let mut pending: VecDeque<CohortAction> = execute_all(effects).await.into();
        while let Some(action) = pending.pop_front() {
            match self.commit(cohort_id, action).await {
                Ok((_, effects, _)) => pending.extend(execute_all(effects).await),
                Err(error) => {
                    tracing::warn!(cohort_id = %cohort_id, %error, "Feedback action failed");
                },
            }
        }
    }

    async fn load_existing(&self, cohort_id: CohortId) -> Result<CohortState> {
        self.repository
            .load(cohort_id)
            .await?
            .ok_or_else(|| RegistrationError::NotFound {
                resource: "cohort",
                id: cohort_id.to_string(),
            })
    }

    async fn snapshot(&self, cohort_id: CohortId, registration_id: RegistrationId) -> Result<Registration> {
        let state = self.load_existing(cohort_id).await?;
        find(&state, registration_id).cloned()
    }

    async fn locate(&self, registration_id: RegistrationId) -> Result<CohortId> {
        self.repository
            .locate_registration(registration_id)
            .await?
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))
    }

    async fn cohort(&self, cohort_id: CohortId) -> Result<Cohort> {
        self.catalog
            .cohort(cohort_id)
            .await?
            .ok_or_else(|| RegistrationError::NotFound {
                resource: "cohort",
                id: cohort_id.to_string(),
            })
    }

    async fn promo_input(&self, code: Option<&str>, user: UserId) -> Result<Option<PromoInput>> {
        let Some(code) = promo::normalize(code) else {
            return Ok(None);
        };
        let promo = self.catalog.promo_code(&code).await?;
        // Usage is read outside the cohort lock; a code shared across
        // cohorts can overshoot its global limit by concurrent redemptions.
        let usage = self.repository.promo_usage(&code, user).await?;
        Ok(Some(PromoInput { code, promo, usage }))
    }

    async fn verify_paid(&self, payment_id: &PaymentId) -> Result<()> {
        let gateway = &self.gateway;
        let timeout = self.settings.gateway_timeout;
        let started = Instant::now();
        let status = retry_with_backoff(&self.settings.status_retry, PaymentGatewayError::is_retryable, move || async move {
            tokio::time::timeout(timeout, gateway.payment_status(payment_id))
                .await
                .unwrap_or(Err(PaymentGatewayError::Timeout))
        })
        .await;
        metrics::record_gateway_call("payment_status", status.is_ok(), started.elapsed().as_secs_f64());

        match status {
            Ok(PaymentStatus::Paid) => Ok(()),
            Ok(other) => Err(RegistrationError::PaymentNotSettled {
                payment_id: payment_id.clone(),
                status: other.to_string(),
            }),
            Err(PaymentGatewayError::UnknownPayment(_)) => Err(RegistrationError::PaymentNotSettled {
                payment_id: payment_id.clone(),
                status: "unknown".to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn bounded<T>(
        &self,
        call: futures::future::BoxFuture<'_, std::result::Result<T, PaymentGatewayError>>,
    ) -> std::result::Result<T, PaymentGatewayError> {
        tokio::time::timeout(self.settings.gateway_timeout, call)
            .await
            .unwrap_or(Err(PaymentGatewayError::Timeout))
    }
}

fn find(state: &CohortState, registration_id: RegistrationId) -> Result<&Registration> {
    state
        .registration(registration_id)
        .ok_or_else(|| RegistrationError::registration_not_found(registration_id))
}

fn entry_not_found(id: WaitlistEntryId) -> RegistrationError {
    RegistrationError::NotFound {
        resource: "waitlist entry",
        id: id.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::notifier::RecordingNotifier;
    use crate::payment_gateway::MockPaymentGateway;
    use crate::store::InMemoryRepository;
    use crate::types::ProgramId;
    use enrollment_testing::{ManualClock, test_epoch};

    struct Harness {
        service: RegistrationService,
        gateway: MockPaymentGateway,
        catalog: InMemoryCatalog,
        cohort: Cohort,
    }

    fn harness(capacity: u32) -> Harness {
        let catalog = InMemoryCatalog::new();
        let cohort = Cohort {
            id: CohortId::new(),
            program_id: ProgramId::new(),
            capacity,
            registration_opens_at: test_epoch() - chrono::Duration::days(1),
            registration_closes_at: test_epoch() + chrono::Duration::days(30),
            price: Money::from_minor(100_000),
        };
        catalog.upsert_cohort(cohort.clone());
        let gateway = MockPaymentGateway::new();
        let service = RegistrationService::new(
            Collaborators {
                repository: Arc::new(InMemoryRepository::new()),
                catalog: Arc::new(catalog.clone()),
                gateway: Arc::new(gateway.clone()),
                notifier: Arc::new(RecordingNotifier::new()),
                clock: Arc::new(ManualClock::starting_at_test_epoch()),
            },
            Policy::default(),
            ServiceSettings {
                status_retry: RetryPolicy::builder()
                    .initial_delay(Duration::from_millis(1))
                    .build(),
                ..ServiceSettings::default()
            },
        );
        Harness {
            service,
            gateway,
            catalog,
            cohort,
        }
    }

    #[tokio::test]
    async fn unknown_cohort_is_not_found() {
        let h = harness(1);
        let err = h
            .service
            .initiate(Actor::learner(UserId::new()), CohortId::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::NotFound { resource: "cohort", .. }));
        assert!(h.catalog.cohort(h.cohort.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pay_and_confirm() {
        let h = harness(2);
        let learner = Actor::learner(UserId::new());
        let registration = h.service.initiate(learner, h.cohort.id, None).await.unwrap();

        let session = h.service.start_payment(learner, registration.id).await.unwrap();
        assert_eq!(session.amount, Money::from_minor(100_000));
        let again = h.service.start_payment(learner, registration.id).await.unwrap();
        assert_eq!(again.payment_id, session.payment_id);

        let err = h
            .service
            .confirm(learner, registration.id, session.payment_id.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::PaymentNotSettled { .. }));

        h.gateway.settle(&session.payment_id, PaymentStatus::Paid);
        let confirmed = h
            .service
            .confirm(learner, registration.id, session.payment_id)
            .await
            .unwrap();
        assert_eq!(confirmed.status, RegistrationStatus::Confirmed);

        let seats = h.service.availability(h.cohort.id).await.unwrap();
        assert_eq!((seats.enrolled, seats.held, seats.available), (1, 0, 1));
    }

    #[tokio::test]
    async fn transient_gateway_timeouts_are_retried() {
        let h = harness(1);
        let learner = Actor::learner(UserId::new());
        let registration = h.service.initiate(learner, h.cohort.id, None).await.unwrap();
        let session = h.service.start_payment(learner, registration.id).await.unwrap();
        h.gateway.settle(&session.payment_id, PaymentStatus::Paid);

        h.gateway.fail_next(2);
        let confirmed = h
            .service
            .confirm(learner, registration.id, session.payment_id.clone())
            .await
            .unwrap();
        assert_eq!(confirmed.status, RegistrationStatus::Confirmed);

        let other = h.service.initiate(Actor::learner(UserId::new()), h.cohort.id, None).await.unwrap();
        assert_eq!(other.status, RegistrationStatus::Waitlisted);
    }

    #[tokio::test]
    async fn learners_cannot_touch_each_others_registrations() {
        let h = harness(1);
        let owner = Actor::learner(UserId::new());
        let registration = h.service.initiate(owner, h.cohort.id, None).await.unwrap();

        let stranger = Actor::learner(UserId::new());
        assert!(matches!(
            h.service.get(stranger, registration.id).await,
            Err(RegistrationError::Unauthorized(_))
        ));
        assert!(matches!(
            h.service.cancel(stranger, registration.id, None).await,
            Err(RegistrationError::Unauthorized(_))
        ));

        let admin = Actor::admin(UserId::new());
        let cancelled = h.service.cancel(admin, registration.id, None).await.unwrap();
        assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
    }

    #[tokio::test]
    async fn failed_refund_leaves_registration_confirmed() {
        let h = harness(1);
        let learner = Actor::learner(UserId::new());
        let registration = h.service.initiate(learner, h.cohort.id, None).await.unwrap();
        let session = h.service.start_payment(learner, registration.id).await.unwrap();
        h.gateway.settle(&session.payment_id, PaymentStatus::Paid);
        h.service
            .confirm(learner, registration.id, session.payment_id.clone())
            .await
            .unwrap();

        h.gateway.fail_next(1);
        let err = h.service.cancel(learner, registration.id, None).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            h.service.get(learner, registration.id).await.unwrap().status,
            RegistrationStatus::Confirmed
        );

        let cancelled = h.service.cancel(learner, registration.id, Some("moved".into())).await.unwrap();
        assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
        assert_eq!(h.gateway.refunds(), vec![session.payment_id]);
        assert_eq!(h.service.availability(h.cohort.id).await.unwrap().available, 1);
    }

    #[tokio::test]
    async fn webhook_is_idempotent() {
        let h = harness(1);
        let learner = Actor::learner(UserId::new());
        let registration = h.service.initiate(learner, h.cohort.id, None).await.unwrap();
        let session = h.service.start_payment(learner, registration.id).await.unwrap();

        let pending = h
            .service
            .handle_payment_webhook(session.payment_id.clone(), PaymentStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending, WebhookOutcome::Acknowledged);

        h.gateway.settle(&session.payment_id, PaymentStatus::Paid);
        let first = h
            .service
            .handle_payment_webhook(session.payment_id.clone(), PaymentStatus::Paid)
            .await
            .unwrap();
        let second = h
            .service
            .handle_payment_webhook(session.payment_id.clone(), PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!((first, second), (WebhookOutcome::Confirmed, WebhookOutcome::AlreadyConfirmed));
        assert_eq!(h.service.availability(h.cohort.id).await.unwrap().enrolled, 1);

        let unknown = h
            .service
            .handle_payment_webhook(PaymentId::new("nope"), PaymentStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(unknown, RegistrationError::NotFound { resource: "payment", .. }));
    }

    #[tokio::test]
    async fn paid_webhook_is_checked_against_the_gateway() {
        let h = harness(1);
        let learner = Actor::learner(UserId::new());
        let registration = h.service.initiate(learner, h.cohort.id, None).await.unwrap();
        let session = h.service.start_payment(learner, registration.id).await.unwrap();

        let outcome = h
            .service
            .handle_payment_webhook(session.payment_id.clone(), PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Acknowledged);
        assert_eq!(
            h.service.get(learner, registration.id).await.unwrap().status,
            RegistrationStatus::PendingPayment
        );
        let seats = h.service.availability(h.cohort.id).await.unwrap();
        assert_eq!((seats.enrolled, seats.held), (0, 1));

        h.gateway.settle(&session.payment_id, PaymentStatus::Failed);
        let outcome = h
            .service
            .handle_payment_webhook(session.payment_id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Acknowledged);
        assert_eq!(h.service.availability(h.cohort.id).await.unwrap().enrolled, 0);
    }
}
