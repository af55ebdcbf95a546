//! Cohort aggregate: the registration state machine.
//!
//! One [`CohortState`] holds everything that must change together for a
//! cohort: its seat ledger, its registrations and its waitlist. Every
//! transition goes through [`CohortReducer`], so seat counts, registration
//! statuses and queue positions are always updated in one step.
//!
//! ```text
//!                ┌──────────── confirm ───────────┐
//!                │                                ▼
//! initiate ─► PENDING_PAYMENT ── cancel ──► CANCELLED ◄── cancel ── CONFIRMED
//!    │           ▲      │                     ▲
//!    │  promote  │      └── expire ──► EXPIRED│
//!    └─► WAITLISTED ───────── cancel / leave ─┘
//! ```
//!
//! Whenever a seat is freed (release, expiry, cancellation) the lowest
//! `WAITING` entry is promoted in the same transition.

use super::capacity::{SeatError, SeatLedger};
use super::promo;
use super::waitlist::{Waitlist, WaitlistError};
use crate::error::RegistrationError;
use crate::notifier::{Notification, Notifier};
use crate::payment_gateway::PaymentGateway;
use crate::types::{
    Cohort, CohortId, PaymentId, PromoCode, PromoUsage, Registration, RegistrationId, RegistrationStatus,
    UserId, WaitlistEntryId, WaitlistStatus,
};
use chrono::{DateTime, Duration, Utc};
use enrollment_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// Everything this service owns about one cohort
#[derive(Clone, Debug)]
pub struct CohortState {
    /// Cohort
    pub cohort_id: CohortId,
    /// Seat counts
    pub ledger: SeatLedger,
    /// All registrations, including terminal ones
    pub registrations: BTreeMap<RegistrationId, Registration>,
    /// Queue
    pub waitlist: Waitlist,
    /// Persisted version, bumped by the repository on each save
    pub version: u64,
    /// Error from the last action, if it was rejected
    pub last_error: Option<RegistrationError>,
    /// Events produced since the last drain
    pub events: Vec<CohortEvent>,
}

impl CohortState {
    /// Fresh state for a cohort nobody has registered for yet
    #[must_use]
    pub fn new(cohort_id: CohortId, capacity: u32) -> Self {
        Self {
            cohort_id,
            ledger: SeatLedger::new(capacity),
            registrations: BTreeMap::new(),
            waitlist: Waitlist::default(),
            version: 0,
            last_error: None,
            events: Vec::new(),
        }
    }

    /// Look up a registration
    #[must_use]
    pub fn registration(&self, id: RegistrationId) -> Option<&Registration> {
        self.registrations.get(&id)
    }

    /// The learner's active registration, if any
    #[must_use]
    pub fn active_registration_for(&self, user: UserId) -> Option<&Registration> {
        self.registrations
            .values()
            .find(|r| r.user_id == user && r.status.is_active())
    }

    /// `PENDING_PAYMENT` registrations whose hold lapsed before `now`
    pub fn lapsed_holds(&self, now: DateTime<Utc>) -> impl Iterator<Item = RegistrationId> + '_ {
        self.registrations
            .values()
            .filter(move |r| {
                r.status == RegistrationStatus::PendingPayment && r.expires_at.is_some_and(|at| at < now)
            })
            .map(|r| r.id)
    }

    /// Drain events for logging and metrics
    pub fn take_events(&mut self) -> Vec<CohortEvent> {
        std::mem::take(&mut self.events)
    }
}

// ============================================================================
// Actions and events
// ============================================================================

/// A supplied promo code with the data needed to judge it
#[derive(Clone, Debug)]
pub struct PromoInput {
    /// Normalized code
    pub code: String,
    /// Catalog entry, `None` if unknown
    pub promo: Option<PromoCode>,
    /// Current redemptions
    pub usage: PromoUsage,
}

/// Inputs to the cohort reducer
#[derive(Clone, Debug)]
pub enum CohortAction {
    /// Register, holding a seat if one is free and queueing otherwise
    Initiate {
        /// Id for the new registration
        registration_id: RegistrationId,
        /// Id for the waitlist entry, used only if queued
        entry_id: WaitlistEntryId,
        /// Learner
        user_id: UserId,
        /// Latest catalog data for the cohort
        cohort: Cohort,
        /// Supplied promo code
        promo: Option<PromoInput>,
        /// Refuse if a seat is free (explicit waitlist join)
        waitlist_only: bool,
    },
    /// Record the gateway payment opened for a registration
    AttachPayment {
        /// Registration
        registration_id: RegistrationId,
        /// Gateway reference
        payment_id: PaymentId,
    },
    /// Payment verified as settled
    Confirm {
        /// Registration
        registration_id: RegistrationId,
        /// Settled payment
        payment_id: PaymentId,
    },
    /// Cancel; any refund has already been issued
    Cancel {
        /// Registration
        registration_id: RegistrationId,
        /// Free-text reason
        reason: Option<String>,
        /// Whether a refund was issued
        refunded: bool,
    },
    /// System-invoked: the hold lapsed
    Expire {
        /// Registration
        registration_id: RegistrationId,
    },
    /// Learner leaves the queue
    LeaveWaitlist {
        /// Entry
        entry_id: WaitlistEntryId,
    },
    /// System-invoked: a waitlist offer lapsed
    ExpireOffer {
        /// Entry
        entry_id: WaitlistEntryId,
    },
    /// Offer free seats to waiting learners
    PromoteNext,
    /// Feedback: the gateway voided an unpaid payment
    PaymentVoided {
        /// Registration
        registration_id: RegistrationId,
        /// Voided payment
        payment_id: PaymentId,
    },
}

/// Facts recorded by the reducer, drained by the service for logs and metrics
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CohortEvent {
    /// New registration, either holding a seat or waitlisted
    RegistrationInitiated {
        /// Registration
        registration_id: RegistrationId,
        /// Initial status
        status: RegistrationStatus,
    },
    /// Gateway payment attached
    PaymentAttached {
        /// Registration
        registration_id: RegistrationId,
    },
    /// Seat confirmed
    RegistrationConfirmed {
        /// Registration
        registration_id: RegistrationId,
    },
    /// Cancelled
    RegistrationCancelled {
        /// Registration
        registration_id: RegistrationId,
        /// Status it was cancelled from
        from: RegistrationStatus,
    },
    /// Hold lapsed
    RegistrationExpired {
        /// Registration
        registration_id: RegistrationId,
    },
    /// A held or enrolled seat became free
    SeatFreed {
        /// Registration that gave it up
        registration_id: RegistrationId,
    },
    /// Queued
    WaitlistJoined {
        /// Entry
        entry_id: WaitlistEntryId,
        /// Position on joining
        position: u32,
    },
    /// Left the queue
    WaitlistLeft {
        /// Entry
        entry_id: WaitlistEntryId,
    },
    /// Offered a seat
    WaitlistPromoted {
        /// Entry
        entry_id: WaitlistEntryId,
        /// Registration now holding the seat
        registration_id: RegistrationId,
    },
    /// Offer lapsed
    WaitlistOfferExpired {
        /// Entry
        entry_id: WaitlistEntryId,
    },
    /// Offer taken up
    WaitlistConverted {
        /// Entry
        entry_id: WaitlistEntryId,
    },
    /// Unpaid payment voided at the gateway
    PaymentHoldVoided {
        /// Registration
        registration_id: RegistrationId,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Time windows governing holds and offers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    /// How long a seat is held awaiting payment
    pub hold_duration: Duration,
    /// How long a waitlist offer stays open
    pub response_window: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(30),
            response_window: Duration::hours(24),
        }
    }
}

/// Collaborators available to the reducer's effects
#[derive(Clone)]
pub struct CohortEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Hold and offer windows
    pub policy: Policy,
    /// Learner notifications
    pub notifier: Arc<dyn Notifier>,
    /// Payment gateway, used to void lapsed payments
    pub gateway: Arc<dyn PaymentGateway>,
    /// Upper bound on any collaborator call made from an effect
    pub call_timeout: std::time::Duration,
}

impl std::fmt::Debug for CohortEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CohortEnvironment")
            .field("policy", &self.policy)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reducer
// ============================================================================

type Effects = SmallVec<[Effect<CohortAction>; 4]>;

/// Registration state machine for one cohort
#[derive(Clone, Copy, Debug, Default)]
pub struct CohortReducer;

impl Reducer for CohortReducer {
    type State = CohortState;
    type Action = CohortAction;
    type Environment = CohortEnvironment;

    fn reduce(&self, state: &mut CohortState, action: CohortAction, env: &CohortEnvironment) -> Effects {
        state.last_error = None;
        let now = env.clock.now();
        let mut effects = Effects::new();

        let result = match action {
            CohortAction::Initiate {
                registration_id,
                entry_id,
                user_id,
                cohort,
                promo,
                waitlist_only,
            } => Self::initiate(
                state,
                env,
                now,
                &mut effects,
                Initiate {
                    registration_id,
                    entry_id,
                    user_id,
                    cohort,
                    promo,
                    waitlist_only,
                },
            ),
            CohortAction::AttachPayment { registration_id, payment_id } => {
                Self::attach_payment(state, registration_id, payment_id)
            },
            CohortAction::Confirm { registration_id, payment_id } => {
                Self::confirm(state, now, registration_id, payment_id)
            },
            CohortAction::Cancel {
                registration_id,
                reason,
                refunded,
            } => Self::cancel(state, env, now, &mut effects, registration_id, reason, refunded),
            CohortAction::Expire { registration_id } => {
                Self::expire(state, env, now, &mut effects, registration_id)
            },
            CohortAction::LeaveWaitlist { entry_id } => {
                Self::leave_waitlist(state, env, now, &mut effects, entry_id)
            },
            CohortAction::ExpireOffer { entry_id } => {
                Self::expire_offer(state, env, now, &mut effects, entry_id)
            },
            CohortAction::PromoteNext => {
                Self::fill_free_seats(state, env, now, &mut effects);
                Ok(())
            },
            CohortAction::PaymentVoided { registration_id, .. } => {
                state.events.push(CohortEvent::PaymentHoldVoided { registration_id });
                Ok(())
            },
        };

        match result {
            Ok(()) => effects,
            Err(err) => {
                state.last_error = Some(err);
                Effects::new()
            },
        }
    }
}

struct Initiate {
    registration_id: RegistrationId,
    entry_id: WaitlistEntryId,
    user_id: UserId,
    cohort: Cohort,
    promo: Option<PromoInput>,
    waitlist_only: bool,
}

fn invalid(message: impl Into<String>) -> RegistrationError {
    RegistrationError::InvalidState(message.into())
}

fn entry_not_found(id: WaitlistEntryId) -> RegistrationError {
    RegistrationError::NotFound {
        resource: "waitlist entry",
        id: id.to_string(),
    }
}

impl From<WaitlistError> for RegistrationError {
    fn from(err: WaitlistError) -> Self {
        Self::InvalidState(err.to_string())
    }
}

impl CohortReducer {
    fn initiate(
        state: &mut CohortState,
        env: &CohortEnvironment,
        now: DateTime<Utc>,
        effects: &mut Effects,
        cmd: Initiate,
    ) -> Result<(), RegistrationError> {
        let Initiate {
            registration_id,
            entry_id,
            user_id,
            cohort,
            promo,
            waitlist_only,
        } = cmd;

        if cohort.id != state.cohort_id {
            return Err(RegistrationError::Validation(format!(
                "cohort {} does not match aggregate {}",
                cohort.id, state.cohort_id
            )));
        }
        if state.registrations.contains_key(&registration_id) {
            return Err(RegistrationError::Validation(format!(
                "registration id {registration_id} already used"
            )));
        }
        if state.active_registration_for(user_id).is_some() {
            return Err(RegistrationError::DuplicateRegistration {
                user_id,
                cohort_id: cohort.id,
            });
        }
        if !cohort.is_open(now) {
            return Err(RegistrationError::RegistrationClosed(cohort.id));
        }

        let (price, promo_code) = match promo {
            None => (cohort.price, None),
            Some(input) => {
                let discount = promo::validate(input.promo.as_ref(), &cohort, input.usage, now)?;
                (discount.final_price, Some(discount.code))
            },
        };

        // Waiting learners are served before a newcomer gets a seat.
        let mut projected = state.ledger.clone();
        projected.set_capacity(cohort.capacity);
        let waiting = u32::try_from(
            state
                .waitlist
                .active()
                .iter()
                .filter(|e| e.status == WaitlistStatus::Waiting)
                .count(),
        )
        .unwrap_or(u32::MAX);
        let seat_for_newcomer = projected.available() > waiting;
        if waitlist_only && seat_for_newcomer {
            return Err(invalid("seats are available; register directly"));
        }

        state.ledger.set_capacity(cohort.capacity);
        Self::fill_free_seats(state, env, now, effects);

        let mut registration = Registration {
            id: registration_id,
            user_id,
            cohort_id: cohort.id,
            status: RegistrationStatus::PendingPayment,
            registered_at: now,
            confirmed_at: None,
            expires_at: None,
            closed_at: None,
            promo_code,
            price,
            payment_id: None,
            cancellation_reason: None,
        };

        match state.ledger.reserve(registration_id) {
            Ok(()) => {
                registration.expires_at = Some(now + env.policy.hold_duration);
            },
            Err(SeatError::NoCapacity | SeatError::NotHeld) => {
                registration.status = RegistrationStatus::Waitlisted;
                let entry = state
                    .waitlist
                    .join(entry_id, user_id, cohort.id, registration_id, now)?;
                state.events.push(CohortEvent::WaitlistJoined {
                    entry_id,
                    position: entry.position,
                });
            },
        }

        state.events.push(CohortEvent::RegistrationInitiated {
            registration_id,
            status: registration.status,
        });
        state.registrations.insert(registration_id, registration);
        Ok(())
    }

    fn attach_payment(
        state: &mut CohortState,
        registration_id: RegistrationId,
        payment_id: PaymentId,
    ) -> Result<(), RegistrationError> {
        let registration = state
            .registrations
            .get_mut(&registration_id)
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))?;

        if registration.status != RegistrationStatus::PendingPayment {
            return Err(invalid(format!(
                "cannot attach a payment to a {} registration",
                registration.status
            )));
        }
        match &registration.payment_id {
            Some(existing) if *existing == payment_id => return Ok(()),
            Some(existing) => {
                return Err(invalid(format!("payment {existing} is already attached")));
            },
            None => {},
        }

        registration.payment_id = Some(payment_id);
        state.events.push(CohortEvent::PaymentAttached { registration_id });
        Ok(())
    }

    fn confirm(
        state: &mut CohortState,
        now: DateTime<Utc>,
        registration_id: RegistrationId,
        payment_id: PaymentId,
    ) -> Result<(), RegistrationError> {
        let registration = state
            .registrations
            .get(&registration_id)
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))?;

        if registration.status != RegistrationStatus::PendingPayment {
            return Err(invalid(format!("cannot confirm a {} registration", registration.status)));
        }
        if registration.payment_id.as_ref().is_some_and(|p| *p != payment_id) {
            return Err(RegistrationError::Validation(format!(
                "payment {payment_id} does not belong to registration {registration_id}"
            )));
        }
        if state
            .registrations
            .values()
            .any(|r| r.id != registration_id && r.payment_id.as_ref() == Some(&payment_id))
        {
            return Err(RegistrationError::Validation(format!(
                "payment {payment_id} belongs to another registration"
            )));
        }
        if !state.ledger.is_held(registration_id) {
            return Err(invalid("registration holds no seat"));
        }

        state
            .ledger
            .confirm(registration_id)
            .map_err(|e| invalid(e.to_string()))?;

        if let Some(entry_id) = state.waitlist.active_for_registration(registration_id).map(|e| e.id) {
            state.waitlist.convert(entry_id)?;
            state.events.push(CohortEvent::WaitlistConverted { entry_id });
        }

        if let Some(registration) = state.registrations.get_mut(&registration_id) {
            registration.status = RegistrationStatus::Confirmed;
            registration.confirmed_at = Some(now);
            registration.expires_at = None;
            registration.payment_id = Some(payment_id);
        }
        state.events.push(CohortEvent::RegistrationConfirmed { registration_id });
        Ok(())
    }

    fn cancel(
        state: &mut CohortState,
        env: &CohortEnvironment,
        now: DateTime<Utc>,
        effects: &mut Effects,
        registration_id: RegistrationId,
        reason: Option<String>,
        refunded: bool,
    ) -> Result<(), RegistrationError> {
        let registration = state
            .registrations
            .get(&registration_id)
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))?;
        let from = registration.status;
        let user_id = registration.user_id;

        let freed = match from {
            RegistrationStatus::PendingPayment => state.ledger.release(registration_id),
            RegistrationStatus::Confirmed => state.ledger.withdraw(registration_id),
            RegistrationStatus::Waitlisted => false,
            RegistrationStatus::Cancelled | RegistrationStatus::Expired => {
                return Err(invalid(format!("cannot cancel a {from} registration")));
            },
        };

        if let Some(entry_id) = state.waitlist.active_for_registration(registration_id).map(|e| e.id) {
            state.waitlist.leave(entry_id)?;
            state.events.push(CohortEvent::WaitlistLeft { entry_id });
        }

        if let Some(registration) = state.registrations.get_mut(&registration_id) {
            registration.status = RegistrationStatus::Cancelled;
            registration.closed_at = Some(now);
            registration.expires_at = None;
            registration.cancellation_reason = reason;
        }
        state.events.push(CohortEvent::RegistrationCancelled { registration_id, from });
        effects.push(notify(
            env,
            Notification::RegistrationCancelled {
                user_id,
                registration_id,
                refunded,
            },
        ));

        if freed {
            state.events.push(CohortEvent::SeatFreed { registration_id });
            Self::fill_free_seats(state, env, now, effects);
        }
        Ok(())
    }

    fn expire(
        state: &mut CohortState,
        env: &CohortEnvironment,
        now: DateTime<Utc>,
        effects: &mut Effects,
        registration_id: RegistrationId,
    ) -> Result<(), RegistrationError> {
        let registration = state
            .registrations
            .get(&registration_id)
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))?;

        match registration.status {
            RegistrationStatus::Expired => return Ok(()),
            RegistrationStatus::PendingPayment => {},
            other => return Err(invalid(format!("cannot expire a {other} registration"))),
        }
        if registration.expires_at.is_none_or(|at| at >= now) {
            return Err(invalid("hold has not lapsed"));
        }

        Self::lapse(state, env, now, effects, registration_id);
        Self::fill_free_seats(state, env, now, effects);
        Ok(())
    }

    fn expire_offer(
        state: &mut CohortState,
        env: &CohortEnvironment,
        now: DateTime<Utc>,
        effects: &mut Effects,
        entry_id: WaitlistEntryId,
    ) -> Result<(), RegistrationError> {
        let entry = state.waitlist.get(entry_id).ok_or_else(|| entry_not_found(entry_id))?;

        match entry.status {
            WaitlistStatus::Expired => return Ok(()),
            WaitlistStatus::Notified => {},
            other => return Err(invalid(format!("cannot expire a {other} waitlist entry"))),
        }
        if entry.expires_at.is_none_or(|at| at >= now) {
            return Err(invalid("offer has not lapsed"));
        }

        let registration_id = entry.registration_id;
        let holds_seat = state
            .registration(registration_id)
            .is_some_and(|r| r.status == RegistrationStatus::PendingPayment);

        if holds_seat {
            Self::lapse(state, env, now, effects, registration_id);
        } else {
            let entry = state.waitlist.expire(entry_id)?;
            state.events.push(CohortEvent::WaitlistOfferExpired { entry_id });
            effects.push(notify(
                env,
                Notification::WaitlistOfferExpired {
                    user_id: entry.user_id,
                    entry_id,
                },
            ));
        }
        Self::fill_free_seats(state, env, now, effects);
        Ok(())
    }

    fn leave_waitlist(
        state: &mut CohortState,
        env: &CohortEnvironment,
        now: DateTime<Utc>,
        effects: &mut Effects,
        entry_id: WaitlistEntryId,
    ) -> Result<(), RegistrationError> {
        let entry = state.waitlist.get(entry_id).ok_or_else(|| entry_not_found(entry_id))?;
        if !entry.status.is_active() {
            return Err(invalid(format!("waitlist entry is {}", entry.status)));
        }
        let registration_id = entry.registration_id;

        if state.registration(registration_id).is_some_and(|r| r.status.is_active()) {
            Self::cancel(
                state,
                env,
                now,
                effects,
                registration_id,
                Some("left waitlist".to_string()),
                false,
            )
        } else {
            state.waitlist.leave(entry_id)?;
            state.events.push(CohortEvent::WaitlistLeft { entry_id });
            Ok(())
        }
    }

    /// Release a lapsed hold. Caller has checked the registration is
    /// `PENDING_PAYMENT`.
    fn lapse(
        state: &mut CohortState,
        env: &CohortEnvironment,
        now: DateTime<Utc>,
        effects: &mut Effects,
        registration_id: RegistrationId,
    ) {
        state.ledger.release(registration_id);

        let offer = state
            .waitlist
            .active_for_registration(registration_id)
            .filter(|e| e.status == WaitlistStatus::Notified)
            .map(|e| e.id);
        if let Some(entry_id) = offer {
            if state.waitlist.expire(entry_id).is_ok() {
                state.events.push(CohortEvent::WaitlistOfferExpired { entry_id });
            }
        }

        let Some(registration) = state.registrations.get_mut(&registration_id) else {
            return;
        };
        registration.status = RegistrationStatus::Expired;
        registration.closed_at = Some(now);
        registration.expires_at = None;
        let user_id = registration.user_id;
        let payment_id = registration.payment_id.clone();

        state.events.push(CohortEvent::RegistrationExpired { registration_id });
        state.events.push(CohortEvent::SeatFreed { registration_id });

        let notification = match offer {
            Some(entry_id) => Notification::WaitlistOfferExpired { user_id, entry_id },
            None => Notification::HoldExpired { user_id, registration_id },
        };
        effects.push(notify(env, notification));
        if let Some(payment_id) = payment_id {
            effects.push(void_payment(env, registration_id, payment_id));
        }
    }

    /// Promote waiting learners while seats are free.
    fn fill_free_seats(state: &mut CohortState, env: &CohortEnvironment, now: DateTime<Utc>, effects: &mut Effects) {
        while state.ledger.available() > 0 {
            let Some(entry) = state.waitlist.next_waiting() else {
                break;
            };
            let (entry_id, registration_id, user_id) = (entry.id, entry.registration_id, entry.user_id);

            let waitlisted = state
                .registration(registration_id)
                .is_some_and(|r| r.status == RegistrationStatus::Waitlisted);
            if !waitlisted {
                tracing::warn!(
                    entry_id = %entry_id,
                    registration_id = %registration_id,
                    "Waiting entry without a waitlisted registration; dropping it"
                );
                if state.waitlist.leave(entry_id).is_ok() {
                    state.events.push(CohortEvent::WaitlistLeft { entry_id });
                }
                continue;
            }

            if state.ledger.reserve(registration_id).is_err() {
                break;
            }
            if state.waitlist.notify(entry_id, now, env.policy.response_window).is_err() {
                state.ledger.release(registration_id);
                break;
            }

            let pay_by = now + env.policy.hold_duration;
            if let Some(registration) = state.registrations.get_mut(&registration_id) {
                registration.status = RegistrationStatus::PendingPayment;
                registration.expires_at = Some(pay_by);
            }
            state.events.push(CohortEvent::WaitlistPromoted {
                entry_id,
                registration_id,
            });
            effects.push(notify(
                env,
                Notification::WaitlistPromoted {
                    user_id,
                    cohort_id: state.cohort_id,
                    registration_id,
                    pay_by,
                },
            ));
        }
    }
}

fn notify(env: &CohortEnvironment, notification: Notification) -> Effect<CohortAction> {
    let notifier = Arc::clone(&env.notifier);
    let timeout = env.call_timeout;
    Effect::future(async move {
        if tokio::time::timeout(timeout, notifier.notify(notification)).await.is_err() {
            tracing::warn!("Notification delivery timed out");
        }
        None
    })
}

fn void_payment(
    env: &CohortEnvironment,
    registration_id: RegistrationId,
    payment_id: PaymentId,
) -> Effect<CohortAction> {
    let gateway = Arc::clone(&env.gateway);
    let timeout = env.call_timeout;
    Effect::future(async move {
        match tokio::time::timeout(timeout, gateway.void_payment(&payment_id)).await {
            Ok(Ok(())) => Some(CohortAction::PaymentVoided {
                registration_id,
                payment_id,
            }),
            Ok(Err(error)) => {
                tracing::warn!(%registration_id, %payment_id, %error, "Failed to void lapsed payment");
                None
            },
            Err(_) => {
                tracing::warn!(%registration_id, %payment_id, "Voiding lapsed payment timed out");
                None
            },
        }
    })
}
