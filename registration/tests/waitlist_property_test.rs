//! Property tests over random operation sequences on one cohort.
//!
//! After every step: waitlist positions are dense, the ledger is never
//! oversold, and no learner has two active registrations.
//!
//! Run with: `cargo test --test waitlist_property_test`

#![allow(clippy::unwrap_used)]

use enrollment_core::reducer::Reducer;
use enrollment_testing::{ManualClock, test_epoch};
use proptest::prelude::*;
use registration::aggregates::{CohortEnvironment, CohortState};
use registration::{
    Cohort, CohortAction, CohortId, CohortReducer, MockPaymentGateway, Money, Policy, ProgramId, RecordingNotifier,
    RegistrationId, RegistrationStatus, UserId, WaitlistEntryId,
};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Register(usize),
    Cancel(usize),
    Leave(usize),
    Advance(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..8_usize).prop_map(Op::Register),
        2 => (0..16_usize).prop_map(Op::Cancel),
        2 => (0..16_usize).prop_map(Op::Leave),
        1 => (1..90_i64).prop_map(Op::Advance),
    ]
}

struct Model {
    clock: ManualClock,
    env: CohortEnvironment,
    cohort: Cohort,
    users: Vec<UserId>,
    state: CohortState,
}

impl Model {
    fn new(capacity: u32) -> Self {
        let clock = ManualClock::starting_at_test_epoch();
        let cohort = Cohort {
            id: CohortId::new(),
            program_id: ProgramId::new(),
            capacity,
            registration_opens_at: test_epoch() - chrono::Duration::days(1),
            registration_closes_at: test_epoch() + chrono::Duration::days(365),
            price: Money::from_minor(10_000),
        };
        Self {
            env: CohortEnvironment {
                clock: Arc::new(clock.clone()),
                policy: Policy::default(),
                notifier: Arc::new(RecordingNotifier::new()),
                gateway: Arc::new(MockPaymentGateway::new()),
                call_timeout: std::time::Duration::from_secs(1),
            },
            state: CohortState::new(cohort.id, capacity),
            users: (0..8).map(|_| UserId::new()).collect(),
            clock,
            cohort,
        }
    }

    fn send(&mut self, action: CohortAction) {
        // Rejections are expected; they must simply leave state consistent.
        let _effects = CohortReducer.reduce(&mut self.state, action, &self.env);
        self.state.last_error = None;
        self.state.events.clear();
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Register(user) => {
                let action = CohortAction::Initiate {
                    registration_id: RegistrationId::new(),
                    entry_id: WaitlistEntryId::new(),
                    user_id: self.users[user],
                    cohort: self.cohort.clone(),
                    promo: None,
                    waitlist_only: false,
                };
                self.send(action);
            },
            Op::Cancel(i) => {
                let ids: Vec<_> = self.state.registrations.keys().copied().collect();
                if let Some(&registration_id) = ids.get(i % ids.len().max(1)) {
                    self.send(CohortAction::Cancel {
                        registration_id,
                        reason: None,
                        refunded: false,
                    });
                }
            },
            Op::Leave(i) => {
                let ids: Vec<_> = self.state.waitlist.entries().map(|e| e.id).collect();
                if let Some(&entry_id) = ids.get(i % ids.len().max(1)) {
                    self.send(CohortAction::LeaveWaitlist { entry_id });
                }
            },
            Op::Advance(minutes) => {
                self.clock.advance(chrono::Duration::minutes(minutes));
                let now = self.clock_now();
                let holds: Vec<_> = self.state.lapsed_holds(now).collect();
                for registration_id in holds {
                    self.send(CohortAction::Expire { registration_id });
                }
                let offers: Vec<_> = self.state.waitlist.lapsed_offers(now).map(|e| e.id).collect();
                for entry_id in offers {
                    self.send(CohortAction::ExpireOffer { entry_id });
                }
            },
        }
    }

    fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        use enrollment_core::environment::Clock;
        self.clock.now()
    }

    fn check(&self) -> Result<(), TestCaseError> {
        let ledger = &self.state.ledger;
        prop_assert!(self.state.waitlist.positions_are_contiguous());
        prop_assert!(ledger.enrolled() + ledger.held() <= ledger.capacity());

        let pending = self
            .state
            .registrations
            .values()
            .filter(|r| r.status == RegistrationStatus::PendingPayment)
            .count();
        prop_assert_eq!(usize::try_from(ledger.held()).unwrap(), pending);

        let waitlisted = self
            .state
            .registrations
            .values()
            .filter(|r| r.status == RegistrationStatus::Waitlisted)
            .count();
        let waiting = self
            .state
            .waitlist
            .active()
            .iter()
            .filter(|e| e.status == registration::WaitlistStatus::Waiting)
            .count();
        prop_assert_eq!(waitlisted, waiting);

        // A free seat is never left while someone is waiting.
        prop_assert!(ledger.available() == 0 || waiting == 0);

        let mut active_users = HashSet::new();
        for registration in self.state.registrations.values().filter(|r| r.status.is_active()) {
            prop_assert!(active_users.insert(registration.user_id));
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn random_sequences_keep_cohort_consistent(
        capacity in 1..4_u32,
        ops in prop::collection::vec(op(), 1..60),
    ) {
        let mut model = Model::new(capacity);
        for op in &ops {
            model.apply(op);
            model.check()?;
        }
    }
}
