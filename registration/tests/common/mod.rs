//! Shared fixtures for integration tests.

#![allow(dead_code)]

use enrollment_runtime::RetryPolicy;
use enrollment_testing::{ManualClock, test_epoch};
use registration::{
    AppState, Cohort, CohortId, Collaborators, DiscountRule, ExpirySweeper, InMemoryCatalog, InMemoryRepository,
    MockPaymentGateway, Money, Policy, ProgramId, PromoCode, RecordingNotifier, RegistrationService,
    ServiceSettings,
};
use std::sync::Arc;
use std::time::Duration;

/// A service over in-memory collaborators with a controllable clock
pub struct World {
    pub service: RegistrationService,
    pub sweeper: ExpirySweeper,
    pub catalog: InMemoryCatalog,
    pub gateway: MockPaymentGateway,
    pub notifier: RecordingNotifier,
    pub clock: ManualClock,
}

impl World {
    pub fn new() -> Self {
        let catalog = InMemoryCatalog::new();
        let gateway = MockPaymentGateway::new();
        let notifier = RecordingNotifier::new();
        let clock = ManualClock::starting_at_test_epoch();
        let service = RegistrationService::new(
            Collaborators {
                repository: Arc::new(InMemoryRepository::new()),
                catalog: Arc::new(catalog.clone()),
                gateway: Arc::new(gateway.clone()),
                notifier: Arc::new(notifier.clone()),
                clock: Arc::new(clock.clone()),
            },
            Policy::default(),
            ServiceSettings {
                gateway_timeout: Duration::from_secs(2),
                status_retry: RetryPolicy::builder()
                    .max_retries(2)
                    .initial_delay(Duration::from_millis(1))
                    .jitter(0.0)
                    .build(),
                ..ServiceSettings::default()
            },
        );
        let sweeper = ExpirySweeper::new(service.clone(), Duration::from_secs(300));
        Self {
            service,
            sweeper,
            catalog,
            gateway,
            notifier,
            clock,
        }
    }

    /// An open cohort priced at 1000.00
    pub fn cohort(&self, capacity: u32) -> CohortId {
        let id = CohortId::new();
        self.catalog.upsert_cohort(Cohort {
            id,
            program_id: ProgramId::new(),
            capacity,
            registration_opens_at: test_epoch() - chrono::Duration::days(7),
            registration_closes_at: test_epoch() + chrono::Duration::days(7),
            price: Money::from_minor(100_000),
        });
        id
    }

    /// `SAVE20`: 20% off, unlimited
    pub fn save20(&self) {
        self.catalog.upsert_promo_code(PromoCode {
            code: "SAVE20".to_string(),
            rule: DiscountRule::Percentage { percent: 20 },
            valid_from: test_epoch() - chrono::Duration::days(30),
            valid_until: None,
            max_uses: None,
            max_uses_per_user: None,
            cohort_ids: Vec::new(),
            program_ids: Vec::new(),
        });
    }

    /// `ONCE`: 10% off, one redemption per learner
    pub fn once(&self) {
        self.catalog.upsert_promo_code(PromoCode {
            code: "ONCE".to_string(),
            rule: DiscountRule::Percentage { percent: 10 },
            valid_from: test_epoch() - chrono::Duration::days(30),
            valid_until: None,
            max_uses: None,
            max_uses_per_user: Some(1),
            cohort_ids: Vec::new(),
            program_ids: Vec::new(),
        });
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.service.clone(), self.sweeper.clone())
    }
}
