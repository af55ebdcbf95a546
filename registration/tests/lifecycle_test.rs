//! End-to-end registration lifecycles through the service and sweeper.
//!
//! Run with: `cargo test --test lifecycle_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use common::World;
use registration::{
    Actor, Money, Notification, PaymentStatus, PromoRejection, RegistrationError, RegistrationStatus, UserId,
    WaitlistStatus,
    service::WebhookOutcome,
};

fn learner() -> Actor {
    Actor::learner(UserId::new())
}

#[tokio::test]
async fn held_seat_expires_and_passes_to_the_waitlist() {
    let world = World::new();
    let cohort = world.cohort(1);
    let (a, b) = (learner(), learner());

    let reg_a = world.service.initiate(a, cohort, None).await.unwrap();
    assert_eq!(reg_a.status, RegistrationStatus::PendingPayment);
    assert_eq!(world.service.availability(cohort).await.unwrap().held, 1);

    let reg_b = world.service.initiate(b, cohort, None).await.unwrap();
    assert_eq!(reg_b.status, RegistrationStatus::Waitlisted);
    assert_eq!(world.service.waitlist_position(b, cohort).await.unwrap().position, 1);

    world.clock.advance(chrono::Duration::minutes(31));
    let report = world.sweeper.run_once().await;
    assert_eq!(report.expired_registrations, 1);

    let reg_a = world.service.get(a, reg_a.id).await.unwrap();
    assert_eq!(reg_a.status, RegistrationStatus::Expired);

    let reg_b = world.service.get(b, reg_b.id).await.unwrap();
    assert_eq!(reg_b.status, RegistrationStatus::PendingPayment);
    assert_eq!(
        reg_b.expires_at,
        Some(world.service.now() + chrono::Duration::minutes(30))
    );

    let seats = world.service.availability(cohort).await.unwrap();
    assert_eq!((seats.held, seats.enrolled, seats.available), (1, 0, 0));

    let sent = world.notifier.sent();
    assert!(sent.iter().any(|n| matches!(n, Notification::HoldExpired { registration_id, .. } if *registration_id == reg_a.id)));
    assert!(sent.iter().any(|n| matches!(n, Notification::WaitlistPromoted { registration_id, .. } if *registration_id == reg_b.id)));
}

#[tokio::test]
async fn promo_code_discounts_the_registration_price() {
    let world = World::new();
    let cohort = world.cohort(10);
    world.save20();

    let registration = world.service.initiate(learner(), cohort, Some(" save20 ")).await.unwrap();
    assert_eq!(registration.price, Money::from_minor(80_000));
    assert_eq!(registration.promo_code.as_deref(), Some("SAVE20"));

    let err = world
        .service
        .initiate(learner(), cohort, Some("NOPE"))
        .await
        .unwrap_err();
    assert_eq!(err, RegistrationError::PromoRejected(PromoRejection::NotFound));
    assert_eq!(world.service.availability(cohort).await.unwrap().held, 1);
}

#[tokio::test]
async fn initiate_then_confirm_moves_a_hold_to_enrolled() {
    let world = World::new();
    let cohort = world.cohort(3);
    let actor = learner();

    let registration = world.service.initiate(actor, cohort, None).await.unwrap();
    let before = world.service.availability(cohort).await.unwrap();

    let session = world.service.start_payment(actor, registration.id).await.unwrap();
    world.gateway.settle(&session.payment_id, PaymentStatus::Paid);
    let confirmed = world
        .service
        .confirm(actor, registration.id, session.payment_id)
        .await
        .unwrap();
    assert_eq!(confirmed.status, RegistrationStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());

    let after = world.service.availability(cohort).await.unwrap();
    assert_eq!(after.enrolled, before.enrolled + 1);
    assert_eq!(after.held, before.held - 1);
}

#[tokio::test]
async fn duplicate_webhook_does_not_double_confirm() {
    let world = World::new();
    let cohort = world.cohort(2);
    let actor = learner();

    let registration = world.service.initiate(actor, cohort, None).await.unwrap();
    let session = world.service.start_payment(actor, registration.id).await.unwrap();
    world.gateway.settle(&session.payment_id, PaymentStatus::Paid);
    world
        .service
        .confirm(actor, registration.id, session.payment_id.clone())
        .await
        .unwrap();

    let outcome = world
        .service
        .handle_payment_webhook(session.payment_id, PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::AlreadyConfirmed);

    let seats = world.service.availability(cohort).await.unwrap();
    assert_eq!((seats.enrolled, seats.held), (1, 0));
    assert_eq!(
        world.service.get(actor, registration.id).await.unwrap().status,
        RegistrationStatus::Confirmed
    );
}

#[tokio::test]
async fn waitlisted_redemption_counts_against_the_per_learner_limit() {
    let world = World::new();
    let (full, open) = (world.cohort(1), world.cohort(1));
    world.once();
    let actor = learner();

    world.service.initiate(learner(), full, None).await.unwrap();
    let queued = world.service.initiate(actor, full, Some("once")).await.unwrap();
    assert_eq!(queued.status, RegistrationStatus::Waitlisted);
    assert_eq!(queued.price, Money::from_minor(90_000));

    let err = world
        .service
        .initiate(actor, open, Some("ONCE"))
        .await
        .unwrap_err();
    assert_eq!(err, RegistrationError::PromoRejected(PromoRejection::UsageLimitExceeded));

    // Leaving the queue gives the redemption back.
    let entry = world.service.waitlist_position(actor, full).await.unwrap();
    world.service.leave_waitlist(actor, entry.entry_id).await.unwrap();
    let registration = world
        .service
        .initiate(actor, open, Some("ONCE"))
        .await
        .unwrap();
    assert_eq!(registration.status, RegistrationStatus::PendingPayment);
}

#[tokio::test]
async fn expiring_twice_matches_expiring_once() {
    let world = World::new();
    let cohort = world.cohort(1);
    let actor = learner();
    let registration = world.service.initiate(actor, cohort, None).await.unwrap();

    world.clock.advance(chrono::Duration::minutes(45));
    assert!(world.service.expire_registration(cohort, registration.id).await.unwrap());
    let once = world.service.availability(cohort).await.unwrap();
    assert!(!world.service.expire_registration(cohort, registration.id).await.unwrap());
    let twice = world.service.availability(cohort).await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(twice.available, 1);
    assert_eq!(
        world.service.get(actor, registration.id).await.unwrap().status,
        RegistrationStatus::Expired
    );
}

#[tokio::test]
async fn duplicate_and_closed_registrations_are_refused() {
    let world = World::new();
    let cohort = world.cohort(5);
    let actor = learner();
    world.service.initiate(actor, cohort, None).await.unwrap();

    let dup = world.service.initiate(actor, cohort, None).await.unwrap_err();
    assert!(matches!(dup, RegistrationError::DuplicateRegistration { .. }));

    world.clock.advance(chrono::Duration::days(8));
    let closed = world.service.initiate(learner(), cohort, None).await.unwrap_err();
    assert_eq!(closed, RegistrationError::RegistrationClosed(cohort));
}

#[tokio::test]
async fn cancelling_a_confirmed_seat_refunds_and_promotes() {
    let world = World::new();
    let cohort = world.cohort(1);
    let (a, b) = (learner(), learner());

    let reg_a = world.service.initiate(a, cohort, None).await.unwrap();
    let session = world.service.start_payment(a, reg_a.id).await.unwrap();
    world.gateway.settle(&session.payment_id, PaymentStatus::Paid);
    world.service.confirm(a, reg_a.id, session.payment_id.clone()).await.unwrap();

    let reg_b = world.service.initiate(b, cohort, None).await.unwrap();
    assert_eq!(reg_b.status, RegistrationStatus::Waitlisted);

    let cancelled = world
        .service
        .cancel(a, reg_a.id, Some("schedule clash".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
    assert_eq!(world.gateway.refunds(), vec![session.payment_id]);

    let promoted = world.service.get(b, reg_b.id).await.unwrap();
    assert_eq!(promoted.status, RegistrationStatus::PendingPayment);
    let seats = world.service.availability(cohort).await.unwrap();
    assert_eq!((seats.enrolled, seats.held), (0, 1));
}

#[tokio::test]
async fn unanswered_offer_cascades_to_the_next_learner() {
    let world = World::new();
    let cohort = world.cohort(1);
    let (a, b, c) = (learner(), learner(), learner());

    world.service.initiate(a, cohort, None).await.unwrap();
    let reg_b = world.service.initiate(b, cohort, None).await.unwrap();
    let reg_c = world.service.initiate(c, cohort, None).await.unwrap();
    assert_eq!(world.service.waitlist_position(c, cohort).await.unwrap().position, 2);

    // A's hold lapses: B is offered the seat.
    world.clock.advance(chrono::Duration::minutes(31));
    world.sweeper.run_once().await;
    assert_eq!(
        world.service.waitlist_position(b, cohort).await.unwrap().status,
        WaitlistStatus::Notified
    );
    // B keeps the head of the queue while the offer is open.
    assert_eq!(world.service.waitlist_position(b, cohort).await.unwrap().position, 1);
    assert_eq!(world.service.waitlist_position(c, cohort).await.unwrap().position, 2);

    // B never pays: C is offered the seat.
    world.clock.advance(chrono::Duration::minutes(31));
    world.sweeper.run_once().await;
    assert_eq!(
        world.service.get(b, reg_b.id).await.unwrap().status,
        RegistrationStatus::Expired
    );
    assert_eq!(
        world.service.get(c, reg_c.id).await.unwrap().status,
        RegistrationStatus::PendingPayment
    );
    assert!(world.service.waitlist_position(b, cohort).await.is_err());
    let position = world.service.waitlist_position(c, cohort).await.unwrap();
    assert_eq!((position.position, position.status), (1, WaitlistStatus::Notified));
}

#[tokio::test]
async fn leaving_the_waitlist_closes_the_gap() {
    let world = World::new();
    let cohort = world.cohort(1);
    let (a, b, c) = (learner(), learner(), learner());
    world.service.initiate(a, cohort, None).await.unwrap();
    world.service.initiate(b, cohort, None).await.unwrap();
    world.service.initiate(c, cohort, None).await.unwrap();

    let entry_b = world.service.waitlist_position(b, cohort).await.unwrap();
    let left = world.service.leave_waitlist(b, entry_b.entry_id).await.unwrap();
    assert_eq!(left.status, WaitlistStatus::Left);

    assert_eq!(world.service.waitlist_position(c, cohort).await.unwrap().position, 1);
    assert_eq!(world.service.availability(cohort).await.unwrap().waitlist_length, 1);

    let again = world.service.leave_waitlist(b, entry_b.entry_id).await.unwrap_err();
    assert!(matches!(again, RegistrationError::InvalidState(_)));
}
