//! Concurrency tests: last-seat races and per-learner uniqueness.
//!
//! Run with: `cargo test --test concurrency_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use common::World;
use registration::{Actor, RegistrationError, RegistrationStatus, UserId};
use std::collections::BTreeSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_initiates_never_oversell() {
    let world = World::new();
    let capacity = 5;
    let cohort = world.cohort(capacity);

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let service = world.service.clone();
            tokio::spawn(async move { service.initiate(Actor::learner(UserId::new()), cohort, None).await })
        })
        .collect();

    let mut held = 0;
    let mut waitlisted = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap().status {
            RegistrationStatus::PendingPayment => held += 1,
            RegistrationStatus::Waitlisted => waitlisted += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(held, capacity);
    assert_eq!(waitlisted, 40 - capacity);

    let seats = world.service.availability(cohort).await.unwrap();
    assert_eq!(seats.held, capacity);
    assert_eq!(seats.available, 0);
    assert!(seats.enrolled + seats.held <= seats.capacity);
    assert_eq!(seats.waitlist_length, 35);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waitlist_positions_stay_dense_under_contention() {
    let world = World::new();
    let cohort = world.cohort(1);
    world.service.initiate(Actor::learner(UserId::new()), cohort, None).await.unwrap();

    let learners: Vec<Actor> = (0..25).map(|_| Actor::learner(UserId::new())).collect();
    let handles: Vec<_> = learners
        .iter()
        .map(|&actor| {
            let service = world.service.clone();
            tokio::spawn(async move { service.join_waitlist(actor, cohort, None).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut positions = BTreeSet::new();
    for actor in &learners {
        positions.insert(world.service.waitlist_position(*actor, cohort).await.unwrap().position);
    }
    assert_eq!(positions, (1..=25).collect::<BTreeSet<u32>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_active_registration_per_learner() {
    let world = World::new();
    let cohort = world.cohort(10);
    let actor = Actor::learner(UserId::new());

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let service = world.service.clone();
            tokio::spawn(async move { service.initiate(actor, cohort, None).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(RegistrationError::DuplicateRegistration { .. }) => {},
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(world.service.registrations_for(actor).await.unwrap().len(), 1);
    assert_eq!(world.service.availability(cohort).await.unwrap().held, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cohorts_do_not_interfere() {
    let world = World::new();
    let cohorts: Vec<_> = (0..4).map(|_| world.cohort(3)).collect();

    let handles: Vec<_> = cohorts
        .iter()
        .flat_map(|&cohort| {
            (0..6).map(move |_| (cohort, Actor::learner(UserId::new())))
        })
        .map(|(cohort, actor)| {
            let service = world.service.clone();
            tokio::spawn(async move { service.initiate(actor, cohort, None).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for cohort in cohorts {
        let seats = world.service.availability(cohort).await.unwrap();
        assert_eq!((seats.held, seats.waitlist_length), (3, 3));
    }
}
