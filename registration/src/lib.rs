//! Short-course cohort registration.
//!
//! Learners register for a cohort, hold a seat while they pay, and confirm
//! once the payment settles. Full cohorts queue learners on a waitlist that
//! is promoted as seats free up. A periodic sweeper expires lapsed holds and
//! offers.
//!
//! # Architecture
//!
//! ```text
//!   HTTP (api/, server/)
//!          │
//!          ▼
//!   RegistrationService ──── Catalog, PaymentGateway, Notifier
//!          │   per-cohort lock
//!          ▼
//!   CohortReducer (aggregates/)
//!     SeatLedger · PromoValidator · Waitlist
//!          │
//!          ▼
//!   RegistrationRepository (store/)  in-memory | PostgreSQL
//! ```
//!
//! # Key Features
//!
//! ## No overselling
//!
//! All seat arithmetic lives in the cohort's [`SeatLedger`](aggregates::SeatLedger):
//!
//! ```text
//! available = capacity - enrolled - held
//! ```
//!
//! Every command on a cohort runs under that cohort's lock and is saved with
//! an optimistic version check, so two reservations for the last seat can
//! never both succeed. Different cohorts never contend.
//!
//! ## Holds, expiry and promotion
//!
//! ```text
//! PENDING_PAYMENT ──confirm──▶ CONFIRMED ──cancel(refund)──▶ CANCELLED
//!      │    ▲                                       ▲
//!   expire  │ promote                               │
//!      ▼    │                                       │
//!   EXPIRED WAITLISTED ─────────leave/cancel────────┘
//! ```
//!
//! Freed seats go to the head of the waitlist. A promoted learner gets a
//! fresh hold; if it lapses the next learner is promoted in turn.

#![allow(clippy::module_name_repetitions)]

pub mod aggregates;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod payment_gateway;
pub mod server;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod types;

pub use aggregates::{CohortAction, CohortReducer, CohortState, Policy};
pub use catalog::{Catalog, InMemoryCatalog};
pub use config::Config;
pub use error::{PromoRejection, RegistrationError};
pub use notifier::{LoggingNotifier, Notification, Notifier, RecordingNotifier};
pub use payment_gateway::{MockPaymentGateway, PaymentGateway, PaymentGatewayError, PaymentStatus};
pub use server::{AppState, build_router};
pub use service::{Actor, Collaborators, RegistrationService, ServiceSettings};
pub use store::{InMemoryRepository, PostgresRepository, RegistrationRepository, RepositoryError};
pub use sweeper::{ExpirySweeper, SweepReport};
pub use types::*;
