//! Domain aggregates.
//!
//! `capacity`, `promo` and `waitlist` are plain data structures with no I/O.
//! `cohort` ties them together behind the registration reducer.

pub mod capacity;
pub mod cohort;
pub mod promo;
pub mod waitlist;

pub use capacity::{SeatError, SeatLedger};
pub use cohort::{
    CohortAction, CohortEnvironment, CohortEvent, CohortReducer, CohortState, Policy, PromoInput,
};
pub use waitlist::{Waitlist, WaitlistError};
