//! Seat ledger for one cohort.
//!
//! Tracks capacity, confirmed enrollments and the set of registrations
//! currently holding a seat. Every operation keeps
//! `enrolled + held <= capacity`.
//!
//! Holds are keyed by registration id, which makes every operation
//! idempotent: reserving twice holds one seat, releasing twice frees one.

use crate::types::RegistrationId;
use std::collections::BTreeSet;
use thiserror::Error;

/// Ledger failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatError {
    /// All seats are enrolled or held
    #[error("no seats available")]
    NoCapacity,
    /// Confirming a reservation that holds no seat
    #[error("registration holds no seat")]
    NotHeld,
}

/// Seat counts for one cohort
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeatLedger {
    capacity: u32,
    enrolled: u32,
    holds: BTreeSet<RegistrationId>,
    confirmed: BTreeSet<RegistrationId>,
}

impl SeatLedger {
    /// Empty ledger with `capacity` seats
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Rebuild from persisted counts.
    ///
    /// `enrolled` may exceed `confirmed.len()` when enrollments were recorded
    /// outside this service. It never drops below it.
    #[must_use]
    pub fn restore(
        capacity: u32,
        enrolled: u32,
        holds: impl IntoIterator<Item = RegistrationId>,
        confirmed: impl IntoIterator<Item = RegistrationId>,
    ) -> Self {
        let holds: BTreeSet<_> = holds.into_iter().collect();
        let confirmed: BTreeSet<_> = confirmed.into_iter().collect();
        let enrolled = enrolled.max(u32::try_from(confirmed.len()).unwrap_or(u32::MAX));
        let mut ledger = Self {
            capacity,
            enrolled,
            holds,
            confirmed,
        };
        ledger.set_capacity(capacity);
        ledger
    }

    /// Seats offered
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Confirmed enrollments
    #[must_use]
    pub const fn enrolled(&self) -> u32 {
        self.enrolled
    }

    /// Seats on hold pending payment
    #[must_use]
    pub fn held(&self) -> u32 {
        u32::try_from(self.holds.len()).unwrap_or(u32::MAX)
    }

    /// Seats free for a new hold
    #[must_use]
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.enrolled.saturating_add(self.held()))
    }

    /// Whether `registration` holds a seat
    #[must_use]
    pub fn is_held(&self, registration: RegistrationId) -> bool {
        self.holds.contains(&registration)
    }

    /// Registrations holding seats, in id order
    pub fn holds(&self) -> impl Iterator<Item = RegistrationId> + '_ {
        self.holds.iter().copied()
    }

    /// Apply a capacity published by the catalog.
    ///
    /// Capacity never drops below seats already committed; the extra seats
    /// simply stop being offered once they are released.
    pub fn set_capacity(&mut self, capacity: u32) {
        let committed = self.enrolled.saturating_add(self.held());
        if capacity < committed {
            tracing::warn!(
                requested = capacity,
                committed,
                "Catalog capacity below committed seats; keeping committed count"
            );
        }
        self.capacity = capacity.max(committed);
    }

    /// Hold a seat for `registration`.
    ///
    /// # Errors
    ///
    /// [`SeatError::NoCapacity`] when every seat is enrolled or held.
    pub fn reserve(&mut self, registration: RegistrationId) -> Result<(), SeatError> {
        if self.holds.contains(&registration) || self.confirmed.contains(&registration) {
            return Ok(());
        }
        if self.available() == 0 {
            return Err(SeatError::NoCapacity);
        }
        self.holds.insert(registration);
        Ok(())
    }

    /// Turn a hold into an enrollment. Returns `false` if already confirmed.
    ///
    /// # Errors
    ///
    /// [`SeatError::NotHeld`] when `registration` neither holds nor owns a seat.
    pub fn confirm(&mut self, registration: RegistrationId) -> Result<bool, SeatError> {
        if self.confirmed.contains(&registration) {
            return Ok(false);
        }
        if !self.holds.remove(&registration) {
            return Err(SeatError::NotHeld);
        }
        self.confirmed.insert(registration);
        self.enrolled += 1;
        Ok(true)
    }

    /// Release a hold. Returns `true` if a seat was freed.
    pub fn release(&mut self, registration: RegistrationId) -> bool {
        self.holds.remove(&registration)
    }

    /// Give back a confirmed seat (cancellation after refund).
    /// Returns `true` if a seat was freed.
    pub fn withdraw(&mut self, registration: RegistrationId) -> bool {
        if self.confirmed.remove(&registration) {
            self.enrolled = self.enrolled.saturating_sub(1);
            true
        } else {
            false
        }
    }
}
