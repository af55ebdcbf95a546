//! Waitlist for one cohort.
//!
//! Active entries (`WAITING`, `NOTIFIED`) are kept in queue order and carry
//! positions `1..=N` with no gaps. Whenever an entry becomes terminal it moves
//! to history and every later entry shifts up by one.

use crate::types::{CohortId, RegistrationId, UserId, WaitlistEntry, WaitlistEntryId, WaitlistStatus};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Waitlist failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitlistError {
    /// The learner already has an active entry
    #[error("user {0} is already on the waitlist")]
    AlreadyQueued(UserId),
    /// No active entry with that id
    #[error("waitlist entry {0} is not active")]
    NotActive(WaitlistEntryId),
    /// The entry is in the wrong state for the operation
    #[error("waitlist entry {id} is {status}")]
    WrongStatus {
        /// Entry
        id: WaitlistEntryId,
        /// Its current status
        status: WaitlistStatus,
    },
}

/// Queue of learners waiting for a seat in one cohort
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Waitlist {
    active: Vec<WaitlistEntry>,
    history: Vec<WaitlistEntry>,
}

impl Waitlist {
    /// Rebuild from persisted entries in any order
    #[must_use]
    pub fn restore(entries: impl IntoIterator<Item = WaitlistEntry>) -> Self {
        let (mut active, history): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|e| e.status.is_active());
        active.sort_by_key(|e| (e.position, e.joined_at));
        let mut waitlist = Self { active, history };
        waitlist.reindex();
        waitlist
    }

    /// Active entries in queue order
    #[must_use]
    pub fn active(&self) -> &[WaitlistEntry] {
        &self.active
    }

    /// Terminal entries, oldest first
    #[must_use]
    pub fn history(&self) -> &[WaitlistEntry] {
        &self.history
    }

    /// Every entry, active first
    pub fn entries(&self) -> impl Iterator<Item = &WaitlistEntry> {
        self.active.iter().chain(self.history.iter())
    }

    /// Number of active entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether nobody is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Look up any entry, active or terminal
    #[must_use]
    pub fn get(&self, id: WaitlistEntryId) -> Option<&WaitlistEntry> {
        self.entries().find(|e| e.id == id)
    }

    /// The active entry standing for `registration`
    #[must_use]
    pub fn active_for_registration(&self, registration: RegistrationId) -> Option<&WaitlistEntry> {
        self.active.iter().find(|e| e.registration_id == registration)
    }

    /// Position of the learner's active entry
    #[must_use]
    pub fn position_of(&self, user: UserId) -> Option<u32> {
        self.active.iter().find(|e| e.user_id == user).map(|e| e.position)
    }

    /// The first `WAITING` entry
    #[must_use]
    pub fn next_waiting(&self) -> Option<&WaitlistEntry> {
        self.active.iter().find(|e| e.status == WaitlistStatus::Waiting)
    }

    /// `NOTIFIED` entries whose offer lapsed before `now`
    pub fn lapsed_offers(&self, now: DateTime<Utc>) -> impl Iterator<Item = &WaitlistEntry> {
        self.active.iter().filter(move |e| {
            e.status == WaitlistStatus::Notified && e.expires_at.is_some_and(|at| at < now)
        })
    }

    /// Append a learner at the back of the queue.
    ///
    /// # Errors
    ///
    /// [`WaitlistError::AlreadyQueued`] if the learner has an active entry.
    pub fn join(
        &mut self,
        id: WaitlistEntryId,
        user_id: UserId,
        cohort_id: CohortId,
        registration_id: RegistrationId,
        now: DateTime<Utc>,
    ) -> Result<&WaitlistEntry, WaitlistError> {
        if self.active.iter().any(|e| e.user_id == user_id) {
            return Err(WaitlistError::AlreadyQueued(user_id));
        }
        let position = u32::try_from(self.active.len() + 1).unwrap_or(u32::MAX);
        self.active.push(WaitlistEntry {
            id,
            user_id,
            cohort_id,
            registration_id,
            position,
            status: WaitlistStatus::Waiting,
            joined_at: now,
            notified_at: None,
            expires_at: None,
        });
        Ok(&self.active[self.active.len() - 1])
    }

    /// Offer the seat to a `WAITING` entry.
    ///
    /// # Errors
    ///
    /// If the entry is not active or not `WAITING`.
    pub fn notify(
        &mut self,
        id: WaitlistEntryId,
        now: DateTime<Utc>,
        response_window: Duration,
    ) -> Result<&WaitlistEntry, WaitlistError> {
        let index = self.index_of(id)?;
        let entry = &mut self.active[index];
        if entry.status != WaitlistStatus::Waiting {
            return Err(WaitlistError::WrongStatus { id, status: entry.status });
        }
        entry.status = WaitlistStatus::Notified;
        entry.notified_at = Some(now);
        entry.expires_at = Some(now + response_window);
        Ok(&self.active[index])
    }

    /// Voluntary leave (or cancellation of the underlying registration).
    ///
    /// # Errors
    ///
    /// [`WaitlistError::NotActive`] if the entry is not active.
    pub fn leave(&mut self, id: WaitlistEntryId) -> Result<WaitlistEntry, WaitlistError> {
        self.terminate(id, WaitlistStatus::Left)
    }

    /// The notified learner paid.
    ///
    /// # Errors
    ///
    /// If the entry is not active and `NOTIFIED`.
    pub fn convert(&mut self, id: WaitlistEntryId) -> Result<WaitlistEntry, WaitlistError> {
        self.require_notified(id)?;
        self.terminate(id, WaitlistStatus::Converted)
    }

    /// The offer lapsed.
    ///
    /// # Errors
    ///
    /// If the entry is not active and `NOTIFIED`.
    pub fn expire(&mut self, id: WaitlistEntryId) -> Result<WaitlistEntry, WaitlistError> {
        self.require_notified(id)?;
        self.terminate(id, WaitlistStatus::Expired)
    }

    /// Whether positions are exactly `1..=len`
    #[must_use]
    pub fn positions_are_contiguous(&self) -> bool {
        self.active
            .iter()
            .zip(1_u32..)
            .all(|(entry, expected)| entry.position == expected)
    }

    fn require_notified(&self, id: WaitlistEntryId) -> Result<(), WaitlistError> {
        let entry = &self.active[self.index_of(id)?];
        if entry.status == WaitlistStatus::Notified {
            Ok(())
        } else {
            Err(WaitlistError::WrongStatus { id, status: entry.status })
        }
    }

    fn index_of(&self, id: WaitlistEntryId) -> Result<usize, WaitlistError> {
        self.active
            .iter()
            .position(|e| e.id == id)
            .ok_or(WaitlistError::NotActive(id))
    }

    fn terminate(&mut self, id: WaitlistEntryId, status: WaitlistStatus) -> Result<WaitlistEntry, WaitlistError> {
        let index = self.index_of(id)?;
        let mut entry = self.active.remove(index);
        entry.status = status;
        self.history.push(entry.clone());
        self.reindex();
        Ok(entry)
    }

    fn reindex(&mut self) {
        for (entry, position) in self.active.iter_mut().zip(1_u32..) {
            entry.position = position;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use enrollment_testing::test_epoch;

    fn queue(n: usize) -> (Waitlist, Vec<WaitlistEntryId>, Vec<UserId>) {
        let mut waitlist = Waitlist::default();
        let cohort = CohortId::new();
        let mut ids = Vec::new();
        let mut users = Vec::new();
        for i in 0..n {
            let id = WaitlistEntryId::new();
            let user = UserId::new();
            let at = test_epoch() + Duration::seconds(i64::try_from(i).unwrap());
            waitlist.join(id, user, cohort, RegistrationId::new(), at).unwrap();
            ids.push(id);
            users.push(user);
        }
        (waitlist, ids, users)
    }

    #[test]
    fn join_appends_at_back() {
        let (waitlist, _, users) = queue(3);
        assert_eq!(waitlist.position_of(users[0]), Some(1));
        assert_eq!(waitlist.position_of(users[2]), Some(3));
    }

    #[test]
    fn duplicate_join_rejected() {
        let (mut waitlist, _, users) = queue(1);
        let err = waitlist
            .join(WaitlistEntryId::new(), users[0], CohortId::new(), RegistrationId::new(), test_epoch())
            .unwrap_err();
        assert_eq!(err, WaitlistError::AlreadyQueued(users[0]));
    }

    #[test]
    fn leave_closes_the_gap() {
        let (mut waitlist, ids, users) = queue(4);
        waitlist.leave(ids[1]).unwrap();

        assert_eq!(waitlist.position_of(users[0]), Some(1));
        assert_eq!(waitlist.position_of(users[1]), None);
        assert_eq!(waitlist.position_of(users[2]), Some(2));
        assert_eq!(waitlist.position_of(users[3]), Some(3));
        assert!(waitlist.positions_are_contiguous());
        assert_eq!(waitlist.get(ids[1]).unwrap().status, WaitlistStatus::Left);
    }

    #[test]
    fn left_learner_can_rejoin_at_back() {
        let (mut waitlist, ids, users) = queue(2);
        waitlist.leave(ids[0]).unwrap();
        waitlist
            .join(WaitlistEntryId::new(), users[0], CohortId::new(), RegistrationId::new(), test_epoch())
            .unwrap();
        assert_eq!(waitlist.position_of(users[0]), Some(2));
    }

    #[test]
    fn notify_then_convert() {
        let (mut waitlist, ids, _) = queue(2);
        let window = Duration::hours(24);

        let offered = waitlist.notify(ids[0], test_epoch(), window).unwrap();
        assert_eq!(offered.expires_at, Some(test_epoch() + window));
        assert_eq!(waitlist.next_waiting().unwrap().id, ids[1]);

        waitlist.convert(ids[0]).unwrap();
        assert_eq!(waitlist.active()[0].id, ids[1]);
        assert_eq!(waitlist.active()[0].position, 1);
    }

    #[test]
    fn only_notified_entries_expire_or_convert() {
        let (mut waitlist, ids, _) = queue(1);
        assert!(matches!(waitlist.expire(ids[0]), Err(WaitlistError::WrongStatus { .. })));
        assert!(matches!(waitlist.convert(ids[0]), Err(WaitlistError::WrongStatus { .. })));

        waitlist.notify(ids[0], test_epoch(), Duration::minutes(5)).unwrap();
        assert!(matches!(waitlist.notify(ids[0], test_epoch(), Duration::minutes(5)), Err(WaitlistError::WrongStatus { .. })));
        waitlist.expire(ids[0]).unwrap();
        assert_eq!(waitlist.expire(ids[0]), Err(WaitlistError::NotActive(ids[0])));
    }

    #[test]
    fn lapsed_offers_are_strictly_past() {
        let (mut waitlist, ids, _) = queue(2);
        waitlist.notify(ids[0], test_epoch(), Duration::minutes(10)).unwrap();
        let deadline = test_epoch() + Duration::minutes(10);

        assert_eq!(waitlist.lapsed_offers(deadline).count(), 0);
        let lapsed: Vec<_> = waitlist.lapsed_offers(deadline + Duration::seconds(1)).map(|e| e.id).collect();
        assert_eq!(lapsed, vec![ids[0]]);
    }

    #[test]
    fn restore_repairs_positions() {
        let (waitlist, _, users) = queue(3);
        let mut entries: Vec<_> = waitlist.entries().cloned().collect();
        entries.reverse();
        entries[0].position = 9;

        let restored = Waitlist::restore(entries);
        assert!(restored.positions_are_contiguous());
        assert_eq!(restored.position_of(users[0]), Some(1));
        assert_eq!(restored.position_of(users[2]), Some(3));
    }
}
