//! Learner notifications.
//!
//! Delivery (email, SMS) belongs to another system. The service only says
//! what happened; [`LoggingNotifier`] writes it to the log and
//! [`RecordingNotifier`] keeps it for assertions.

use crate::types::{CohortId, RegistrationId, UserId, WaitlistEntryId};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};

/// Something a learner should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A seat was offered from the waitlist
    WaitlistPromoted {
        /// Learner
        user_id: UserId,
        /// Cohort
        cohort_id: CohortId,
        /// Registration now holding the seat
        registration_id: RegistrationId,
        /// Pay before this
        pay_by: DateTime<Utc>,
    },
    /// An unpaid hold lapsed
    HoldExpired {
        /// Learner
        user_id: UserId,
        /// Registration
        registration_id: RegistrationId,
    },
    /// A waitlist offer lapsed
    WaitlistOfferExpired {
        /// Learner
        user_id: UserId,
        /// Entry
        entry_id: WaitlistEntryId,
    },
    /// A registration was cancelled
    RegistrationCancelled {
        /// Learner
        user_id: UserId,
        /// Registration
        registration_id: RegistrationId,
        /// Whether a refund was issued
        refunded: bool,
    },
}

impl Notification {
    /// Learner to notify
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::WaitlistPromoted { user_id, .. }
            | Self::HoldExpired { user_id, .. }
            | Self::WaitlistOfferExpired { user_id, .. }
            | Self::RegistrationCancelled { user_id, .. } => *user_id,
        }
    }
}

/// Notification sink
pub trait Notifier: Send + Sync {
    /// Deliver one notification. Failures are the sink's to log; the
    /// registration flow never waits on delivery succeeding.
    fn notify(&self, notification: Notification) -> BoxFuture<'_, ()>;
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tracing::info!(user_id = %notification.user_id(), ?notification, "Learner notified");
        })
    }
}

/// Keeps every notification in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, ()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Box::pin(async {})
    }
}
