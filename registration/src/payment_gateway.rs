//! Payment gateway contract and a scriptable mock.
//!
//! The concrete gateway is out of scope for this service. Anything that can
//! create a payment, report its status, refund it and void an unpaid one fits.

use crate::types::{Money, PaymentId, RegistrationId};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Result alias for gateway calls
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Gateway failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentGatewayError {
    /// No answer in time
    #[error("gateway timed out")]
    Timeout,
    /// Gateway reachable but failing
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// Payment reference unknown to the gateway
    #[error("unknown payment {0}")]
    UnknownPayment(PaymentId),
    /// Gateway refused the operation
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl PaymentGatewayError {
    /// Whether the same call may succeed later
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

/// Settlement state reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Settled
    Paid,
    /// Declined or abandoned
    Failed,
    /// Not final yet
    Pending,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Pending => "pending",
        })
    }
}

/// Payment gateway operations
pub trait PaymentGateway: Send + Sync {
    /// Open a payment for a registration
    fn create_payment(
        &self,
        registration_id: RegistrationId,
        amount: Money,
        currency: &str,
    ) -> BoxFuture<'_, GatewayResult<PaymentId>>;

    /// Current settlement state
    fn payment_status(&self, payment_id: &PaymentId) -> BoxFuture<'_, GatewayResult<PaymentStatus>>;

    /// Refund a settled payment, returning the refund reference
    fn refund(&self, payment_id: &PaymentId, reason: Option<&str>) -> BoxFuture<'_, GatewayResult<String>>;

    /// Release an unpaid payment so it can no longer be completed
    fn void_payment(&self, payment_id: &PaymentId) -> BoxFuture<'_, GatewayResult<()>>;
}

#[derive(Default)]
struct MockBook {
    statuses: HashMap<PaymentId, PaymentStatus>,
    refunded: Vec<PaymentId>,
    voided: HashSet<PaymentId>,
}

/// In-process gateway for development and tests.
///
/// Payments start `pending`. Tests settle them with [`MockPaymentGateway::settle`]
/// and can inject timeouts with [`MockPaymentGateway::fail_next`].
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    book: Arc<Mutex<MockBook>>,
    failures: Arc<AtomicU32>,
    latency: Option<Duration>,
}

impl std::fmt::Debug for MockPaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPaymentGateway").finish_non_exhaustive()
    }
}

impl MockPaymentGateway {
    /// Gateway that answers immediately
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Set a payment's status
    pub fn settle(&self, payment_id: &PaymentId, status: PaymentStatus) {
        self.book().statuses.insert(payment_id.clone(), status);
    }

    /// Make the next `n` calls fail with [`PaymentGatewayError::Timeout`]
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Payments refunded so far, in order
    #[must_use]
    pub fn refunds(&self) -> Vec<PaymentId> {
        self.book().refunded.clone()
    }

    /// Whether `payment_id` was voided
    #[must_use]
    pub fn is_voided(&self, payment_id: &PaymentId) -> bool {
        self.book().voided.contains(payment_id)
    }

    fn book(&self) -> std::sync::MutexGuard<'_, MockBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn call(&self) -> GatewayResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PaymentGatewayError::Timeout);
        }
        Ok(())
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_payment(
        &self,
        registration_id: RegistrationId,
        amount: Money,
        currency: &str,
    ) -> BoxFuture<'_, GatewayResult<PaymentId>> {
        let currency = currency.to_string();
        Box::pin(async move {
            self.call().await?;
            let payment_id = PaymentId::new(format!("mock_pay_{}", uuid::Uuid::new_v4().simple()));
            self.book().statuses.insert(payment_id.clone(), PaymentStatus::Pending);
            tracing::info!(
                registration_id = %registration_id,
                payment_id = %payment_id,
                amount = %amount,
                currency = %currency,
                "Mock payment created"
            );
            Ok(payment_id)
        })
    }

    fn payment_status(&self, payment_id: &PaymentId) -> BoxFuture<'_, GatewayResult<PaymentStatus>> {
        let payment_id = payment_id.clone();
        Box::pin(async move {
            self.call().await?;
            self.book()
                .statuses
                .get(&payment_id)
                .copied()
                .ok_or(PaymentGatewayError::UnknownPayment(payment_id))
        })
    }

    fn refund(&self, payment_id: &PaymentId, reason: Option<&str>) -> BoxFuture<'_, GatewayResult<String>> {
        let payment_id = payment_id.clone();
        let reason = reason.map(str::to_string);
        Box::pin(async move {
            self.call().await?;
            let mut book = self.book();
            match book.statuses.get(&payment_id) {
                Some(PaymentStatus::Paid) => {},
                Some(_) => return Err(PaymentGatewayError::Rejected(format!("{payment_id} is not paid"))),
                None => return Err(PaymentGatewayError::UnknownPayment(payment_id)),
            }
            book.refunded.push(payment_id.clone());
            let refund_id = format!("mock_refund_{}", uuid::Uuid::new_v4().simple());
            tracing::info!(payment_id = %payment_id, refund_id = %refund_id, reason = ?reason, "Mock refund processed");
            Ok(refund_id)
        })
    }

    fn void_payment(&self, payment_id: &PaymentId) -> BoxFuture<'_, GatewayResult<()>> {
        let payment_id = payment_id.clone();
        Box::pin(async move {
            self.call().await?;
            let mut book = self.book();
            if book.statuses.get(&payment_id) == Some(&PaymentStatus::Paid) {
                return Err(PaymentGatewayError::Rejected(format!("{payment_id} is already paid")));
            }
            book.statuses.insert(payment_id.clone(), PaymentStatus::Failed);
            book.voided.insert(payment_id);
            Ok(())
        })
    }
}
