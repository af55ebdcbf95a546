//! Application state shared by every handler.

use crate::service::RegistrationService;
use crate::sweeper::ExpirySweeper;
use enrollment_runtime::metrics::MetricsRecorder;
use std::sync::Arc;

/// Cloned per request; every field is cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Registration operations
    pub service: RegistrationService,
    /// Expiry sweeper, for manual triggers
    pub sweeper: ExpirySweeper,
    /// Prometheus recorder; `None` when metrics are not exported
    pub metrics: Option<MetricsRecorder>,
    /// Shared secret the payment webhook must present
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    /// State without a metrics endpoint or webhook secret
    #[must_use]
    pub const fn new(service: RegistrationService, sweeper: ExpirySweeper) -> Self {
        Self {
            service,
            sweeper,
            metrics: None,
            webhook_secret: None,
        }
    }

    /// Serve metrics from `recorder`
    #[must_use]
    pub fn with_metrics(mut self, recorder: MetricsRecorder) -> Self {
        self.metrics = Some(recorder);
        self
    }

    /// Require `secret` on webhook deliveries
    #[must_use]
    pub fn with_webhook_secret(mut self, secret: impl Into<Arc<str>>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }
}
