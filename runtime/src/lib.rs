//! # Enrollment Runtime
//!
//! Runtime pieces that sit between reducers and the outside world.
//!
//! ## Core Components
//!
//! - **Effect Executor**: Runs effect descriptions and collects feedback actions
//! - **Keyed Locks**: Serializes work per aggregate key (for example per cohort)
//! - **Scheduling**: Periodic tasks with a skip-if-running overlap guard
//! - **Retry**: Exponential backoff for transient collaborator failures
//! - **Metrics**: Prometheus recorder installation
//!
//! ## Example
//!
//! ```ignore
//! use enrollment_runtime::{KeyedLocks, execute_all};
//!
//! let locks = KeyedLocks::new();
//! let _guard = locks.lock(&cohort_id).await;
//! let effects = reducer.reduce(&mut state, action, &env);
//! let feedback = execute_all(effects).await;
//! ```

/// Per-key async mutual exclusion
pub mod keyed;

/// Retry logic with exponential backoff
pub mod retry;

/// Periodic tasks and overlap guards
pub mod schedule;

/// Prometheus metrics for observability
pub mod metrics;

pub use keyed::KeyedLocks;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use schedule::{OverlapGuard, RunOutcome, RunPermit, spawn_periodic};

use enrollment_core::effect::Effect;
use futures::future::{BoxFuture, FutureExt, join_all};

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for one dependency
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    pub message: Option<String>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Execute one effect to completion and return the actions it fed back.
///
/// `Parallel` children are polled concurrently; `Sequential` children run in
/// order and their feedback keeps that order.
pub fn execute<A>(effect: Effect<A>) -> BoxFuture<'static, Vec<A>>
where
    A: Send + 'static,
{
    async move {
        match effect {
            Effect::None => {
                tracing::trace!("Executing Effect::None (no-op)");
                Vec::new()
            },
            Effect::Future(fut) => {
                tracing::trace!("Executing Effect::Future");
                crate::metrics::effects::record_executed("future");
                let action = fut.await;
                if action.is_none() {
                    tracing::trace!("Effect::Future completed with no action");
                }
                action.into_iter().collect()
            },
            Effect::Parallel(effects) => {
                tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                crate::metrics::effects::record_executed("parallel");
                join_all(effects.into_iter().map(execute))
                    .await
                    .into_iter()
                    .flatten()
                    .collect()
            },
            Effect::Sequential(effects) => {
                tracing::trace!("Executing Effect::Sequential with {} effects", effects.len());
                crate::metrics::effects::record_executed("sequential");
                let mut feedback = Vec::new();
                for effect in effects {
                    feedback.extend(execute(effect).await);
                }
                feedback
            },
        }
    }
    .boxed()
}

/// Execute a reducer's effect list in order.
pub async fn execute_all<A, I>(effects: I) -> Vec<A>
where
    A: Send + 'static,
    I: IntoIterator<Item = Effect<A>>,
{
    execute(Effect::chain(effects.into_iter().collect())).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sequential_feedback_keeps_order() {
        let effect = Effect::chain(vec![
            Effect::future(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Some(1)
            }),
            Effect::None,
            Effect::future(async { Some(2) }),
            Effect::future(async { None }),
        ]);

        assert_eq!(execute(effect).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn parallel_collects_every_child() {
        let effect = Effect::merge(vec![
            Effect::future(async { Some("a") }),
            Effect::merge(vec![Effect::future(async { Some("b") }), Effect::None]),
        ]);

        let mut feedback = execute(effect).await;
        feedback.sort_unstable();
        assert_eq!(feedback, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn execute_all_on_empty_list_yields_nothing() {
        let feedback: Vec<u8> = execute_all(Vec::new()).await;
        assert!(feedback.is_empty());
    }

    #[test]
    fn health_check_constructors() {
        let ok = HealthCheck::healthy("repository");
        assert!(ok.status.is_healthy());
        let down = HealthCheck::unhealthy("repository", "connection refused");
        assert_eq!(down.status.to_string(), "unhealthy");
        assert_eq!(down.message.as_deref(), Some("connection refused"));
    }
}
