//! Prometheus metrics for observability and monitoring.
//!
//! Runtime-level series (effects, lock waits, scheduled runs, retries) are
//! described here. Domain crates describe their own series and record them
//! through the `metrics` macros; everything lands in the same recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use enrollment_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! let body = recorder.render();
//! # Ok(())
//! # }
//! ```

use ::metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Handle to the installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    /// Install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a recorder is
    /// already installed in this process.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        tracing::info!("Prometheus recorder installed");
        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn register_metrics() {
    describe_counter!(
        "effects_executed_total",
        "Effects executed by the runtime, by effect type"
    );
    describe_histogram!(
        "keyed_lock_wait_seconds",
        "Time spent waiting for a per-key lock"
    );
    describe_counter!(
        "scheduled_runs_total",
        "Periodic task ticks, by task and outcome (started, skipped)"
    );
    describe_counter!(
        "retry_outcomes_total",
        "Retried operations, by outcome (recovered, exhausted)"
    );
}

/// Effect execution metrics
pub mod effects {
    /// Count one executed effect
    pub fn record_executed(kind: &'static str) {
        ::metrics::counter!("effects_executed_total", "type" => kind).increment(1);
    }
}

/// Keyed lock metrics
pub mod locks {
    use std::time::Duration;

    /// Record how long a lock acquisition waited
    pub fn record_wait(waited: Duration) {
        ::metrics::histogram!("keyed_lock_wait_seconds").record(waited.as_secs_f64());
    }
}

/// Scheduler metrics
pub mod schedule {
    /// Count one tick of a periodic task
    pub fn record_run(task: &'static str, outcome: &'static str) {
        ::metrics::counter!("scheduled_runs_total", "task" => task, "outcome" => outcome)
            .increment(1);
    }
}

/// Retry metrics
pub mod retry {
    /// Count the final outcome of a retried operation
    pub fn record_outcome(outcome: &'static str) {
        ::metrics::counter!("retry_outcomes_total", "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        effects::record_executed("future");
        locks::record_wait(std::time::Duration::from_millis(3));
        schedule::record_run("sweep", "skipped");
        retry::record_outcome("recovered");
    }

    #[test]
    fn install_then_render_contains_described_series() {
        // Only one recorder per process; tolerate a recorder from another test.
        if let Ok(recorder) = MetricsRecorder::install() {
            retry::record_outcome("exhausted");
            assert!(recorder.render().contains("retry_outcomes_total"));
        }
    }
}
