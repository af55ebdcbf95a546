//! Periodic tasks with a skip-if-running overlap guard.
//!
//! A tick that fires while the previous run is still in flight is skipped,
//! never queued. Manual triggers go through the same guard, so a manual run
//! and a scheduled run never overlap either.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Shared flag admitting at most one run at a time.
#[derive(Debug, Clone, Default)]
pub struct OverlapGuard {
    running: Arc<AtomicBool>,
}

/// Proof that the holder owns the current run. Dropping it ends the run.
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Result of asking a guarded task to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    /// The task ran and produced `T`
    Completed(T),
    /// Another run was in flight
    Skipped,
}

impl OverlapGuard {
    /// Create an idle guard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run if nobody else holds it
    #[must_use]
    pub fn try_start(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: Arc::clone(&self.running),
            })
    }

    /// Whether a run currently holds the guard
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run `task` unless another run is in flight
    pub async fn run<F, Fut, T>(&self, task: F) -> RunOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.try_start() {
            Some(_permit) => RunOutcome::Completed(task().await),
            None => RunOutcome::Skipped,
        }
    }
}

/// Spawn `task` every `period` until `shutdown` flips to `true`.
///
/// The first run happens one period after spawning. Each run is spawned on
/// its own task holding a [`RunPermit`], so a slow run never delays the
/// ticker; the next tick simply observes the guard and skips.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    guard: OverlapGuard,
    task: F,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(task = name, period_secs = period.as_secs(), "Periodic task scheduled");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(task = name, "Periodic task stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Some(permit) = guard.try_start() {
                        crate::metrics::schedule::record_run(name, "started");
                        let run = task();
                        tokio::spawn(async move {
                            let _permit = permit;
                            run.await;
                        });
                    } else {
                        tracing::warn!(task = name, "Previous run still in flight, skipping tick");
                        crate::metrics::schedule::record_run(name, "skipped");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn second_start_is_refused_until_permit_drops() {
        let guard = OverlapGuard::new();
        let permit = guard.try_start();
        assert!(permit.is_some());
        assert!(guard.try_start().is_none());
        assert!(guard.is_running());

        drop(permit);
        assert!(!guard.is_running());
        assert!(guard.try_start().is_some());
    }

    #[tokio::test]
    async fn run_reports_skipped_while_busy() {
        let guard = OverlapGuard::new();
        let _held = guard.try_start().unwrap();

        let outcome = guard.run(|| async { 5 }).await;
        assert_eq!(outcome, RunOutcome::Skipped);
    }

    #[tokio::test]
    async fn run_completes_when_idle() {
        let guard = OverlapGuard::new();
        assert_eq!(guard.run(|| async { 5 }).await, RunOutcome::Completed(5));
        assert!(!guard.is_running());
    }

    #[tokio::test]
    async fn periodic_task_skips_overlapping_ticks_and_stops() {
        let guard = OverlapGuard::new();
        let started = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);

        let counter = Arc::clone(&started);
        let handle = spawn_periodic(
            "slow",
            Duration::from_millis(10),
            guard.clone(),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            },
            rx,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(guard.is_running());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
