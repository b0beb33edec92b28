//! Periodic task supervision with bounded exponential backoff.
//!
//! [`TimedSupervisorTask`] drives a recurring async task (typically
//! [`RemoteRegistryCache::fetch_registry`](crate::cache::RemoteRegistryCache::fetch_registry))
//! on a fixed interval and degrades gracefully when the task misbehaves:
//!
//! - **Failure or timeout** doubles the effective delay, up to
//!   `interval * backoff_bound`. A struggling peer gets hammered less, not
//!   more.
//! - **Success** resets the delay to the base interval.
//! - **Per-invocation timeout** equals the current effective delay, so a
//!   backed-off task also gets more time to complete.
//! - **Direct handoff**: worker slots are a semaphore. A tick that finds no
//!   free slot is skipped and counted, never queued. Work must not pile up
//!   behind a slow peer.
//!
//! Shutdown is cooperative through a `watch` channel; the loop exits at the
//! next tick boundary.

use crate::metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Double `current`, saturating at `max`.
fn bounded_double(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Supervises one periodic async task.
pub struct TimedSupervisorTask<F> {
    name: String,
    interval: Duration,
    /// Ceiling for the effective delay (`interval * backoff_bound`).
    max_delay: Duration,
    /// Worker slots. May be shared between supervisors to bound total
    /// concurrency across tasks.
    workers: Arc<Semaphore>,
    task: F,
}

impl<F, Fut> TimedSupervisorTask<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    /// Create a supervisor with its own worker slots.
    ///
    /// `task` is invoked once per tick and reports success as `true`.
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        backoff_bound: u32,
        worker_slots: usize,
        task: F,
    ) -> Self {
        Self::with_workers(
            name,
            interval,
            backoff_bound,
            Arc::new(Semaphore::new(worker_slots)),
            task,
        )
    }

    /// Create a supervisor sharing a worker-slot pool with other tasks.
    pub fn with_workers(
        name: impl Into<String>,
        interval: Duration,
        backoff_bound: u32,
        workers: Arc<Semaphore>,
        task: F,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            max_delay: interval.saturating_mul(backoff_bound.max(1)),
            workers,
            task,
        }
    }

    /// Spawn the supervision loop. It runs until `shutdown` flips to `true`
    /// or the sender side is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            task = %self.name,
            interval = ?self.interval,
            max_delay = ?self.max_delay,
            "Starting supervised task"
        );
        let mut delay = self.interval;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let permit = match Arc::clone(&self.workers).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    // All slots busy: skip this tick outright.
                    metrics::record_supervisor_rejected(&self.name);
                    warn!(task = %self.name, "All worker slots busy, skipping run");
                    continue;
                }
            };

            let outcome = tokio::time::timeout(delay, (self.task)()).await;
            drop(permit);

            match outcome {
                Ok(true) => {
                    if delay != self.interval {
                        info!(task = %self.name, "Task recovered, resetting backoff");
                    }
                    delay = self.interval;
                    metrics::record_supervisor_run(&self.name, "success");
                }
                Ok(false) => {
                    delay = bounded_double(delay, self.max_delay);
                    metrics::record_supervisor_run(&self.name, "failure");
                    warn!(task = %self.name, next_delay = ?delay, "Task run failed, backing off");
                }
                Err(_) => {
                    delay = bounded_double(delay, self.max_delay);
                    metrics::record_supervisor_run(&self.name, "timeout");
                    warn!(task = %self.name, next_delay = ?delay, "Task run timed out, backing off");
                }
            }
            metrics::set_supervisor_delay(&self.name, delay);
        }

        debug!(task = %self.name, "Supervised task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_bounded_double_caps_at_max() {
        let max = Duration::from_secs(150);
        let mut d = Duration::from_secs(30);
        d = bounded_double(d, max);
        assert_eq!(d, Duration::from_secs(60));
        d = bounded_double(d, max);
        assert_eq!(d, Duration::from_secs(120));
        d = bounded_double(d, max);
        assert_eq!(d, Duration::from_secs(150));
        d = bounded_double(d, max);
        assert_eq!(d, Duration::from_secs(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_task_runs_on_base_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&runs);
        let task = TimedSupervisorTask::new(
            "test-steady",
            Duration::from_secs(10),
            5,
            2,
            move || {
                let counted = Arc::clone(&counted);
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    true
                }
            },
        );
        let (tx, rx) = watch::channel(false);
        let handle = task.spawn(rx);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_and_success_resets() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&runs);
        // Fail the first two runs, then succeed.
        let task = TimedSupervisorTask::new(
            "test-backoff",
            Duration::from_secs(10),
            5,
            2,
            move || {
                let n = counted.fetch_add(1, Ordering::SeqCst);
                async move { n >= 2 }
            },
        );
        let (tx, rx) = watch::channel(false);
        let handle = task.spawn(rx);

        // Run 1 at t=10 (fails, delay -> 20), run 2 at t=30 (fails, delay ->
        // 40), run 3 at t=70 (succeeds, delay resets), run 4 at t=80.
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(38)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_caps_at_interval_times_bound() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&runs);
        let task = TimedSupervisorTask::new(
            "test-cap",
            Duration::from_secs(10),
            3,
            2,
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async move { false }
            },
        );
        let (tx, rx) = watch::channel(false);
        let handle = task.spawn(rx);

        // Delays: 10, 20, 30 (cap), 30, 30... Runs at t=10, 30, 60, 90, 120.
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 5);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_with_no_free_slot_is_skipped() {
        let workers = Arc::new(Semaphore::new(1));
        let runs = Arc::new(AtomicUsize::new(0));

        // Occupies the only slot and never completes; its timeout equals
        // its delay, so the slot is held for a full period.
        let blocker = TimedSupervisorTask::with_workers(
            "test-blocker",
            Duration::from_secs(10),
            5,
            Arc::clone(&workers),
            || async {
                std::future::pending::<()>().await;
                true
            },
        );

        let counted = Arc::clone(&runs);
        let starved = TimedSupervisorTask::with_workers(
            "test-starved",
            Duration::from_secs(12),
            5,
            Arc::clone(&workers),
            move || {
                let counted = Arc::clone(&counted);
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    true
                }
            },
        );

        let (tx, rx) = watch::channel(false);
        let h1 = blocker.spawn(rx.clone());
        let h2 = starved.spawn(rx);

        // Blocker holds the slot over t=[10,20); the starved task's tick at
        // t=12 is skipped, not queued.
        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tx.send(true).unwrap();
        h1.await.unwrap();
        h2.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_the_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&runs);
        let task = TimedSupervisorTask::new(
            "test-shutdown",
            Duration::from_secs(10),
            5,
            2,
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async move { true }
            },
        );
        let (tx, rx) = watch::channel(false);
        let handle = task.spawn(rx);

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_sender_stops_the_loop() {
        let task = TimedSupervisorTask::new(
            "test-drop",
            Duration::from_secs(10),
            5,
            2,
            || async { true },
        );
        let (tx, rx) = watch::channel(false);
        let handle = task.spawn(rx);
        drop(tx);
        handle.await.unwrap();
    }
}
