//! Live-unit tracking and outcome counters.
//!
//! # Responsibilities
//! - Count launched units that have not finished yet
//! - Record peak concurrency and per-outcome totals
//! - Wake idle waiters when the last unit finishes

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::outcome::Outcome;
use crate::observability::metrics;

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
    abandoned_commits: AtomicU64,
    live: AtomicU64,
    peak_live: AtomicU64,
}

/// Point-in-time copy of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub admitted: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub abandoned_commits: u64,
    pub live: u64,
    pub peak_live: u64,
}

/// Shared by the dispatcher and every unit it launches.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatsTracker {
    counters: Arc<Counters>,
    idle: Arc<Notify>,
}

impl StatsTracker {
    /// Record a newly launched unit. Returns a guard that ends it on drop.
    pub(crate) fn track(&self) -> LiveGuard {
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_live.fetch_max(live, Ordering::Relaxed);
        metrics::record_task_started();

        LiveGuard {
            counters: Arc::clone(&self.counters),
            idle: Arc::clone(&self.idle),
        }
    }

    pub(crate) fn record<T, E>(&self, outcome: &Outcome<T, E>) {
        let counter = match outcome {
            Outcome::Completed(_) => &self.counters.completed,
            Outcome::TimedOut => &self.counters.timed_out,
            Outcome::Failed(_) => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::record_outcome(outcome.label());
    }

    pub(crate) fn record_abandoned_commit(&self) {
        self.counters.abandoned_commits.fetch_add(1, Ordering::Relaxed);
        metrics::record_commit_abandoned();
    }

    pub(crate) fn live(&self) -> u64 {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            abandoned_commits: self.counters.abandoned_commits.load(Ordering::Relaxed),
            live: self.live(),
            peak_live: self.counters.peak_live.load(Ordering::Relaxed),
        }
    }

    /// Wait until no launched unit is still running.
    pub(crate) async fn wait_idle(&self) {
        loop {
            // Register before checking so a wakeup between the two is not lost.
            let notified = self.idle.notified();
            if self.live() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Held by a running unit. Decrements the live count when dropped.
#[derive(Debug)]
pub(crate) struct LiveGuard {
    counters: Arc<Counters>,
    idle: Arc<Notify>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let live = self.counters.live.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_task_finished();
        if live == 0 {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::outcome::TaskFailure;
    use std::time::Duration;

    #[test]
    fn tracker_counts_live_and_peak() {
        let tracker = StatsTracker::default();
        assert_eq!(tracker.live(), 0);

        let guard1 = tracker.track();
        let guard2 = tracker.track();
        assert_eq!(tracker.live(), 2);

        drop(guard1);
        assert_eq!(tracker.live(), 1);
        drop(guard2);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.live, 0);
        assert_eq!(snapshot.peak_live, 2);
        assert_eq!(snapshot.admitted, 2);
    }

    #[test]
    fn outcomes_are_tallied() {
        let tracker = StatsTracker::default();
        tracker.record::<(), ()>(&Outcome::Completed(()));
        tracker.record::<(), ()>(&Outcome::TimedOut);
        tracker.record::<(), ()>(&Outcome::TimedOut);
        tracker.record::<(), ()>(&Outcome::Failed(TaskFailure::Error(())));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.timed_out, 2);
        assert_eq!(snapshot.failed, 1);
    }

    #[tokio::test]
    async fn wait_idle_returns_after_last_guard() {
        let tracker = StatsTracker::default();
        let guard = tracker.track();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        tokio::time::timeout(Duration::from_secs(1), tracker.wait_idle())
            .await
            .expect("tracker should become idle");
        assert_eq!(tracker.live(), 0);
    }
}
