//! Probes and their reports.

use serde::Serialize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use super::tasks::{cooperative_sleep, jittered, stubborn_sleep, ConcurrencyGauge};
use crate::dispatcher::{DispatchError, Dispatcher, Outcome};

type ProbeOutcome = Result<Outcome<(), Infallible>, DispatchError>;

/// Outcome counts for a batch of submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
}

impl Tally {
    pub fn add<T, E>(&mut self, outcome: &Outcome<T, E>) {
        match outcome {
            Outcome::Completed(_) => self.completed += 1,
            Outcome::TimedOut => self.timed_out += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.completed + self.timed_out + self.failed
    }
}

/// Drain a batch of concurrent submissions into a tally.
async fn collect(mut submissions: JoinSet<ProbeOutcome>) -> Result<Tally, DispatchError> {
    let mut tally = Tally::default();
    while let Some(joined) = submissions.join_next().await {
        match joined {
            Ok(submitted) => tally.add(&submitted?),
            Err(e) => {
                tracing::error!(error = %e, "Submitting task aborted");
                tally.failed += 1;
            }
        }
    }
    Ok(tally)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[derive(Debug, Clone)]
pub struct LeakCheckParams {
    pub tasks: usize,
    pub task_duration: Duration,
    pub grace: Duration,
    /// Tasks stop at the cancellation token instead of sleeping it out.
    pub cooperative: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeakReport {
    pub tasks: usize,
    #[serde(flatten)]
    pub outcomes: Tally,
    pub live_before: u64,
    pub live_after_grace: u64,
    pub leaked: u64,
    pub elapsed_ms: u64,
}

/// Submit many tasks that outlast the timeout and check that every unit
/// they launched has finished once the grace period is over.
pub async fn leak_check(
    dispatcher: &Dispatcher,
    params: &LeakCheckParams,
) -> Result<LeakReport, DispatchError> {
    let start = Instant::now();
    let live_before = dispatcher.live_tasks();
    let mut submissions = JoinSet::new();

    for _ in 0..params.tasks {
        let dispatcher = dispatcher.clone();
        let duration = params.task_duration;
        let cooperative = params.cooperative;
        submissions.spawn(async move {
            dispatcher
                .submit(move |ctx| async move {
                    if cooperative {
                        cooperative_sleep(ctx, duration).await
                    } else {
                        stubborn_sleep(duration).await
                    }
                })
                .await
        });
    }

    let outcomes = collect(submissions).await?;
    if !dispatcher.wait_idle(params.grace).await {
        tracing::warn!(
            live_tasks = dispatcher.live_tasks(),
            "Units still running after grace period"
        );
    }
    let live_after_grace = dispatcher.live_tasks();

    Ok(LeakReport {
        tasks: params.tasks,
        outcomes,
        live_before,
        live_after_grace,
        leaked: live_after_grace.saturating_sub(live_before),
        elapsed_ms: elapsed_ms(start),
    })
}

#[derive(Debug, Clone)]
pub struct TwoPhaseParams {
    pub tasks: usize,
    pub attempt_duration: Duration,
    pub grace: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct TwoPhaseReport {
    pub tasks: usize,
    #[serde(flatten)]
    pub outcomes: Tally,
    pub commits_executed: u64,
    pub commits_abandoned: u64,
    pub elapsed_ms: u64,
}

/// Run two-phase tasks and count how many commit phases actually ran.
///
/// Commits executed must equal completed outcomes: a timed-out task
/// never commits.
pub async fn two_phase(
    dispatcher: &Dispatcher,
    params: &TwoPhaseParams,
) -> Result<TwoPhaseReport, DispatchError> {
    let start = Instant::now();
    let abandoned_before = dispatcher.stats().abandoned_commits;
    let commits = Arc::new(AtomicU64::new(0));
    let mut submissions = JoinSet::new();

    for _ in 0..params.tasks {
        let dispatcher = dispatcher.clone();
        let commits = Arc::clone(&commits);
        let duration = params.attempt_duration;
        submissions.spawn(async move {
            dispatcher
                .submit_two_phase(
                    move |_| stubborn_sleep(duration),
                    move |()| async move {
                        commits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                )
                .await
        });
    }

    let outcomes = collect(submissions).await?;
    dispatcher.wait_idle(params.grace).await;

    Ok(TwoPhaseReport {
        tasks: params.tasks,
        outcomes,
        commits_executed: commits.load(Ordering::SeqCst),
        commits_abandoned: dispatcher.stats().abandoned_commits - abandoned_before,
        elapsed_ms: elapsed_ms(start),
    })
}

#[derive(Debug, Clone)]
pub struct AdmissionParams {
    pub tasks: usize,
    pub task_duration: Duration,
    pub jitter: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionReport {
    pub tasks: usize,
    pub limit: usize,
    pub peak_running: usize,
    #[serde(flatten)]
    pub outcomes: Tally,
    pub elapsed_ms: u64,
}

/// Submit every task at once and record the highest concurrency reached.
pub async fn admission(
    dispatcher: &Dispatcher,
    params: &AdmissionParams,
) -> Result<AdmissionReport, DispatchError> {
    let start = Instant::now();
    let gauge = Arc::new(ConcurrencyGauge::default());
    let mut submissions = JoinSet::new();

    for _ in 0..params.tasks {
        let dispatcher = dispatcher.clone();
        let gauge = Arc::clone(&gauge);
        let duration = jittered(params.task_duration, params.jitter);
        submissions.spawn(async move {
            dispatcher
                .submit(move |_| gauge.occupy(duration))
                .await
        });
    }

    let outcomes = collect(submissions).await?;

    Ok(AdmissionReport {
        tasks: params.tasks,
        limit: dispatcher.limit(),
        peak_running: gauge.peak(),
        outcomes,
        elapsed_ms: elapsed_ms(start),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FastPathReport {
    pub outcome: &'static str,
    pub latency_us: u64,
    pub timeout_ms: u64,
}

/// Submit one task that finishes immediately.
pub async fn fast_path(dispatcher: &Dispatcher) -> Result<FastPathReport, DispatchError> {
    let start = Instant::now();
    let outcome = dispatcher
        .submit(|_| async { Ok::<_, Infallible>(()) })
        .await?;

    Ok(FastPathReport {
        outcome: outcome.label(),
        latency_us: start.elapsed().as_micros() as u64,
        timeout_ms: dispatcher.timeout().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_each_variant() {
        let mut tally = Tally::default();
        tally.add::<(), ()>(&Outcome::Completed(()));
        tally.add::<(), ()>(&Outcome::TimedOut);
        assert_eq!(tally.total(), 2);
        assert_eq!(tally.timed_out, 1);
    }

    #[tokio::test]
    async fn fast_path_reports_completed() {
        let dispatcher = Dispatcher::new(1, Duration::from_secs(1)).unwrap();
        let report = fast_path(&dispatcher).await.unwrap();
        assert_eq!(report.outcome, "completed");
        assert_eq!(report.timeout_ms, 1000);
    }
}
