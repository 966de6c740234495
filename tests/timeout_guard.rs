//! Timeout guard behaviour: fast path, boundary races, leaks, errors.

use std::convert::Infallible;
use std::fmt;
use std::time::{Duration, Instant};

use task_dispatcher::workload::{self, LeakCheckParams};
use task_dispatcher::{Outcome, TaskFailure};

mod common;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QuotaExceeded {
    requested: u32,
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quota exceeded ({} requested)", self.requested)
    }
}

#[tokio::test]
async fn instant_task_does_not_wait_for_timeout() {
    let dispatcher = common::dispatcher(1, 1000);

    let start = Instant::now();
    let outcome = dispatcher
        .submit(|_| async { Ok::<_, Infallible>("ready") })
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Completed("ready"));
    assert!(
        start.elapsed() < Duration::from_millis(100),
        "fast path took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn task_error_is_distinct_from_timeout() {
    let dispatcher = common::dispatcher(1, 1000);

    let outcome = dispatcher
        .submit(|_| async { Err::<(), _>(QuotaExceeded { requested: 7 }) })
        .await
        .unwrap();

    assert!(!outcome.is_timed_out());
    assert_eq!(
        outcome,
        Outcome::Failed(TaskFailure::Error(QuotaExceeded { requested: 7 }))
    );
}

#[tokio::test]
async fn slow_task_times_out_within_deadline() {
    let dispatcher = common::dispatcher(1, 20);

    let start = Instant::now();
    let outcome = dispatcher
        .submit(|_| common::sleep_ok(2_000))
        .await
        .unwrap();

    assert!(outcome.is_timed_out());
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn zero_timeout_still_delivers_ready_results() {
    let dispatcher = common::dispatcher(1, 0);
    let outcome = dispatcher
        .submit(|_| async { Ok::<_, Infallible>(1) })
        .await
        .unwrap();
    // A zero deadline may race an instant task; either way exactly one outcome.
    assert!(outcome.is_completed() || outcome.is_timed_out());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn boundary_tasks_get_exactly_one_outcome() {
    let dispatcher = common::dispatcher(64, 5);
    let mut submissions = tokio::task::JoinSet::new();

    for _ in 0..200 {
        let dispatcher = dispatcher.clone();
        submissions.spawn(async move {
            dispatcher
                .submit(|_| common::sleep_ok(5))
                .await
                .unwrap()
        });
    }

    let mut tally = workload::Tally::default();
    while let Some(outcome) = submissions.join_next().await {
        tally.add(&outcome.unwrap());
    }

    assert_eq!(tally.total(), 200);
    assert_eq!(tally.failed, 0);

    assert!(dispatcher.wait_idle(Duration::from_secs(2)).await);
    let stats = dispatcher.stats();
    assert_eq!(stats.completed, tally.completed);
    assert_eq!(stats.timed_out, tally.timed_out);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_out_units_do_not_leak() {
    let dispatcher = common::dispatcher(1000, 1);

    let report = workload::leak_check(
        &dispatcher,
        &LeakCheckParams {
            tasks: 1000,
            task_duration: Duration::from_millis(500),
            grace: Duration::from_secs(2),
            cooperative: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes.timed_out, 1000);
    assert_eq!(report.live_after_grace, 0);
    assert_eq!(report.leaked, 0);
    assert_eq!(dispatcher.available_slots(), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cooperative_tasks_release_slots_early() {
    let dispatcher = common::dispatcher(10, 1);

    let start = Instant::now();
    let report = workload::leak_check(
        &dispatcher,
        &LeakCheckParams {
            tasks: 200,
            task_duration: Duration::from_secs(10),
            grace: Duration::from_secs(2),
            cooperative: true,
        },
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes.timed_out, 200);
    assert_eq!(report.leaked, 0);
    // Stubborn 10s tasks through 10 slots would need minutes.
    assert!(start.elapsed() < Duration::from_secs(5));
}
