//! Bounded dispatcher with timeout guard.
//!
//! # Responsibilities
//! - Admit at most `limit` units at once, blocking submitters beyond that
//! - Launch each task on its own tokio task
//! - Race the completion slot against a single timer
//! - Release the slot when the unit finishes, whatever the outcome
//!
//! # Design Decisions
//! - Completion slot is a oneshot channel: the unit's send never waits for
//!   a reader, so a timed-out unit still terminates
//! - One `tokio::time::timeout` per submission, no polling
//! - Panics inside a task, or in the closure that builds it, are caught and
//!   reported as failures
//! - Dropping the caller's future counts as giving up: the token is
//!   cancelled just as on timeout

use std::any::Any;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::time;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

use super::admission::{AdmissionGate, AdmissionPermit};
use super::error::DispatchError;
use super::outcome::{panic_message, Outcome, TaskFailure, TaskState};
use super::stats::{StatsSnapshot, StatsTracker};
use super::task::{TaskContext, TaskId};
use crate::config::DispatcherConfig;
use crate::observability::metrics;

/// What a unit deposits in its completion slot.
pub(super) type Completion<T, E> = thread::Result<Result<T, E>>;

/// Runs tasks under a concurrency cap and a per-task deadline.
///
/// Cloning is cheap; clones share the same admission gate and counters.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pub(super) inner: Arc<Inner>,
}

#[derive(Debug)]
pub(super) struct Inner {
    pub(super) gate: AdmissionGate,
    pub(super) timeout: Duration,
    pub(super) cancel_on_timeout: bool,
    pub(super) stats: StatsTracker,
}

impl Dispatcher {
    /// Create a dispatcher that cancels task tokens on timeout.
    ///
    /// Fails with [`DispatchError::InvalidLimit`] when `limit` is zero.
    pub fn new(limit: usize, timeout: Duration) -> Result<Self, DispatchError> {
        Self::build(limit, timeout, true)
    }

    pub fn from_config(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        Self::build(
            config.concurrency_limit,
            config.timeout(),
            config.cancel_on_timeout,
        )
    }

    fn build(
        limit: usize,
        timeout: Duration,
        cancel_on_timeout: bool,
    ) -> Result<Self, DispatchError> {
        let limit = NonZeroUsize::new(limit).ok_or(DispatchError::InvalidLimit)?;

        tracing::debug!(
            concurrency_limit = limit.get(),
            timeout_ms = timeout.as_millis() as u64,
            cancel_on_timeout,
            "Dispatcher created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                gate: AdmissionGate::new(limit),
                timeout,
                cancel_on_timeout,
                stats: StatsTracker::default(),
            }),
        })
    }

    /// Run `task`, waiting for a slot first if the limit is reached.
    ///
    /// Returns within the timeout once admitted. `Err` only when the
    /// dispatcher is closed.
    pub async fn submit<F, Fut, T, E>(&self, task: F) -> Result<Outcome<T, E>, DispatchError>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let permit = self.admit().await?;
        Ok(self.launch(permit, task).await)
    }

    /// Like [`submit`](Self::submit), but fails with
    /// [`DispatchError::Saturated`] instead of waiting for a slot.
    pub async fn try_submit<F, Fut, T, E>(
        &self,
        task: F,
    ) -> Result<Outcome<T, E>, DispatchError>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let permit = self.try_admit()?;
        Ok(self.launch(permit, task).await)
    }

    async fn launch<F, Fut, T, E>(&self, permit: AdmissionPermit, task: F) -> Outcome<T, E>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let ctx = TaskContext::new();
        let id = ctx.id();
        let token = ctx.token().clone();
        let live = self.inner.stats.track();
        let work = match panic::catch_unwind(AssertUnwindSafe(|| task(ctx))) {
            Ok(work) => work,
            Err(payload) => return self.unlaunched(id, payload),
        };
        let (slot_tx, slot_rx) = oneshot::channel::<Completion<T, E>>();
        tracing::trace!(task_id = %id, state = ?TaskState::Running, "Task launched");
        let cancel_guard = self.cancel_on_drop(&token);

        tokio::spawn(
            async move {
                // Permit drops before the live guard, so slots are free once idle waiters wake.
                let _live = live;
                let _permit = permit;
                let completion = AssertUnwindSafe(work).catch_unwind().await;
                if slot_tx.send(completion).is_err() {
                    tracing::debug!("Late completion discarded");
                }
            }
            .instrument(tracing::debug_span!("task", task_id = %id)),
        );

        let outcome = match time::timeout(self.inner.timeout, slot_rx).await {
            Ok(received) => settle(received),
            Err(_) => {
                self.expire(&token);
                Outcome::TimedOut
            }
        };
        settled(cancel_guard);

        self.conclude(id, outcome)
    }

    /// The task closure panicked before it produced a future, so no unit runs.
    pub(super) fn unlaunched<T, E>(
        &self,
        id: TaskId,
        payload: Box<dyn Any + Send>,
    ) -> Outcome<T, E> {
        self.conclude(
            id,
            Outcome::Failed(TaskFailure::Panicked(panic_message(payload))),
        )
    }

    /// Cancels the token if the caller's future is dropped before it settles.
    pub(super) fn cancel_on_drop(&self, token: &CancellationToken) -> Option<DropGuard> {
        self.inner
            .cancel_on_timeout
            .then(|| token.clone().drop_guard())
    }

    pub(super) async fn admit(&self) -> Result<AdmissionPermit, DispatchError> {
        let wait_start = Instant::now();
        tracing::trace!(state = ?TaskState::Pending, "Waiting for an admission slot");
        match self.inner.gate.acquire().await {
            Ok(permit) => {
                metrics::record_admission_wait(wait_start.elapsed());
                Ok(permit)
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    pub(super) fn try_admit(&self) -> Result<AdmissionPermit, DispatchError> {
        self.inner.gate.try_acquire().map_err(|e| self.reject(e))
    }

    fn reject(&self, error: DispatchError) -> DispatchError {
        tracing::debug!(reason = error.label(), "Submission rejected");
        metrics::record_rejected(error.label());
        error
    }

    /// Caller gave up; ask the task to stop if configured to.
    pub(super) fn expire(&self, token: &CancellationToken) {
        if self.inner.cancel_on_timeout {
            token.cancel();
        }
    }

    pub(super) fn conclude<T, E>(&self, id: TaskId, outcome: Outcome<T, E>) -> Outcome<T, E> {
        self.inner.stats.record(&outcome);
        match &outcome {
            Outcome::Completed(_) => {
                tracing::debug!(task_id = %id, state = ?outcome.state(), "Task completed")
            }
            Outcome::TimedOut => tracing::debug!(
                task_id = %id,
                state = ?outcome.state(),
                timeout_ms = self.inner.timeout.as_millis() as u64,
                "Task timed out"
            ),
            Outcome::Failed(TaskFailure::Error(_)) => {
                tracing::warn!(task_id = %id, "Task returned an error")
            }
            Outcome::Failed(TaskFailure::Panicked(msg)) => {
                tracing::error!(task_id = %id, panic = %msg, "Task panicked")
            }
        }
        outcome
    }

    /// Stop accepting submissions. In-flight units keep running.
    pub fn close(&self) {
        self.inner.gate.close();
        tracing::info!(live_tasks = self.live_tasks(), "Dispatcher closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.gate.is_closed()
    }

    /// Wait until every launched unit has finished, timed-out ones included.
    ///
    /// Returns `false` if units are still running when `grace` elapses.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        time::timeout(grace, self.inner.stats.wait_idle())
            .await
            .is_ok()
    }

    /// Units launched and not yet finished.
    pub fn live_tasks(&self) -> u64 {
        self.inner.stats.live()
    }

    pub fn available_slots(&self) -> usize {
        self.inner.gate.available()
    }

    pub fn limit(&self) -> usize {
        self.inner.gate.limit()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

/// The caller is about to see an outcome; keep the token as it is.
pub(super) fn settled(cancel_guard: Option<DropGuard>) {
    if let Some(guard) = cancel_guard {
        let _ = guard.disarm();
    }
}

/// Map whatever arrived in the completion slot to an outcome.
pub(super) fn settle<T, E>(
    received: Result<Completion<T, E>, oneshot::error::RecvError>,
) -> Outcome<T, E> {
    match received {
        Ok(Ok(Ok(value))) => Outcome::Completed(value),
        Ok(Ok(Err(error))) => Outcome::Failed(TaskFailure::Error(error)),
        Ok(Err(payload)) => Outcome::Failed(TaskFailure::Panicked(panic_message(payload))),
        // Only happens if the runtime drops the unit before it reports.
        Err(_) => Outcome::Failed(TaskFailure::Panicked(
            "unit dropped before reporting".to_string(),
        )),
    }
}
