//! Two-phase tasks: attempt, then commit.
//!
//! # Responsibilities
//! - Run the attempt phase under the dispatcher timeout
//! - Hand off to the commit phase only if the caller is still waiting
//! - Never deliver a result after `TimedOut` has been reported
//!
//! # State Transitions
//! ```text
//! Attempting → Committed: attempt finished first, commit runs
//! Attempting → Abandoned: timer fired or caller left first, commit never runs
//! ```
//!
//! # Design Decisions
//! - The handoff is a single compare-and-swap on each side; whoever
//!   swaps first wins and the loser backs off without blocking
//! - A buffered handoff cannot tell "caller waiting" from "caller gone",
//!   so none is used here
//! - Once committed, the caller waits for the commit phase to finish
//! - A caller that drops its future abandons the handoff the same way the
//!   timer does

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::time;
use tracing::Instrument;

use super::admission::AdmissionPermit;
use super::bounded::{settle, settled, Completion, Dispatcher};
use super::error::DispatchError;
use super::outcome::Outcome;
use super::task::TaskContext;

const ATTEMPTING: u8 = 0;
const COMMITTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Single-winner handoff between an attempt phase and the caller's timer.
#[derive(Debug, Default)]
pub(crate) struct Handoff {
    state: AtomicU8,
}

impl Handoff {
    /// Attempt side: claim the right to commit.
    pub(crate) fn claim(&self) -> bool {
        self.state
            .compare_exchange(ATTEMPTING, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Caller side: give up before the attempt finishes.
    pub(crate) fn abandon(&self) -> bool {
        self.state
            .compare_exchange(ATTEMPTING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Abandons the handoff if the caller's future is dropped while it waits.
///
/// Once the caller has settled the handoff is already decided, so the
/// abandon on drop is a no-op.
struct AbandonOnDrop(Arc<Handoff>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if self.0.abandon() {
            tracing::debug!("Caller dropped during attempt, commit abandoned");
        }
    }
}

impl Dispatcher {
    /// Run a task split into `attempt` and `commit`.
    ///
    /// The timeout covers the attempt only. If it fires first the caller
    /// gets `TimedOut` and `commit` is never called. If the attempt wins,
    /// the caller waits for `commit` and reports its result.
    pub async fn submit_two_phase<A, AFut, C, CFut, P, T, E>(
        &self,
        attempt: A,
        commit: C,
    ) -> Result<Outcome<T, E>, DispatchError>
    where
        A: FnOnce(TaskContext) -> AFut,
        AFut: Future<Output = Result<P, E>> + Send + 'static,
        C: FnOnce(P) -> CFut + Send + 'static,
        CFut: Future<Output = Result<T, E>> + Send + 'static,
        P: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let permit = self.admit().await?;
        Ok(self.launch_two_phase(permit, attempt, commit).await)
    }

    async fn launch_two_phase<A, AFut, C, CFut, P, T, E>(
        &self,
        permit: AdmissionPermit,
        attempt: A,
        commit: C,
    ) -> Outcome<T, E>
    where
        A: FnOnce(TaskContext) -> AFut,
        AFut: Future<Output = Result<P, E>> + Send + 'static,
        C: FnOnce(P) -> CFut + Send + 'static,
        CFut: Future<Output = Result<T, E>> + Send + 'static,
        P: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let ctx = TaskContext::new();
        let id = ctx.id();
        let token = ctx.token().clone();
        let live = self.inner.stats.track();
        let attempt = match panic::catch_unwind(AssertUnwindSafe(|| attempt(ctx))) {
            Ok(attempt) => attempt,
            Err(payload) => return self.unlaunched(id, payload),
        };
        let stats = self.inner.stats.clone();
        let handoff = Arc::new(Handoff::default());
        let unit_handoff = Arc::clone(&handoff);
        let (slot_tx, mut slot_rx) = oneshot::channel::<Completion<T, E>>();
        let cancel_guard = self.cancel_on_drop(&token);
        let _abandon_guard = AbandonOnDrop(Arc::clone(&handoff));

        tokio::spawn(
            async move {
                // Permit drops before the live guard, so slots are free once idle waiters wake.
                let _live = live;
                let _permit = permit;
                let attempted = AssertUnwindSafe(attempt).catch_unwind().await;

                if !unit_handoff.claim() {
                    tracing::debug!("Attempt finished after the caller gave up, commit abandoned");
                    stats.record_abandoned_commit();
                    return;
                }

                let completion = match attempted {
                    Ok(Ok(prepared)) => {
                        AssertUnwindSafe(async move { commit(prepared).await })
                            .catch_unwind()
                            .await
                    }
                    Ok(Err(e)) => Ok(Err(e)),
                    Err(payload) => Err(payload),
                };
                if slot_tx.send(completion).is_err() {
                    tracing::warn!("Caller dropped before commit result was delivered");
                }
            }
            .instrument(tracing::debug_span!("two_phase_task", task_id = %id)),
        );

        let outcome = match time::timeout(self.inner.timeout, &mut slot_rx).await {
            Ok(received) => settle(received),
            Err(_) if handoff.abandon() => {
                self.expire(&token);
                Outcome::TimedOut
            }
            // The attempt claimed the handoff just before the timer fired.
            Err(_) => settle(slot_rx.await),
        };
        settled(cancel_guard);

        self.conclude(id, outcome)
    }
}
