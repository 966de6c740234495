//! Task identity and cooperative cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Global atomic counter for task IDs.
/// Relaxed ordering is enough; IDs only need to be unique.
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier attached to a task's log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new() -> Self {
        Self(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Handed to every task when it is launched.
///
/// The token is cancelled when the caller stops waiting. A task that can
/// stop early should check it at each blocking step; one that ignores it
/// simply runs to completion and its result is dropped.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    token: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new() -> Self {
        Self {
            id: TaskId::new(),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the caller has given up on this task.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Run one blocking step unless cancelled first.
    ///
    /// Returns `None` if cancellation won; the step's future is dropped.
    pub async fn checkpoint<F: Future>(&self, step: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            out = step => Some(out),
        }
    }
}
