//! Dispatcher errors.
//!
//! These are failures of the dispatcher itself. A task's own failure is
//! reported through [`Outcome::Failed`](super::Outcome::Failed) instead.

use thiserror::Error;

/// Error type for dispatcher operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The concurrency limit was zero.
    #[error("concurrency limit must be positive")]
    InvalidLimit,
    /// The dispatcher no longer accepts submissions.
    #[error("dispatcher is closed")]
    Closed,
    /// No admission slot was free for a non-blocking submission.
    #[error("no admission slot available")]
    Saturated,
}

impl DispatchError {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchError::InvalidLimit => "invalid_limit",
            DispatchError::Closed => "closed",
            DispatchError::Saturated => "saturated",
        }
    }
}
