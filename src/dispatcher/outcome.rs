//! Caller-visible task outcomes.
//!
//! # Responsibilities
//! - Represent the single terminal result of a submission
//! - Keep task errors distinct from timeouts
//! - Turn a captured panic payload into a readable failure

use std::any::Any;
use std::fmt;

/// Lifecycle state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for an admission slot.
    Pending,
    /// Launched and racing the timer.
    Running,
    /// Finished successfully before the deadline.
    Completed,
    /// Deadline passed first. The unit may still be running.
    TimedOut,
    /// The task returned an error or panicked.
    Failed,
}

impl TaskState {
    /// Terminal states never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::TimedOut | TaskState::Failed
        )
    }
}

/// Why a task failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure<E> {
    /// The task's own error, passed through untouched.
    Error(E),
    /// The task panicked; carries the panic message when one was available.
    Panicked(String),
}

impl<E: fmt::Display> fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(e) => write!(f, "task failed: {}", e),
            TaskFailure::Panicked(msg) => write!(f, "task panicked: {}", msg),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for TaskFailure<E> {}

/// The result of one submission, produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Completed(T),
    TimedOut,
    Failed(TaskFailure<E>),
}

impl<T, E> Outcome<T, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Outcome::TimedOut)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// The terminal state this outcome corresponds to.
    pub fn state(&self) -> TaskState {
        match self {
            Outcome::Completed(_) => TaskState::Completed,
            Outcome::TimedOut => TaskState::TimedOut,
            Outcome::Failed(_) => TaskState::Failed,
        }
    }

    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::TimedOut => "timed_out",
            Outcome::Failed(_) => "failed",
        }
    }

    /// Take the completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Take the task's own error, if it failed with one.
    pub fn error(self) -> Option<E> {
        match self {
            Outcome::Failed(TaskFailure::Error(e)) => Some(e),
            _ => None,
        }
    }
}

/// Extract a message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_states_are_terminal() {
        let outcomes: Vec<Outcome<u8, String>> = vec![
            Outcome::Completed(1),
            Outcome::TimedOut,
            Outcome::Failed(TaskFailure::Error("boom".into())),
        ];
        for outcome in &outcomes {
            assert!(outcome.state().is_terminal());
        }
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn accessors_pick_the_right_variant() {
        let done: Outcome<u8, String> = Outcome::Completed(7);
        assert!(done.is_completed());
        assert_eq!(done.completed(), Some(7));

        let failed: Outcome<u8, String> = Outcome::Failed(TaskFailure::Error("bad".into()));
        assert!(failed.is_failed());
        assert_eq!(failed.label(), "failed");
        assert_eq!(failed.error(), Some("bad".to_string()));

        let timed_out: Outcome<u8, String> = Outcome::TimedOut;
        assert!(timed_out.is_timed_out());
        assert_eq!(timed_out.error(), None);
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u32)), "non-string panic payload");
    }

    #[test]
    fn failure_display() {
        let failure: TaskFailure<String> = TaskFailure::Error("disk full".into());
        assert_eq!(failure.to_string(), "task failed: disk full");
        let panicked: TaskFailure<String> = TaskFailure::Panicked("oops".into());
        assert_eq!(panicked.to_string(), "task panicked: oops");
    }
}
