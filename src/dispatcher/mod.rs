//! Dispatcher subsystem.
//!
//! # Data Flow
//! ```text
//! Caller submits task:
//!     → admission.rs (await a slot; backpressure on the caller)
//!     → task.rs (assign TaskId, hand out CancellationToken)
//!     → bounded.rs (spawn unit, race completion slot against timer)
//!     → outcome.rs (exactly one Outcome back to the caller)
//!
//! Two-phase task:
//!     → two_phase.rs (attempt → handoff CAS → commit, or abandon)
//!
//! Per-task states:
//!     Pending → Running → Completed | TimedOut | Failed
//! ```
//!
//! # Design Decisions
//! - Completion travels through a oneshot slot; sending never blocks, so a
//!   unit that outlives its caller still terminates
//! - Timeout cancels the task's token; stopping is the task's job
//! - A timed-out unit keeps its admission slot until it actually finishes
//! - Misconfiguration is rejected at construction, not at submission

pub mod admission;
pub mod bounded;
pub mod error;
pub mod outcome;
pub mod stats;
pub mod task;
pub mod two_phase;

pub use bounded::Dispatcher;
pub use error::DispatchError;
pub use outcome::{Outcome, TaskFailure, TaskState};
pub use stats::StatsSnapshot;
pub use task::{TaskContext, TaskId};
