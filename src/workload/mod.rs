//! Probe workloads.
//!
//! Each probe drives a [`Dispatcher`](crate::Dispatcher) with a synthetic
//! workload and returns a serialisable report of what the caller observed.
//!
//! # Probes
//! - `leak_check`: many slow tasks, all timed out; live units must drain
//! - `two_phase`: slow attempts under a short timeout; no commit may run
//! - `admission`: many short tasks; peak concurrency must stay under the limit
//! - `fast_path`: one instant task; must not wait for the timeout

pub mod probes;
pub mod tasks;

pub use probes::{
    admission, fast_path, leak_check, two_phase, AdmissionParams, AdmissionReport,
    FastPathReport, LeakCheckParams, LeakReport, Tally, TwoPhaseParams, TwoPhaseReport,
};
