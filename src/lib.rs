//! Bounded task dispatcher with a leak-safe timeout guard.

pub mod config;
pub mod dispatcher;
pub mod observability;
pub mod workload;

pub use config::schema::Config;
pub use dispatcher::{DispatchError, Dispatcher, Outcome, TaskContext, TaskFailure};
