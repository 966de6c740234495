//! Shared utilities for integration tests.

use std::convert::Infallible;
use std::time::Duration;

use task_dispatcher::Dispatcher;

/// Build a dispatcher or fail the test.
pub fn dispatcher(limit: usize, timeout_ms: u64) -> Dispatcher {
    Dispatcher::new(limit, Duration::from_millis(timeout_ms)).expect("valid dispatcher")
}

/// A task body that finishes after `ms` milliseconds.
#[allow(dead_code)]
pub async fn sleep_ok(ms: u64) -> Result<(), Infallible> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(())
}
