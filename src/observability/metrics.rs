//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatcher_outcomes_total` (counter): outcomes by `outcome` label
//! - `dispatcher_rejections_total` (counter): refused submissions by `reason`
//! - `dispatcher_admission_wait_seconds` (histogram): time spent waiting for a slot
//! - `dispatcher_live_tasks` (gauge): launched units not yet finished
//! - `dispatcher_commits_abandoned_total` (counter): two-phase commits skipped after timeout

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_outcome(outcome: &'static str) {
    ::metrics::counter!("dispatcher_outcomes_total", "outcome" => outcome).increment(1);
}

pub fn record_rejected(reason: &'static str) {
    ::metrics::counter!("dispatcher_rejections_total", "reason" => reason).increment(1);
}

pub fn record_admission_wait(wait: Duration) {
    ::metrics::histogram!("dispatcher_admission_wait_seconds").record(wait.as_secs_f64());
}

pub fn record_task_started() {
    ::metrics::gauge!("dispatcher_live_tasks").increment(1.0);
}

pub fn record_task_finished() {
    ::metrics::gauge!("dispatcher_live_tasks").decrement(1.0);
}

pub fn record_commit_abandoned() {
    ::metrics::counter!("dispatcher_commits_abandoned_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_gauge_follows_start_and_finish() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            record_task_started();
            record_task_started();
            record_task_started();
            record_task_finished();
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("dispatcher_live_tasks 2"),
            "unexpected exposition:\n{rendered}"
        );
    }
}
