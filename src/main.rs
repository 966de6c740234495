//! task-dispatcher probe runner.
//!
//! Loads configuration, builds a dispatcher and runs one probe against it,
//! printing the report as JSON on stdout.
//!
//! ```text
//! task-dispatcher --limit 1000 --timeout-ms 1 leak-check --tasks 1000 --task-ms 1000
//! task-dispatcher --timeout-ms 1 two-phase --attempt-ms 1000
//! task-dispatcher --limit 3 admission --tasks 50 --task-ms 10
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use task_dispatcher::config::{load_config, validate_config, Config, ConfigError};
use task_dispatcher::observability::{logging, metrics};
use task_dispatcher::workload::{self, AdmissionParams, LeakCheckParams, TwoPhaseParams};
use task_dispatcher::Dispatcher;

#[derive(Parser)]
#[command(name = "task-dispatcher")]
#[command(about = "Run probes against a bounded task dispatcher", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override dispatcher.concurrency_limit
    #[arg(short, long)]
    limit: Option<usize>,

    /// Override dispatcher.timeout_ms
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    probe: Probe,
}

#[derive(Subcommand)]
enum Probe {
    /// Time out many slow tasks and check that no unit is left running
    LeakCheck {
        #[arg(long, default_value_t = 1000)]
        tasks: usize,
        #[arg(long, default_value_t = 1000)]
        task_ms: u64,
        #[arg(long, default_value_t = 2000)]
        grace_ms: u64,
        /// Tasks stop when cancelled instead of sleeping it out
        #[arg(long)]
        cooperative: bool,
    },
    /// Time out slow attempts and check that no commit ran
    TwoPhase {
        #[arg(long, default_value_t = 1000)]
        tasks: usize,
        #[arg(long, default_value_t = 1000)]
        attempt_ms: u64,
        #[arg(long, default_value_t = 3000)]
        grace_ms: u64,
    },
    /// Flood the dispatcher and record peak concurrency
    Admission {
        #[arg(long, default_value_t = 50)]
        tasks: usize,
        #[arg(long, default_value_t = 10)]
        task_ms: u64,
        #[arg(long, default_value_t = 0)]
        jitter_ms: u64,
    },
    /// Submit one instant task and measure latency
    FastPath,
}

fn resolve_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(limit) = cli.limit {
        config.dispatcher.concurrency_limit = limit;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.dispatcher.timeout_ms = timeout_ms;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn print_report(report: &impl Serialize) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability);

    tracing::info!(
        concurrency_limit = config.dispatcher.concurrency_limit,
        timeout_ms = config.dispatcher.timeout_ms,
        cancel_on_timeout = config.dispatcher.cancel_on_timeout,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let dispatcher = Dispatcher::from_config(&config.dispatcher)?;

    match cli.probe {
        Probe::LeakCheck {
            tasks,
            task_ms,
            grace_ms,
            cooperative,
        } => {
            let params = LeakCheckParams {
                tasks,
                task_duration: Duration::from_millis(task_ms),
                grace: Duration::from_millis(grace_ms),
                cooperative,
            };
            print_report(&workload::leak_check(&dispatcher, &params).await?)?;
        }
        Probe::TwoPhase {
            tasks,
            attempt_ms,
            grace_ms,
        } => {
            let params = TwoPhaseParams {
                tasks,
                attempt_duration: Duration::from_millis(attempt_ms),
                grace: Duration::from_millis(grace_ms),
            };
            print_report(&workload::two_phase(&dispatcher, &params).await?)?;
        }
        Probe::Admission {
            tasks,
            task_ms,
            jitter_ms,
        } => {
            let params = AdmissionParams {
                tasks,
                task_duration: Duration::from_millis(task_ms),
                jitter: Duration::from_millis(jitter_ms),
            };
            print_report(&workload::admission(&dispatcher, &params).await?)?;
        }
        Probe::FastPath => {
            print_report(&workload::fast_path(&dispatcher).await?)?;
        }
    }

    dispatcher.close();
    tracing::info!(stats = ?dispatcher.stats(), "Probe finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let config = resolve_config(&cli(&[
            "task-dispatcher",
            "--limit",
            "3",
            "--timeout-ms",
            "7",
            "fast-path",
        ]))
        .unwrap();
        assert_eq!(config.dispatcher.concurrency_limit, 3);
        assert_eq!(config.dispatcher.timeout_ms, 7);
    }

    #[test]
    fn bad_metrics_address_is_rejected_before_startup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[observability]\nmetrics_enabled = true\nmetrics_address = \"nowhere\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let err = resolve_config(&cli(&["task-dispatcher", "--config", path, "fast-path"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn zero_limit_override_is_rejected() {
        let err = resolve_config(&cli(&["task-dispatcher", "--limit", "0", "fast-path"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
