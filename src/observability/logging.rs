//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Honour `RUST_LOG`, falling back to the configured level
//!
//! # Design Decisions
//! - Log output goes to stderr so reports on stdout stay parseable
//! - Initialising twice is not an error (tests may race to do it)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

pub fn init_logging(config: &ObservabilityConfig) {
    let fallback = format!("task_dispatcher={}", config.log_level.to_ascii_lowercase());

    let initialised = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    if initialised.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
