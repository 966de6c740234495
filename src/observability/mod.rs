//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher and units produce:
//!     → logging.rs (structured log events, one span per task)
//!     → metrics.rs (outcome counters, admission wait, live units)
//!
//! Consumers:
//!     → stderr log output
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields rather than formatted messages
//! - Task ID flows through every event of a unit via its span
//! - Metrics are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
