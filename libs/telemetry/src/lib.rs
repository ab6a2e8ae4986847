//! Telemetry helpers for the messaging gateway: subscriber installation,
//! metric recorders on top of the `metrics` facade, and label sets.

use anyhow::Result;

mod config;
mod context;
pub mod metrics;
mod tracing_init;

pub use config::{LogFormat, TelemetryConfig};
pub use context::TelemetryLabels;
pub use metrics::{record_counter, record_histogram};
pub use tracing_init::init_tracing;

pub const MESSAGES_DISPATCHED: &str = "messages_dispatched";
pub const MESSAGES_DISPATCH_FAILED: &str = "messages_dispatch_failed";
pub const MESSAGES_FETCHED: &str = "messages_fetched";
pub const MESSAGES_RECEIVED: &str = "messages_received";
pub const MESSAGES_DUPLICATE: &str = "messages_duplicate";
pub const DISPATCH_CYCLE_MS: &str = "dispatch_cycle_ms";

/// Installs the subscriber configured from `RUST_LOG` and `LOG_FORMAT`.
pub fn install(service_name: &str) -> Result<()> {
    init_tracing(&TelemetryConfig::from_env(service_name))
}
