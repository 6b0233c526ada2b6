//! Host diagnostics via `tracing`.
//!
//! Filtered by `NPMHOST_LOG` (e.g. `NPMHOST_LOG=npmhost_runtime=debug`),
//! written to stderr so the guest's stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "NPMHOST_LOG";

pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
