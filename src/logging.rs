//! Diagnostic tracing to stderr.
//!
//! Stdout carries command output and `--json` payloads; workflow step logs
//! are product output and do not depend on the filter configured here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "LARADEV_LOG";

/// Reads `LARADEV_LOG`, then `RUST_LOG`, defaulting to `warn`.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
