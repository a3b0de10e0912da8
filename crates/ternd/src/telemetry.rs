//! Tracing initialization for `ternd`.
//!
//! Logs go to stderr so that command output on stdout stays clean. The
//! filter comes from `RUST_LOG` when set, otherwise from `[log] level`.

use tracing_subscriber::EnvFilter;

/// Build the filter for a configured level.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Initialize the subscriber.
///
/// Call this once at startup, before any `tracing` events are emitted.
pub fn init(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .init();
}
