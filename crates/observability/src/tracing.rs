//! Tracing/logging initialization.
//!
//! Engine crates only emit `tracing` events; choosing where they go is left to
//! the embedding process.

use tracing_subscriber::EnvFilter;

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    // JSON logs + timestamps, configurable via RUST_LOG.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("info"))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Initialize tracing for tests.
///
/// Output goes through the test harness writer so it is only shown for failing
/// tests. Defaults to `debug` for the engine crates.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("chronicle_events=debug,chronicle_infra=debug"))
        .with_test_writer()
        .try_init();
}
