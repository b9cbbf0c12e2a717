//! Test utilities for sideload
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration tests:
//! - [`fixtures`] builds real package archives with a compiled manifest
//! - [`server`] runs a scripted local HTTP server
//! - [`init_test_logging`] routes `tracing` output through the test harness

pub mod fixtures;
pub mod server;

pub use fixtures::{ManifestSpec, compile_manifest, package_bytes, write_package};
pub use server::{MockResponse, MockServer};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests, once per process.
///
/// Uses `level` when given, otherwise `RUST_LOG`. Without either, logging
/// stays off.
///
/// ```bash
/// RUST_LOG=sideload=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
