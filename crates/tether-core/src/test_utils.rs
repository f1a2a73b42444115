//! Shared helpers for unit tests

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Route `tracing` output through the test harness
///
/// The first call wins; later calls are no-ops. `TETHER_LOG` overrides the
/// default `debug` filter.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_env("TETHER_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}
