//! Test logging.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test writer at `filter`. Safe to call from
/// every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// [`setup_test_logging`] at `warn`, enough to see every block.
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}
