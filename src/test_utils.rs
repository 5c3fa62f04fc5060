//! Shared test helpers

/// Logging bootstrap for tests, used with the `test-logging` feature.
pub mod logging {
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// Install a verbose tracing subscriber once per test binary.
    ///
    /// Safe to call from every test module; later calls are no-ops.
    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace")),
                )
                .with_test_writer()
                .try_init();
        });
    }
}
