/// Structured logging and observability infrastructure.
///
/// - Request/span context propagation across download, load, and generate.
/// - Env-filter-driven log levels, stderr target.
/// - Separate test-only initializer so unit tests can opt into verbose output
///   without fighting over a single global subscriber.
pub mod spans;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize logging for normal (server/CLI) operation.
pub fn init_logging() {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("doppler=debug".parse().unwrap())
        .add_directive("info".parse().unwrap());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("logging initialized");
}

/// Initialize logging for tests; safe to call from many test threads.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_does_not_panic() {
        init_test_logging();
        tracing::info!("test message");
    }
}
