//! Tracing setup for short-lived CLI commands.

use tracing_subscriber::EnvFilter;

/// Initialize a plain stderr subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
