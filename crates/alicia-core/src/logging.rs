//! Logging bootstrap shared by every substrate binary.

use tracing_subscriber::EnvFilter;

/// Initialize `tracing` with the configured level as the default filter,
/// overridable by `RUST_LOG` as usual.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();
}
