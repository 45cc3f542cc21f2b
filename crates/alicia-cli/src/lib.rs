//! Shared launcher plumbing for the `alicia-*` binaries: config/logging
//! bootstrap, exit codes, and the cross-crate wiring adapters used by the
//! combined `alicia` launcher.

pub mod adapters;
pub mod exit;
pub mod topology;

use alicia_core::Config;

/// Load config and bring up logging the same way for every standalone
/// binary: `tracing` first (so config-load failures are still logged),
/// then the layered config, exiting `CONFIG_ERROR` on failure.
pub fn bootstrap(service_env_prefix: &str, cli_config_path: Option<std::path::PathBuf>) -> Config {
    alicia_core::logging::init("info");
    match Config::load(service_env_prefix, cli_config_path) {
        Ok(config) => {
            if let Err(err) = config.validate() {
                tracing::error!(error = %err, "configuration invalid");
                std::process::exit(exit::CONFIG_ERROR);
            }
            config.log_summary();
            config
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            std::process::exit(exit::CONFIG_ERROR);
        }
    }
}
