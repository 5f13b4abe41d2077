//! Operator log channel. Library crates only emit `tracing` events; whoever
//! embeds the client installs the subscriber once.

use tracing_subscriber::EnvFilter;

use crate::ConfigError;

/// Installs a global fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init(json: bool) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ConfigError::Telemetry(e.to_string()))
}

/// Test-friendly variant: writes through the test harness and ignores a
/// subscriber that is already installed.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
