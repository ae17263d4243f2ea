//! Structured logging setup.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! host's decision. [`init`] is a convenience that wires a `tracing-subscriber`
//! formatter from a [`LoggingConfig`]. `RUST_LOG` takes precedence over the
//! configured level when set.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a global fmt subscriber configured from `config`.
///
/// Returns `false` if a global subscriber was already installed, which is
/// not treated as an error so tests and hosts may call this repeatedly.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(app = %config.app_name, "Logging initialized");
    }
    installed
}
