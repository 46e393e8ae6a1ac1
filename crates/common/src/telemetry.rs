//! Tracing subscriber setup shared by every binary

use crate::config::ObservabilityConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins over `observability.log_level`. Safe to call more than
/// once; later calls are ignored.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json_logging {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    if result.is_ok() {
        tracing::debug!(service = %config.service_name, json = config.json_logging, "Tracing initialized");
    }
}
