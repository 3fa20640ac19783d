//! Observability utilities.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::{Config, ObservabilityConfig};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing subscriber once for the process.
///
/// Settings come from `EPISODE7_LOG_LEVEL` / `EPISODE7_LOG_FORMAT=json`.
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing() {
    let config = Config::from_env().unwrap_or_else(|err| {
        eprintln!("invalid observability environment, using defaults: {err}");
        Config::default()
    });
    init_tracing_with(&config.observability);
}

/// Initialize tracing from explicit settings. Later calls are no-ops.
pub fn init_tracing_with(config: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

        let result = if config.json_logs {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}
