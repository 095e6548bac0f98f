//! Tracing/logging initialization from [`RuntimeConfig`].

use cardinality_config::{LogFormat, RuntimeConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing(config: &RuntimeConfig) {
    let env_filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.server.log_format {
        LogFormat::Json => {
            registry.with(fmt::layer().json()).init();
        }
        LogFormat::Text => {
            registry.with(fmt::layer()).init();
        }
    }
}
