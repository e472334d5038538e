use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::types::ids::ConnectionId;

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::ConfigError(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::ConfigError(e.to_string()))
}

pub fn trace_feed_cycle(source_id: &str) -> Span {
    tracing::info_span!(
        "feed_cycle",
        source = %source_id,
    )
}

pub fn trace_aggregation_window(tick_count: usize) -> Span {
    tracing::info_span!(
        "aggregation_window",
        ticks = tick_count,
    )
}

pub fn trace_connection(connection_id: &ConnectionId) -> Span {
    tracing::info_span!(
        "connection",
        connection_id = %connection_id,
    )
}
