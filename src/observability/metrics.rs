use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use crate::error::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Connector metrics
    pub static ref RAW_TICKS_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("raw_ticks_published_total", "Normalised ticks published by connectors"),
        &["source"]
    ).expect("metric can be created");

    pub static ref CONNECTOR_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("connector_failures_total", "Connector cycles skipped after an error"),
        &["source"]
    ).expect("metric can be created");

    pub static ref SYMBOLS_LOADED: IntCounterVec = IntCounterVec::new(
        Opts::new("symbol_refreshes_total", "Successful symbol table refreshes"),
        &["source"]
    ).expect("metric can be created");

    // Aggregator metrics
    pub static ref WINDOWS_PUBLISHED: IntCounter = IntCounter::new(
        "aggregation_windows_published_total",
        "Aggregation windows that produced a batch"
    ).expect("metric can be created");

    pub static ref WINDOWS_SKIPPED: IntCounter = IntCounter::new(
        "aggregation_windows_skipped_total",
        "Aggregation windows closed without any raw tick"
    ).expect("metric can be created");

    pub static ref AGGREGATED_ASSETS: IntGauge = IntGauge::new(
        "aggregated_assets",
        "Assets in the last aggregated batch"
    ).expect("metric can be created");

    // Gateway metrics
    pub static ref ACTIVE_CONNECTIONS: IntGauge = IntGauge::new(
        "gateway_active_connections",
        "Authenticated client connections"
    ).expect("metric can be created");

    pub static ref AUTH_REJECTIONS: IntCounter = IntCounter::new(
        "gateway_auth_rejections_total",
        "Upgrade requests rejected for a bad token"
    ).expect("metric can be created");

    pub static ref FRAMES_SENT: IntCounter = IntCounter::new(
        "gateway_frames_sent_total",
        "Price frames queued to clients"
    ).expect("metric can be created");

    pub static ref PROTOCOL_ERRORS: IntCounter = IntCounter::new(
        "gateway_protocol_errors_total",
        "Malformed client messages"
    ).expect("metric can be created");
}

pub fn register_metrics() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(RAW_TICKS_PUBLISHED.clone()),
        Box::new(CONNECTOR_FAILURES.clone()),
        Box::new(SYMBOLS_LOADED.clone()),
        Box::new(WINDOWS_PUBLISHED.clone()),
        Box::new(WINDOWS_SKIPPED.clone()),
        Box::new(AGGREGATED_ASSETS.clone()),
        Box::new(ACTIVE_CONNECTIONS.clone()),
        Box::new(AUTH_REJECTIONS.clone()),
        Box::new(FRAMES_SENT.clone()),
        Box::new(PROTOCOL_ERRORS.clone()),
    ];

    for collector in collectors {
        REGISTRY.register(collector)
            .map_err(|e| Error::MetricsError(e.to_string()))?;
    }
    Ok(())
}

/// Prometheus text exposition of everything in `REGISTRY`.
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::MetricsError(e.to_string()))?;

    String::from_utf8(buffer).map_err(|e| Error::MetricsError(e.to_string()))
}
