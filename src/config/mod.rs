use std::time::Duration;
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::AppConfig;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    Kafka,
    Memory,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub brokers: String,
    pub raw_topic: String,
    pub aggregated_topic: String,
    pub group_id: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            backend: BusBackend::Kafka,
            brokers: "localhost:9092".to_string(),
            raw_topic: crate::events::price::RAW_PRICES_TOPIC.to_string(),
            aggregated_topic: crate::events::price::AGGREGATED_PRICES_TOPIC.to_string(),
            group_id: "price-aggregator".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub enabled: bool,
    pub rest_url: String,
    #[serde(default)]
    pub ws_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConnectorsConfig {
    pub poll_interval_secs: u64,
    pub flush_interval_secs: u64,
    pub symbol_refresh_secs: u64,
    pub binance: ExchangeConfig,
    pub kraken: ExchangeConfig,
    pub coinbase: ExchangeConfig,
}

impl ConnectorsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn symbol_refresh(&self) -> Duration {
        Duration::from_secs(self.symbol_refresh_secs)
    }
}

impl Default for ConnectorsConfig {
    fn default() -> Self {
        ConnectorsConfig {
            poll_interval_secs: 5,
            flush_interval_secs: 5,
            symbol_refresh_secs: 24 * 60 * 60,
            binance: ExchangeConfig {
                enabled: true,
                rest_url: "https://api.binance.com/api/v3".to_string(),
                ws_url: None,
            },
            kraken: ExchangeConfig {
                enabled: true,
                rest_url: "https://api.kraken.com/0/public".to_string(),
                ws_url: None,
            },
            coinbase: ExchangeConfig {
                enabled: true,
                rest_url: "https://api.exchange.coinbase.com".to_string(),
                ws_url: Some("wss://ws-feed.exchange.coinbase.com".to_string()),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AggregatorConfig {
    pub window_secs: u64,
}

impl AggregatorConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig { window_secs: 30 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub ws_path: String,
    pub api_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind_addr: "0.0.0.0:7777".to_string(),
            ws_path: "/cex".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}
