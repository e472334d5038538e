use crate::config::*;
use crate::error::{Error, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bus: BusConfig,
    pub connectors: ConnectorsConfig,
    pub aggregator: AggregatorConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("PRICEINFRA").separator("__"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app_config: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.api_key.is_empty() {
            return Err(Error::ConfigError("gateway.api_key must be set".to_string()));
        }
        if self.aggregator.window_secs == 0 {
            return Err(Error::ConfigError("aggregator.window_secs must be positive".to_string()));
        }
        if self.connectors.poll_interval_secs == 0 || self.connectors.flush_interval_secs == 0 {
            return Err(Error::ConfigError("connector intervals must be positive".to_string()));
        }
        if self.connectors.symbol_refresh_secs == 0 {
            return Err(Error::ConfigError("connectors.symbol_refresh_secs must be positive".to_string()));
        }
        if self.connectors.coinbase.enabled && self.connectors.coinbase.ws_url.is_none() {
            return Err(Error::ConfigError("connectors.coinbase.ws_url must be set".to_string()));
        }
        if !self.gateway.ws_path.starts_with('/') {
            return Err(Error::ConfigError("gateway.ws_path must start with '/'".to_string()));
        }
        Ok(())
    }
}
