pub mod events;
pub mod event_log;
pub mod utils;
pub mod types;
pub mod price_infra;
pub mod error;
pub mod config;
pub mod observability;
pub mod interfaces;
pub mod api;

/// Environment variable selecting the `config/{env}` overlay.
pub const ENV_VAR: &str = "PRICEINFRA_ENV";

pub const DEFAULT_ENV: &str = "development";
