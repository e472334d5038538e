pub mod binance;
pub mod coinbase;
pub mod kraken;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use crate::types::tick::PriceTick;
use crate::error::{Error, Result};

/// Loads an exchange's symbol table and swaps it in whole.
#[async_trait]
pub trait SymbolSource: Send + Sync {
    /// Returns the number of symbols now in effect. On failure the previous
    /// table stays in place.
    async fn refresh_symbols(&self) -> Result<usize>;
}

/// Exchange polled on a fixed cadence.
#[async_trait]
pub trait PollingConnector: SymbolSource {
    fn source_id(&self) -> &str;
    /// One snapshot of every market, normalised and filtered.
    async fn fetch_ticks(&self) -> Result<Vec<PriceTick>>;
}

/// Exchange pushing ticker events over a persistent socket.
#[async_trait]
pub trait StreamingConnector: Send {
    fn source_id(&self) -> &str;
    fn symbol_source(&self) -> Arc<dyn SymbolSource>;
    async fn connect(&mut self) -> Result<()>;
    /// Waits for the next socket message. `Ok(None)` means the message was
    /// not a usable tick.
    async fn next_tick(&mut self) -> Result<Option<PriceTick>>;
    fn is_healthy(&self) -> bool;
}

pub(crate) fn http_client(source_id: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::fetch(source_id, e))
}

/// GET a JSON document, mapping transport, status and decode failures to
/// `FetchFailure`.
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    source_id: &str,
    url: &str,
) -> Result<T> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::fetch(source_id, e))?;

    if !response.status().is_success() {
        return Err(Error::fetch(source_id, format!("{} returned {}", url, response.status())));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::fetch(source_id, e))
}
