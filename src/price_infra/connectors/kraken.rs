use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use crate::price_infra::connectors::{get_json, http_client, PollingConnector, SymbolSource};
use crate::types::symbol::{SymbolInfo, SymbolRegistry, SymbolTable};
use crate::types::tick::{parse_price, PriceTick};
use crate::error::{Error, Result};
use crate::utils::helper::current_timestamp_ms;

/// Kraken's legacy asset codes that differ from everyone else's.
const ASSET_ALIASES: [(&str, &str); 2] = [("XBT", "BTC"), ("XDG", "DOGE")];

fn canonical_asset(asset: &str) -> &str {
    ASSET_ALIASES.iter()
        .find(|(kraken, _)| *kraken == asset)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(asset)
}

pub struct KrakenConnector {
    source_id: String,
    rest_url: String,
    client: reqwest::Client,
    symbols: Arc<SymbolRegistry>,
}

impl KrakenConnector {
    pub fn new(rest_url: &str) -> Result<Self> {
        Ok(KrakenConnector {
            source_id: "kraken".to_string(),
            rest_url: rest_url.trim_end_matches('/').to_string(),
            client: http_client("kraken")?,
            symbols: Arc::new(SymbolRegistry::new()),
        })
    }

    async fn get_result<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}/{}", self.rest_url, endpoint);
        let response: KrakenResponse<T> = get_json(&self.client, &self.source_id, &url).await?;

        if !response.error.is_empty() {
            return Err(Error::fetch(&self.source_id, response.error.join(", ")));
        }
        response.result.ok_or_else(|| Error::fetch(&self.source_id, "missing result"))
    }

    pub fn normalize(&self, tickers: &HashMap<String, KrakenTicker>, table: &SymbolTable, now: u64) -> Vec<PriceTick> {
        tickers.iter()
            .filter_map(|(pair, ticker)| {
                let info = match table.resolve(pair) {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::trace!(source = %self.source_id, error = %e, "Dropping tick");
                        return None;
                    }
                };
                let price = parse_price(ticker.last_trade.first()?).ok()?;
                PriceTick::normalized(&info.base_asset, &info.quote_asset, now, price)
            })
            .collect()
    }
}

#[async_trait]
impl SymbolSource for KrakenConnector {
    async fn refresh_symbols(&self) -> Result<usize> {
        let pairs: HashMap<String, KrakenAssetPair> = self.get_result("AssetPairs").await?;

        let table = SymbolTable::new(pairs.into_iter().filter_map(|(pair, info)| {
            // Pairs without a websocket name are dark-pool or delisted markets.
            let (base, quote) = info.wsname?.split_once('/').map(|(b, q)| {
                (canonical_asset(b).to_string(), canonical_asset(q).to_string())
            })?;
            Some(SymbolInfo {
                ticker: pair,
                base_asset: base,
                quote_asset: quote,
            })
        }));
        let count = table.len();
        self.symbols.replace(table);
        Ok(count)
    }
}

#[async_trait]
impl PollingConnector for KrakenConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_ticks(&self) -> Result<Vec<PriceTick>> {
        let tickers: HashMap<String, KrakenTicker> = self.get_result("Ticker").await?;

        let table = self.symbols.snapshot();
        Ok(self.normalize(&tickers, &table, current_timestamp_ms()))
    }
}

#[derive(Deserialize)]
struct KrakenResponse<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct KrakenAssetPair {
    wsname: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KrakenTicker {
    /// Last trade closed: `[price, lot volume]`.
    #[serde(rename = "c")]
    pub last_trade: Vec<String>,
}
