use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use crate::price_infra::connectors::{get_json, http_client, PollingConnector, SymbolSource};
use crate::types::symbol::{SymbolInfo, SymbolRegistry, SymbolTable};
use crate::types::tick::{parse_price, PriceTick};
use crate::error::Result;
use crate::utils::helper::current_timestamp_ms;

pub struct BinanceConnector {
    source_id: String,
    rest_url: String,
    client: reqwest::Client,
    symbols: Arc<SymbolRegistry>,
}

impl BinanceConnector {
    pub fn new(rest_url: &str) -> Result<Self> {
        Ok(BinanceConnector {
            source_id: "binance".to_string(),
            rest_url: rest_url.trim_end_matches('/').to_string(),
            client: http_client("binance")?,
            symbols: Arc::new(SymbolRegistry::new()),
        })
    }

    /// Maps one 24h snapshot through `table`. Unknown symbols, zero prices
    /// and non-USD quotes are dropped.
    pub fn normalize(&self, tickers: &[BinanceTicker24h], table: &SymbolTable, now: u64) -> Vec<PriceTick> {
        tickers.iter()
            .filter_map(|ticker| {
                let info = match table.resolve(&ticker.symbol) {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::trace!(source = %self.source_id, error = %e, "Dropping tick");
                        return None;
                    }
                };
                let price = parse_price(&ticker.last_price).ok()?;
                PriceTick::normalized(&info.base_asset, &info.quote_asset, now, price)
            })
            .collect()
    }
}

#[async_trait]
impl SymbolSource for BinanceConnector {
    async fn refresh_symbols(&self) -> Result<usize> {
        let url = format!("{}/exchangeInfo", self.rest_url);
        let info: BinanceExchangeInfo = get_json(&self.client, &self.source_id, &url).await?;

        let table = SymbolTable::new(info.symbols.into_iter().map(|s| SymbolInfo {
            ticker: s.symbol,
            base_asset: s.base_asset,
            quote_asset: s.quote_asset,
        }));
        let count = table.len();
        self.symbols.replace(table);
        Ok(count)
    }
}

#[async_trait]
impl PollingConnector for BinanceConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_ticks(&self) -> Result<Vec<PriceTick>> {
        let url = format!("{}/ticker/24hr", self.rest_url);
        let tickers: Vec<BinanceTicker24h> = get_json(&self.client, &self.source_id, &url).await?;

        let table = self.symbols.snapshot();
        Ok(self.normalize(&tickers, &table, current_timestamp_ms()))
    }
}

#[derive(Deserialize)]
struct BinanceExchangeInfo {
    symbols: Vec<BinanceSymbol>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceSymbol {
    symbol: String,
    base_asset: String,
    quote_asset: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceTicker24h {
    pub symbol: String,
    pub last_price: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_symbols(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/exchangeInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbols": [
                    {"symbol": "BTCUSDT", "baseAsset": "BTC", "quoteAsset": "USDT"},
                    {"symbol": "ETHBTC", "baseAsset": "ETH", "quoteAsset": "BTC"},
                    {"symbol": "LUNAUSDT", "baseAsset": "LUNA", "quoteAsset": "USDT"}
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_filters_quotes_zero_prices_and_unknown_symbols() {
        let server = MockServer::start().await;
        mount_symbols(&server).await;
        Mock::given(method("GET"))
            .and(path("/ticker/24hr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTCUSDT", "lastPrice": "30000.50"},
                {"symbol": "ETHBTC", "lastPrice": "0.06"},
                {"symbol": "LUNAUSDT", "lastPrice": "0.00000000"},
                {"symbol": "NEWUSDT", "lastPrice": "1.5"}
            ])))
            .mount(&server)
            .await;

        let connector = BinanceConnector::new(&server.uri()).unwrap();
        assert_eq!(connector.refresh_symbols().await.unwrap(), 3);

        let ticks = connector.fetch_ticks().await.unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].base, "BTC");
        assert_eq!(ticks[0].quote, "USDT");
        assert_eq!(ticks[0].price, 30000.5);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exchangeInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbols": [{"symbol": "BTCUSDT", "baseAsset": "BTC", "quoteAsset": "USDT"}]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/exchangeInfo"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let connector = BinanceConnector::new(&server.uri()).unwrap();
        connector.refresh_symbols().await.unwrap();

        let err = connector.refresh_symbols().await.unwrap_err();
        assert!(matches!(err, Error::FetchFailure { .. }));
        assert!(connector.symbols.snapshot().resolve("BTCUSDT").is_ok());
    }

    #[tokio::test]
    async fn test_ticker_failure_is_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ticker/24hr"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let connector = BinanceConnector::new(&server.uri()).unwrap();
        assert!(matches!(connector.fetch_ticks().await, Err(Error::FetchFailure { .. })));
    }
}
