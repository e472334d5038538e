use async_trait::async_trait;
use chrono::DateTime;
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};
use tokio_tungstenite::MaybeTlsStream;
use tokio::net::TcpStream;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use crate::price_infra::connectors::{get_json, http_client, StreamingConnector, SymbolSource};
use crate::types::symbol::{SymbolInfo, SymbolRegistry, SymbolTable};
use crate::types::tick::{parse_price, PriceTick};
use crate::error::{Error, Result};
use crate::utils::helper::current_timestamp_ms;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Product listing for the Coinbase feed, refreshed independently of the
/// socket.
pub struct CoinbaseProducts {
    source_id: String,
    rest_url: String,
    client: reqwest::Client,
    registry: SymbolRegistry,
}

impl CoinbaseProducts {
    pub fn new(rest_url: &str) -> Result<Self> {
        Ok(CoinbaseProducts {
            source_id: "coinbase".to_string(),
            rest_url: rest_url.trim_end_matches('/').to_string(),
            client: http_client("coinbase")?,
            registry: SymbolRegistry::new(),
        })
    }

    pub fn snapshot(&self) -> Arc<SymbolTable> {
        self.registry.snapshot()
    }
}

#[async_trait]
impl SymbolSource for CoinbaseProducts {
    async fn refresh_symbols(&self) -> Result<usize> {
        let url = format!("{}/products", self.rest_url);
        let products: Vec<CoinbaseProduct> = get_json(&self.client, &self.source_id, &url).await?;

        let table = SymbolTable::new(products.into_iter().map(|p| SymbolInfo {
            ticker: p.id,
            base_asset: p.base_currency,
            quote_asset: p.quote_currency,
        }));
        let count = table.len();
        self.registry.replace(table);
        Ok(count)
    }
}

pub struct CoinbaseConnector {
    source_id: String,
    ws_url: String,
    products: Arc<CoinbaseProducts>,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    /// Table whose products the live socket is subscribed to.
    subscribed: Option<Arc<SymbolTable>>,
}

impl CoinbaseConnector {
    pub fn new(rest_url: &str, ws_url: &str) -> Result<Self> {
        Ok(CoinbaseConnector {
            source_id: "coinbase".to_string(),
            ws_url: ws_url.to_string(),
            products: Arc::new(CoinbaseProducts::new(rest_url)?),
            stream: None,
            subscribed: None,
        })
    }

    /// The current product table, if the socket has not been subscribed to
    /// it yet.
    fn pending_subscription(&self) -> Option<Arc<SymbolTable>> {
        let current = self.products.snapshot();
        match &self.subscribed {
            Some(subscribed) if Arc::ptr_eq(subscribed, &current) => None,
            _ if current.is_empty() => None,
            _ => Some(current),
        }
    }

    async fn send_subscribe(&mut self, table: Arc<SymbolTable>) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let sent = stream.send(Message::Text(Self::subscribe_message(&table))).await;

        if let Err(e) = sent {
            self.stream = None;
            return Err(Error::WebSocketError(e.to_string()));
        }
        tracing::info!(source = %self.source_id, products = table.len(), "Subscribed to ticker channel");
        self.subscribed = Some(table);
        Ok(())
    }

    /// Subscription request for the ticker channel of every known product.
    pub fn subscribe_message(table: &SymbolTable) -> String {
        let mut product_ids: Vec<&str> = table.tickers().collect();
        product_ids.sort_unstable();

        json!({
            "type": "subscribe",
            "product_ids": product_ids,
            "channels": ["ticker"],
        })
        .to_string()
    }

    /// Parses one socket frame. Non-ticker messages, unknown products, zero
    /// prices and non-USD quotes yield `Ok(None)`.
    pub fn normalize_message(text: &str, table: &SymbolTable, now: u64) -> Result<Option<PriceTick>> {
        let message: CoinbaseMessage = serde_json::from_str(text)
            .map_err(|e| Error::DeserializationError(e.to_string()))?;

        if message.type_field != "ticker" {
            return Ok(None);
        }

        let (Some(product_id), Some(price)) = (message.product_id, message.price) else {
            return Err(Error::DeserializationError("ticker without product_id or price".to_string()));
        };

        let info = match table.resolve(&product_id) {
            Ok(info) => info,
            Err(e) => {
                tracing::trace!(source = "coinbase", error = %e, "Dropping tick");
                return Ok(None);
            }
        };

        let time = message.time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .and_then(|t| u64::try_from(t.timestamp_millis()).ok())
            .unwrap_or(now);

        Ok(PriceTick::normalized(&info.base_asset, &info.quote_asset, time, parse_price(&price)?))
    }
}

#[async_trait]
impl StreamingConnector for CoinbaseConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn symbol_source(&self) -> Arc<dyn SymbolSource> {
        self.products.clone()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.products.snapshot().is_empty() {
            self.products.refresh_symbols().await?;
        }
        let table = self.products.snapshot();
        if table.is_empty() {
            return Err(Error::fetch(&self.source_id, "no products to subscribe to"));
        }

        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(&self.ws_url))
            .await
            .map_err(|_| Error::WebSocketError("WebSocket connection timed out".to_string()))?
            .map_err(|e| Error::WebSocketError(format!("WebSocket connection failed: {}", e)))?;

        self.stream = Some(ws_stream);
        self.subscribed = None;
        tracing::info!(source = %self.source_id, "Connected to Coinbase");
        self.send_subscribe(table).await
    }

    async fn next_tick(&mut self) -> Result<Option<PriceTick>> {
        if self.stream.is_none() {
            return Err(Error::NotConnected);
        }
        // A refreshed product table is picked up without reconnecting.
        if let Some(table) = self.pending_subscription() {
            self.send_subscribe(table).await?;
        }

        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                self.stream = None;
                return Err(Error::WebSocketError(e.to_string()));
            }
            None => {
                self.stream = None;
                return Err(Error::ConnectionClosed);
            }
        };

        match message {
            Message::Text(text) => {
                let table = self.products.snapshot();
                Self::normalize_message(&text, &table, current_timestamp_ms())
            }
            Message::Close(_) => {
                self.stream = None;
                Err(Error::ConnectionClosed)
            }
            _ => Ok(None),
        }
    }

    fn is_healthy(&self) -> bool {
        self.stream.is_some()
    }
}

#[derive(Deserialize)]
struct CoinbaseProduct {
    id: String,
    base_currency: String,
    quote_currency: String,
}

#[derive(Deserialize)]
struct CoinbaseMessage {
    #[serde(rename = "type")]
    type_field: String,
    product_id: Option<String>,
    price: Option<String>,
    time: Option<String>,
}
