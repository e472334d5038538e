use axum::{
    extract::ws::{WebSocket, WebSocketUpgrade, Message},
    response::Response,
    extract::State,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;
use crate::api::GatewayState;
use crate::api::hub::{Outbound, SubscriptionHub};
use crate::error::{Error, Result};
use crate::observability::metrics::{ACTIVE_CONNECTIONS, PROTOCOL_ERRORS};
use crate::observability::tracing::trace_connection;
use crate::price_infra::cache::LatestValueCache;
use crate::types::ids::ConnectionId;

/// Frame sent back for any message the gateway cannot act on.
pub const ERROR_FRAME: &str = "error";

/// Lifecycle of one client connection. `Connecting` covers the HTTP upgrade
/// request, which only passes the token check into `Authenticated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "query", content = "payload", rename_all = "lowercase")]
pub enum ClientRequest {
    /// Replace the subscription set with exactly these base assets.
    Prices(Vec<String>),
}

pub fn parse_request(text: &str) -> Result<ClientRequest> {
    serde_json::from_str(text).map_err(|e| Error::ProtocolError(e.to_string()))
}

/// Server-side view of one authenticated client.
pub struct Session {
    id: ConnectionId,
    state: ConnectionState,
    hub: Arc<SubscriptionHub>,
    cache: Arc<LatestValueCache>,
}

impl Session {
    /// A session is created once the upgrade request passed the token check.
    pub fn new(hub: Arc<SubscriptionHub>, cache: Arc<LatestValueCache>) -> Self {
        Session {
            id: ConnectionId::new(),
            state: ConnectionState::Authenticated,
            hub,
            cache,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Registers the connection with an empty subscription set.
    pub fn activate(&mut self, outbound: Outbound) {
        if self.state != ConnectionState::Authenticated {
            return;
        }
        self.hub.register(self.id, outbound);
        self.state = ConnectionState::Active;
        ACTIVE_CONNECTIONS.inc();
        tracing::info!("Connection active");
    }

    /// Handles one client text frame. Returns the number of cached prices
    /// sent back immediately.
    pub async fn handle_text(&self, text: &str) -> Result<usize> {
        if self.state != ConnectionState::Active {
            return Err(Error::ConnectionNotFound(self.id));
        }

        match parse_request(text)? {
            ClientRequest::Prices(requested) => {
                let mut seen = HashSet::new();
                let assets: Vec<String> = requested
                    .into_iter()
                    .filter(|asset| seen.insert(asset.clone()))
                    .collect();
                self.hub.replace_subscription(self.id, &assets)?;

                let cached = self.cache.get_many(&assets).await;
                for tick in &cached {
                    let frame = serde_json::to_string(tick)
                        .map_err(|e| Error::SerializationError(e.to_string()))?;
                    self.hub.send_to(self.id, frame)?;
                }

                tracing::debug!(assets = ?assets, cached = cached.len(), "Subscription replaced");
                Ok(cached.len())
            }
        }
    }

    /// Reports a failed request to the client; the connection stays open.
    pub fn reject(&self, error: &Error) {
        PROTOCOL_ERRORS.inc();
        tracing::debug!(error = %error, "Client request rejected");
        if self.hub.send_to(self.id, ERROR_FRAME.to_string()).is_err() {
            tracing::debug!("Error frame not queued, connection already gone");
        }
    }

    /// Drops the subscription. No frame is queued for this connection after
    /// it returns.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if self.state == ConnectionState::Active {
            self.hub.remove(self.id);
            ACTIVE_CONNECTIONS.dec();
        }
        self.state = ConnectionState::Closed;
        tracing::info!("Connection closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let mut session = Session::new(state.hub.clone(), state.cache.clone());
    let span = trace_connection(&session.id());
    run_session(socket, &mut session).instrument(span.clone()).await;
    span.in_scope(|| session.close());
}

async fn run_session(socket: WebSocket, session: &mut Session) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
    session.activate(outbound);

    // Writer: drains the connection's queue into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            message = receiver.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(e) => {
                            session.reject(&Error::ProtocolError(e.to_string()));
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "Socket error");
                        break;
                    }
                };

                if let Err(e) = session.handle_text(&text).await {
                    session.reject(&e);
                }
            }
        }
    }

    session.close();
    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tick::PriceTick;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn frames(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    async fn active_session() -> (Session, UnboundedReceiver<String>, Arc<SubscriptionHub>, Arc<LatestValueCache>) {
        let hub = Arc::new(SubscriptionHub::new());
        let cache = Arc::new(LatestValueCache::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = Session::new(hub.clone(), cache.clone());
        session.activate(tx);
        (session, rx, hub, cache)
    }

    #[test]
    fn test_parse_prices_request() {
        let request = parse_request(r#"{"query":"prices","payload":["BTC","ETH"]}"#).unwrap();
        assert_eq!(request, ClientRequest::Prices(vec!["BTC".to_string(), "ETH".to_string()]));
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(matches!(parse_request(r#"{"query":"portfolio","payload":{}}"#), Err(Error::ProtocolError(_))));
        assert!(matches!(parse_request(r#"{"query":"prices"}"#), Err(Error::ProtocolError(_))));
        assert!(matches!(parse_request("not json"), Err(Error::ProtocolError(_))));
    }

    #[tokio::test]
    async fn test_subscribe_sends_cached_values_once() {
        let (session, mut rx, _hub, cache) = active_session().await;
        cache.put("BTC", PriceTick::aggregate("BTC", 1, 101.0)).await;

        let sent = session.handle_text(r#"{"query":"prices","payload":["BTC","DOGE"]}"#).await.unwrap();
        assert_eq!(sent, 1);

        let frames = frames(&mut rx);
        assert_eq!(frames.len(), 1);
        let tick: PriceTick = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(tick.base, "BTC");
        assert_eq!(tick.price, 101.0);
    }

    #[tokio::test]
    async fn test_repeated_asset_gets_cached_value_once() {
        let (session, mut rx, hub, cache) = active_session().await;
        cache.put("BTC", PriceTick::aggregate("BTC", 1, 101.0)).await;

        let sent = session.handle_text(r#"{"query":"prices","payload":["BTC","BTC"]}"#).await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(frames(&mut rx).len(), 1);
        assert_eq!(hub.subscriptions(session.id()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_uncached_asset_arrives_with_next_batch() {
        let (session, mut rx, hub, _cache) = active_session().await;

        session.handle_text(r#"{"query":"prices","payload":["DOGE"]}"#).await.unwrap();
        assert!(frames(&mut rx).is_empty());

        hub.fan_out(&[PriceTick::aggregate("DOGE", 2, 0.07)]);
        let frames = frames(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("DOGE"));
    }

    #[tokio::test]
    async fn test_malformed_request_keeps_connection_open() {
        let (session, mut rx, hub, _cache) = active_session().await;

        let err = session.handle_text("{").await.unwrap_err();
        session.reject(&err);

        assert_eq!(frames(&mut rx), vec![ERROR_FRAME.to_string()]);
        assert_eq!(session.state(), ConnectionState::Active);
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_close_unregisters() {
        let (mut session, _rx, hub, _cache) = active_session().await;
        session.handle_text(r#"{"query":"prices","payload":["BTC"]}"#).await.unwrap();

        session.close();
        assert_eq!(session.state(), ConnectionState::Closed);
        assert_eq!(hub.connection_count(), 0);
        assert!(session.handle_text(r#"{"query":"prices","payload":["BTC"]}"#).await.is_err());
    }
}
