use crate::error::{Error, Result};
use crate::interfaces::event_subscriber::EventSubscriber;
use crate::observability::metrics::FRAMES_SENT;
use crate::types::ids::ConnectionId;
use crate::types::tick::PriceTick;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Text frames queued for one client socket.
pub type Outbound = UnboundedSender<String>;

struct Connection {
    subscriptions: HashSet<String>,
    outbound: Outbound,
}

/// Registry of live connections and the assets each one follows.
///
/// Delivery only enqueues frames; each connection's writer task drains its
/// own queue, so one slow socket never holds up the others.
#[derive(Default)]
pub struct SubscriptionHub {
    connections: DashMap<ConnectionId, Connection>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection with an empty subscription set.
    pub fn register(&self, connection_id: ConnectionId, outbound: Outbound) {
        self.connections.insert(connection_id, Connection {
            subscriptions: HashSet::new(),
            outbound,
        });
    }

    /// Swaps the whole subscription set. Assets not in `assets` are dropped.
    pub fn replace_subscription(&self, connection_id: ConnectionId, assets: &[String]) -> Result<()> {
        let mut connection = self.connections
            .get_mut(&connection_id)
            .ok_or(Error::ConnectionNotFound(connection_id))?;

        connection.subscriptions = assets.iter().cloned().collect();
        Ok(())
    }

    pub fn subscriptions(&self, connection_id: ConnectionId) -> Option<HashSet<String>> {
        self.connections
            .get(&connection_id)
            .map(|connection| connection.subscriptions.clone())
    }

    pub fn remove(&self, connection_id: ConnectionId) -> bool {
        self.connections.remove(&connection_id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queues a frame for one connection.
    pub fn send_to(&self, connection_id: ConnectionId, frame: String) -> Result<()> {
        let connection = self.connections
            .get(&connection_id)
            .ok_or(Error::ConnectionNotFound(connection_id))?;

        connection.outbound
            .send(frame)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Delivers every tick of `batch` to the connections subscribed to its
    /// base asset. Returns the number of frames queued.
    pub fn fan_out(&self, batch: &[PriceTick]) -> usize {
        let frames: Vec<(&str, String)> = batch.iter()
            .filter_map(|tick| match serde_json::to_string(tick) {
                Ok(frame) => Some((tick.base.as_str(), frame)),
                Err(e) => {
                    tracing::warn!(base = %tick.base, error = %e, "Unserializable tick skipped");
                    None
                }
            })
            .collect();

        let mut delivered = 0;
        let mut gone = Vec::new();

        for entry in self.connections.iter() {
            for (base, frame) in &frames {
                if !entry.subscriptions.contains(*base) {
                    continue;
                }
                if entry.outbound.send(frame.clone()).is_err() {
                    gone.push(*entry.key());
                    break;
                }
                delivered += 1;
            }
        }

        for connection_id in gone {
            self.connections.remove(&connection_id);
            tracing::debug!(connection_id = %connection_id, "Dropped connection with closed queue");
        }

        FRAMES_SENT.inc_by(delivered as u64);
        delivered
    }
}

/// Feeds every aggregated batch from the bus into the hub.
pub async fn run_fan_out<S: EventSubscriber>(hub: Arc<SubscriptionHub>, mut subscriber: S) {
    tracing::info!("Fan-out consumer started");

    loop {
        match subscriber.next_batch().await {
            Ok(batch) => {
                let delivered = hub.fan_out(&batch);
                tracing::debug!(
                    ticks = batch.len(),
                    frames = delivered,
                    connections = hub.connection_count(),
                    "Aggregated batch delivered"
                );
            }
            Err(Error::TopicClosed(topic)) => {
                tracing::error!(topic = %topic, "Aggregated topic closed, fan-out stopping");
                break;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to read aggregated batch"),
        }
    }
}
