use crate::error::{Error, Result};
use crate::events::price::{decode_batch, encode_batch};
use crate::interfaces::event_producer::EventProducer;
use crate::interfaces::event_subscriber::EventSubscriber;
use crate::types::tick::PriceTick;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Single-process bus: one broadcast channel per topic, carrying the same
/// JSON payloads the Kafka backend writes. Subscribers only see messages
/// published after they subscribed.
pub struct InMemoryBus {
    topics: DashMap<String, broadcast::Sender<Arc<str>>>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        InMemoryBus {
            topics: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Arc<str>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, topic: &str) -> InMemorySubscriber {
        InMemorySubscriber {
            topic: topic.to_string(),
            receiver: self.sender(topic).subscribe(),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventProducer for InMemoryBus {
    async fn publish(&self, topic: &str, batch: &[PriceTick]) -> Result<()> {
        let payload: Arc<str> = encode_batch(batch)?.into();
        // No subscribers yet is not an error: the message is simply not retained.
        let _ = self.sender(topic).send(payload);
        Ok(())
    }
}

pub struct InMemorySubscriber {
    topic: String,
    receiver: broadcast::Receiver<Arc<str>>,
}

#[async_trait]
impl EventSubscriber for InMemorySubscriber {
    async fn next_batch(&mut self) -> Result<Vec<PriceTick>> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return decode_batch(payload.as_bytes()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "Subscriber lagged behind topic");
                }
                Err(RecvError::Closed) => return Err(Error::TopicClosed(self.topic.clone())),
            }
        }
    }
}
