use crate::error::{Error, Result};
use crate::events::price::decode_batch;
use crate::interfaces::event_subscriber::EventSubscriber;
use crate::types::tick::PriceTick;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;

/// Where a consumer group without committed offsets starts reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetReset {
    Earliest,
    Latest,
}

impl OffsetReset {
    fn as_str(self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

pub struct EventConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl EventConsumer {
    pub fn new(brokers: &str, topic: &str, group_id: &str, offset_reset: OffsetReset) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", offset_reset.as_str())
            .create()
            .map_err(|e| Error::KafkaError(e.to_string()))?;

        consumer.subscribe(&[topic])
            .map_err(|e| Error::KafkaError(e.to_string()))?;

        tracing::info!(topic, group_id, "Kafka consumer subscribed");

        Ok(EventConsumer {
            consumer,
            topic: topic.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl EventSubscriber for EventConsumer {
    async fn next_batch(&mut self) -> Result<Vec<PriceTick>> {
        match self.consumer.recv().await {
            Ok(message) => {
                let payload = message.payload()
                    .ok_or(Error::EmptyPayload)?;

                decode_batch(payload)
            }
            Err(e) => Err(Error::KafkaError(e.to_string())),
        }
    }
}
