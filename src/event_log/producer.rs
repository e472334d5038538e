use crate::events::price::encode_batch;
use crate::error::{Error, Result};
use crate::interfaces::event_producer::EventProducer;
use crate::types::tick::PriceTick;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::config::ClientConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct KafkaEventProducer {
    producer: FutureProducer,
    sequence_counter: AtomicU64,
}

impl KafkaEventProducer {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("compression.type", "lz4")
            .create()
            .map_err(|e| Error::KafkaError(e.to_string()))?;

        Ok(KafkaEventProducer {
            producer,
            sequence_counter: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl EventProducer for KafkaEventProducer {
    async fn publish(&self, topic: &str, batch: &[PriceTick]) -> Result<()> {
        let sequence = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
        let payload = encode_batch(batch)?;
        let key = sequence.to_string();

        let record = FutureRecord::to(topic)
            .payload(&payload)
            .key(&key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| Error::KafkaError(e.to_string()))?;

        tracing::trace!(topic, sequence, count = batch.len(), "Batch published");
        Ok(())
    }
}
