use crate::types::tick::PriceTick;
use crate::error::Result;
use async_trait::async_trait;

/// Publishes one batch of ticks as a single message on a topic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn publish(&self, topic: &str, batch: &[PriceTick]) -> Result<()>;
}
