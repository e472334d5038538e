use crate::types::tick::PriceTick;
use crate::error::Result;
use async_trait::async_trait;

/// Consumes one topic, one batch per bus message.
///
/// `next_batch` must be cancel-safe: consumers race it against timers in
/// `tokio::select!`.
#[async_trait]
pub trait EventSubscriber: Send {
    async fn next_batch(&mut self) -> Result<Vec<PriceTick>>;
}

#[async_trait]
impl<S: EventSubscriber + ?Sized> EventSubscriber for Box<S> {
    async fn next_batch(&mut self) -> Result<Vec<PriceTick>> {
        (**self).next_batch().await
    }
}
