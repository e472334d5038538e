use std::collections::HashMap;
use tokio::sync::RwLock;
use crate::types::tick::PriceTick;

/// Most recent aggregated tick per base asset.
///
/// The aggregator is the only writer; gateway connections read it when a
/// client subscribes. Entries are overwritten, never merged or evicted, so an
/// asset missing from later windows keeps its last value.
#[derive(Debug, Default)]
pub struct LatestValueCache {
    entries: RwLock<HashMap<String, PriceTick>>,
}

impl LatestValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, asset: &str, tick: PriceTick) {
        self.entries.write().await.insert(asset.to_string(), tick);
    }

    /// Replaces the entry of every asset in `batch` under one write lock.
    pub async fn put_batch(&self, batch: &[PriceTick]) {
        let mut entries = self.entries.write().await;
        for tick in batch {
            entries.insert(tick.base.clone(), tick.clone());
        }
    }

    pub async fn get(&self, asset: &str) -> Option<PriceTick> {
        self.entries.read().await.get(asset).cloned()
    }

    /// Cached ticks for `assets`, in request order, skipping unknown assets.
    pub async fn get_many(&self, assets: &[String]) -> Vec<PriceTick> {
        let entries = self.entries.read().await;
        assets.iter()
            .filter_map(|asset| entries.get(asset).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
