use crate::error::{Error, Result};
use crate::interfaces::event_producer::EventProducer;
use crate::interfaces::event_subscriber::EventSubscriber;
use crate::observability::metrics::{AGGREGATED_ASSETS, WINDOWS_PUBLISHED, WINDOWS_SKIPPED};
use crate::observability::tracing::trace_aggregation_window;
use crate::price_infra::cache::LatestValueCache;
use crate::types::tick::{is_usd_peg, PriceTick, USD_PEGS};
use crate::utils::helper::{current_timestamp_ms, first_as_json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;

/// Price pinned for every USD peg in an aggregated batch.
pub const PEG_PRICE: f64 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct WindowEntry {
    sum: f64,
    count: u64,
}

/// Ticks accumulated during one aggregation cycle, keyed by base asset.
///
/// Owned by a single cycle: filled while the window is open, consumed by
/// [`AggregationWindow::close`].
#[derive(Debug, Default)]
pub struct AggregationWindow {
    entries: HashMap<String, WindowEntry>,
    observed: usize,
}

impl AggregationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one tick. Ticks with a non-positive price are ignored.
    pub fn observe(&mut self, tick: &PriceTick) -> bool {
        if !tick.is_valid() {
            return false;
        }

        let entry = self.entries.entry(tick.base.clone()).or_default();
        entry.sum += tick.price;
        entry.count += 1;
        self.observed += 1;
        true
    }

    pub fn observe_batch(&mut self, batch: &[PriceTick]) -> usize {
        batch.iter().filter(|tick| self.observe(tick)).count()
    }

    pub fn tick_count(&self) -> usize {
        self.observed
    }

    pub fn is_empty(&self) -> bool {
        self.observed == 0
    }

    /// Reduces the window to one USD tick per asset: the arithmetic mean of
    /// every observation for non-peg assets, followed by a 1.0 tick for each
    /// USD peg whether or not it was observed. Peg observations never move
    /// the peg price.
    pub fn close(self, now: u64) -> Vec<PriceTick> {
        let mut batch: Vec<PriceTick> = self.entries
            .into_iter()
            .filter(|(base, _)| !is_usd_peg(base))
            .map(|(base, entry)| PriceTick::aggregate(&base, now, entry.sum / entry.count as f64))
            .collect();
        batch.sort_by(|a, b| a.base.cmp(&b.base));

        batch.extend(USD_PEGS.iter().map(|peg| PriceTick::aggregate(peg, now, PEG_PRICE)));
        batch
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WindowOutcome {
    Published(Vec<PriceTick>),
    /// No raw tick arrived during the window; nothing was published.
    Skipped,
}

pub struct PriceAggregator {
    producer: Arc<dyn EventProducer>,
    cache: Arc<LatestValueCache>,
    topic: String,
    window: Duration,
}

impl PriceAggregator {
    pub fn new(
        producer: Arc<dyn EventProducer>,
        cache: Arc<LatestValueCache>,
        topic: &str,
        window: Duration,
    ) -> Self {
        PriceAggregator {
            producer,
            cache,
            topic: topic.to_string(),
            window,
        }
    }

    /// Closes one window: refreshes the cache, then publishes the batch. The
    /// cache always holds a batch before subscribers can receive it, and it is
    /// updated even when the publish fails.
    pub async fn close_window(&self, window: AggregationWindow) -> Result<WindowOutcome> {
        if window.is_empty() {
            WINDOWS_SKIPPED.inc();
            tracing::debug!("Aggregation window empty, nothing to publish");
            return Ok(WindowOutcome::Skipped);
        }

        let span = trace_aggregation_window(window.tick_count());
        self.publish_window(window).instrument(span).await
    }

    async fn publish_window(&self, window: AggregationWindow) -> Result<WindowOutcome> {
        let batch = window.close(current_timestamp_ms());
        self.cache.put_batch(&batch).await;
        self.producer.publish(&self.topic, &batch).await?;

        WINDOWS_PUBLISHED.inc();
        AGGREGATED_ASSETS.set(batch.len() as i64);
        tracing::info!(
            assets = batch.len(),
            first = %first_as_json(&batch),
            "Aggregated prices published"
        );

        Ok(WindowOutcome::Published(batch))
    }

    /// Consumes raw batches forever, closing a window every `window`.
    pub async fn run<S: EventSubscriber>(self, mut subscriber: S) {
        let mut ticker = interval_at(Instant::now() + self.window, self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut window = AggregationWindow::new();

        tracing::info!(window_secs = self.window.as_secs(), topic = %self.topic, "Aggregator started");

        loop {
            tokio::select! {
                batch = subscriber.next_batch() => match batch {
                    Ok(batch) => {
                        let accepted = window.observe_batch(&batch);
                        if accepted < batch.len() {
                            tracing::warn!(dropped = batch.len() - accepted, "Ignored ticks with invalid prices");
                        }
                    }
                    Err(Error::TopicClosed(topic)) => {
                        tracing::error!(topic = %topic, "Raw topic closed, aggregator stopping");
                        break;
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to read raw price batch"),
                },
                _ = ticker.tick() => {
                    let closed = std::mem::take(&mut window);
                    if let Err(e) = self.close_window(closed).await {
                        tracing::error!(error = %e, "Failed to publish aggregated prices");
                    }
                }
            }
        }
    }
}
