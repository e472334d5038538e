use crate::error::Result;
use crate::interfaces::event_producer::EventProducer;
use crate::observability::metrics::{CONNECTOR_FAILURES, RAW_TICKS_PUBLISHED, SYMBOLS_LOADED};
use crate::observability::tracing::trace_feed_cycle;
use crate::price_infra::connectors::{PollingConnector, StreamingConnector, SymbolSource};
use crate::types::tick::PriceTick;
use crate::utils::helper::first_as_json;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;

/// Cadences shared by every feed.
#[derive(Clone, Copy, Debug)]
pub struct FeedSchedule {
    /// Poll period for REST feeds, flush period for streaming feeds.
    pub cycle: Duration,
    pub symbol_refresh: Duration,
}

/// Ticks received from a socket since the last flush.
#[derive(Debug, Default)]
pub struct TickBuffer {
    ticks: Vec<PriceTick>,
}

impl TickBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tick: PriceTick) {
        self.ticks.push(tick);
    }

    /// Hands out everything buffered so far and leaves the buffer empty.
    pub fn take(&mut self) -> Vec<PriceTick> {
        std::mem::take(&mut self.ticks)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

/// Publishes one connector batch as a single raw-topic message.
pub async fn publish_batch(
    producer: &dyn EventProducer,
    topic: &str,
    source_id: &str,
    batch: &[PriceTick],
) -> Result<usize> {
    producer.publish(topic, batch).await?;

    RAW_TICKS_PUBLISHED.with_label_values(&[source_id]).inc_by(batch.len() as u64);
    tracing::debug!(
        source = %source_id,
        count = batch.len(),
        first = %first_as_json(batch),
        "Raw prices published"
    );
    Ok(batch.len())
}

/// One REST cycle: fetch, normalise, publish.
pub async fn poll_once<C: PollingConnector + ?Sized>(
    connector: &C,
    producer: &dyn EventProducer,
    topic: &str,
) -> Result<usize> {
    let ticks = connector.fetch_ticks().await?;
    publish_batch(producer, topic, connector.source_id(), &ticks).await
}

pub async fn refresh_once<S: SymbolSource + ?Sized>(source: &S, source_id: &str) {
    match source.refresh_symbols().await {
        Ok(count) => {
            SYMBOLS_LOADED.with_label_values(&[source_id]).inc();
            tracing::info!(source = %source_id, symbols = count, "Symbol table refreshed");
        }
        Err(e) => {
            CONNECTOR_FAILURES.with_label_values(&[source_id]).inc();
            tracing::warn!(source = %source_id, error = %e, "Symbol refresh failed, keeping previous table");
        }
    }
}

/// Drives a REST connector forever. Failed cycles are logged and skipped;
/// the next one runs on schedule.
pub async fn run_polling<C: PollingConnector + ?Sized>(
    connector: Arc<C>,
    producer: Arc<dyn EventProducer>,
    topic: String,
    schedule: FeedSchedule,
) {
    let source_id = connector.source_id().to_string();
    refresh_once(&*connector, &source_id).await;

    let mut poll = interval(schedule.cycle);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let refresh_start = Instant::now() + schedule.symbol_refresh;
    let mut refresh = interval_at(refresh_start, schedule.symbol_refresh);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(source = %source_id, "Polling feed started");

    loop {
        tokio::select! {
            _ = refresh.tick() => refresh_once(&*connector, &source_id).await,
            _ = poll.tick() => {
                let cycle = poll_once(&*connector, &*producer, &topic)
                    .instrument(trace_feed_cycle(&source_id))
                    .await;
                if let Err(e) = cycle {
                    CONNECTOR_FAILURES.with_label_values(&[source_id.as_str()]).inc();
                    tracing::warn!(source = %source_id, error = %e, "Feed cycle skipped");
                }
            }
        }
    }
}

/// Refreshes a symbol table on its own timer, separate from the socket loop.
pub async fn run_symbol_refresh(source: Arc<dyn SymbolSource>, source_id: String, period: Duration) {
    let mut refresh = interval_at(Instant::now() + period, period);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        refresh.tick().await;
        refresh_once(&*source, &source_id).await;
    }
}

/// Drives a streaming connector forever. The socket reader and the flush
/// timer run side by side over one buffer, so buffered ticks are published
/// every `schedule.cycle` even while the socket is down. Ticks arriving
/// while a batch is published land in the next batch. The symbol table is
/// refreshed by [`run_symbol_refresh`] running alongside.
pub async fn run_streaming<C: StreamingConnector>(
    connector: C,
    producer: Arc<dyn EventProducer>,
    topic: String,
    schedule: FeedSchedule,
) {
    let source_id = connector.source_id().to_string();
    let buffer = Mutex::new(TickBuffer::new());

    tracing::info!(source = %source_id, "Streaming feed started");

    tokio::select! {
        _ = read_stream(connector, &buffer, &source_id, schedule.cycle) => {}
        _ = flush_buffer(&buffer, &*producer, &topic, &source_id, schedule.cycle) => {}
    }
}

/// Reads the socket into `buffer`. A lost socket is re-opened, retrying
/// once per `retry` while connecting fails.
async fn read_stream<C: StreamingConnector>(
    mut connector: C,
    buffer: &Mutex<TickBuffer>,
    source_id: &str,
    retry: Duration,
) {
    loop {
        if !connector.is_healthy() {
            if let Err(e) = connector.connect().await {
                CONNECTOR_FAILURES.with_label_values(&[source_id]).inc();
                tracing::warn!(source = %source_id, error = %e, "Connect failed, retrying next cycle");
                tokio::time::sleep(retry).await;
                continue;
            }
        }

        match connector.next_tick().await {
            Ok(Some(tick)) => {
                buffer.lock().push(tick);
            }
            Ok(None) => {}
            Err(e) if e.is_disconnect() => {
                CONNECTOR_FAILURES.with_label_values(&[source_id]).inc();
                tracing::warn!(source = %source_id, error = %e, "Socket lost");
            }
            Err(e) => tracing::debug!(source = %source_id, error = %e, "Unreadable message skipped"),
        }
    }
}

async fn flush_buffer(
    buffer: &Mutex<TickBuffer>,
    producer: &dyn EventProducer,
    topic: &str,
    source_id: &str,
    cycle: Duration,
) {
    let mut flush = interval_at(Instant::now() + cycle, cycle);
    flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        flush.tick().await;
        let batch = buffer.lock().take();
        if let Err(e) = publish_batch(producer, topic, source_id, &batch).await {
            CONNECTOR_FAILURES.with_label_values(&[source_id]).inc();
            tracing::warn!(source = %source_id, error = %e, "Flush failed, batch dropped");
        }
    }
}
