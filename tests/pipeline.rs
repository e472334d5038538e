use std::sync::Arc;
use std::time::Duration;
use PriceInfra::api::hub::{run_fan_out, SubscriptionHub};
use PriceInfra::api::websocket::Session;
use PriceInfra::event_log::memory::InMemoryBus;
use PriceInfra::events::price::{AGGREGATED_PRICES_TOPIC, RAW_PRICES_TOPIC};
use PriceInfra::interfaces::event_producer::EventProducer;
use PriceInfra::interfaces::event_subscriber::EventSubscriber;
use PriceInfra::price_infra::aggregator::{AggregationWindow, PriceAggregator, WindowOutcome};
use PriceInfra::price_infra::cache::LatestValueCache;
use PriceInfra::types::tick::{PriceTick, USD_PEGS};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;

const WINDOW: Duration = Duration::from_millis(200);
const WAIT: Duration = Duration::from_secs(5);

fn raw(base: &str, quote: &str, price: f64) -> PriceTick {
    PriceTick::normalized(base, quote, 1, price).unwrap()
}

fn price_of(batch: &[PriceTick], base: &str) -> Option<f64> {
    batch.iter().find(|t| t.base == base).map(|t| t.price)
}

struct Pipeline {
    bus: Arc<InMemoryBus>,
    cache: Arc<LatestValueCache>,
    aggregated: Box<dyn EventSubscriber>,
}

/// Starts an aggregator on a short window and listens on its output topic.
fn start_aggregator() -> Pipeline {
    let bus = Arc::new(InMemoryBus::default());
    let cache = Arc::new(LatestValueCache::new());
    let raw_subscriber = bus.subscribe(RAW_PRICES_TOPIC);
    let aggregated = Box::new(bus.subscribe(AGGREGATED_PRICES_TOPIC));

    let aggregator = PriceAggregator::new(bus.clone(), cache.clone(), AGGREGATED_PRICES_TOPIC, WINDOW);
    tokio::spawn(aggregator.run(raw_subscriber));

    Pipeline { bus, cache, aggregated }
}

async fn next_frame(rx: &mut UnboundedReceiver<String>) -> PriceTick {
    let frame = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    serde_json::from_str(&frame).unwrap()
}

#[tokio::test]
async fn test_raw_batches_from_two_exchanges_are_averaged() {
    let mut pipeline = start_aggregator();

    pipeline.bus.publish(RAW_PRICES_TOPIC, &[raw("BTC", "USDT", 100.0)]).await.unwrap();
    pipeline.bus.publish(RAW_PRICES_TOPIC, &[raw("BTC", "USDC", 102.0)]).await.unwrap();

    let batch = timeout(WAIT, pipeline.aggregated.next_batch()).await.unwrap().unwrap();
    assert_eq!(price_of(&batch, "BTC"), Some(101.0));
    for peg in USD_PEGS {
        assert_eq!(batch.iter().filter(|t| t.base == peg).count(), 1);
        assert_eq!(price_of(&batch, peg), Some(1.0));
    }
    assert!(batch.iter().all(|t| t.quote == "USD"));

    let cached = pipeline.cache.get("BTC").await.unwrap();
    assert_eq!(cached.price, 101.0);
}

#[tokio::test]
async fn test_peg_only_window_still_publishes_pegs() {
    let mut pipeline = start_aggregator();

    pipeline.bus.publish(RAW_PRICES_TOPIC, &[raw("USDT", "USD", 1.001)]).await.unwrap();

    let batch = timeout(WAIT, pipeline.aggregated.next_batch()).await.unwrap().unwrap();
    assert_eq!(batch.len(), USD_PEGS.len());
    assert_eq!(price_of(&batch, "USDT"), Some(1.0));
}

#[tokio::test]
async fn test_empty_window_leaves_cache_untouched() {
    let bus = Arc::new(InMemoryBus::default());
    let cache = Arc::new(LatestValueCache::new());
    cache.put("BTC", PriceTick::aggregate("BTC", 1, 99.0)).await;
    let mut aggregated = bus.subscribe(AGGREGATED_PRICES_TOPIC);

    let aggregator = PriceAggregator::new(bus.clone(), cache.clone(), AGGREGATED_PRICES_TOPIC, WINDOW);
    let outcome = aggregator.close_window(AggregationWindow::new()).await.unwrap();

    assert!(matches!(outcome, WindowOutcome::Skipped));
    assert_eq!(cache.len().await, 1);
    assert_eq!(cache.get("BTC").await.unwrap().price, 99.0);
    assert!(timeout(WINDOW, aggregated.next_batch()).await.is_err());
}

#[tokio::test]
async fn test_aggregated_prices_reach_subscribed_clients() {
    let mut pipeline = start_aggregator();
    let hub = Arc::new(SubscriptionHub::new());
    tokio::spawn(run_fan_out(hub.clone(), pipeline.bus.subscribe(AGGREGATED_PRICES_TOPIC)));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::new(hub.clone(), pipeline.cache.clone());
    session.activate(tx);

    // Nothing cached yet, so nothing comes back until the next window.
    let sent = session.handle_text(r#"{"query":"prices","payload":["DOGE"]}"#).await.unwrap();
    assert_eq!(sent, 0);
    assert!(rx.try_recv().is_err());

    pipeline.bus.publish(RAW_PRICES_TOPIC, &[raw("DOGE", "USDT", 0.07), raw("BTC", "USDT", 100.0)]).await.unwrap();
    timeout(WAIT, pipeline.aggregated.next_batch()).await.unwrap().unwrap();

    let tick = next_frame(&mut rx).await;
    assert_eq!(tick.base, "DOGE");
    assert_eq!(tick.price, 0.07);
    assert!(timeout(WINDOW, rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_resubscribe_sends_cache_and_narrows_delivery() {
    let bus = Arc::new(InMemoryBus::default());
    let cache = Arc::new(LatestValueCache::new());
    cache.put("BTC", PriceTick::aggregate("BTC", 1, 101.0)).await;
    let hub = Arc::new(SubscriptionHub::new());
    tokio::spawn(run_fan_out(hub.clone(), bus.subscribe(AGGREGATED_PRICES_TOPIC)));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::new(hub.clone(), cache.clone());
    session.activate(tx);

    session.handle_text(r#"{"query":"prices","payload":["BTC","ETH"]}"#).await.unwrap();
    let cached = next_frame(&mut rx).await;
    assert_eq!(cached.base, "BTC");
    assert_eq!(cached.price, 101.0);
    assert!(rx.try_recv().is_err());

    session.handle_text(r#"{"query":"prices","payload":["ETH"]}"#).await.unwrap();

    let batch = vec![
        PriceTick::aggregate("BTC", 2, 102.0),
        PriceTick::aggregate("ETH", 2, 10.0),
    ];
    bus.publish(AGGREGATED_PRICES_TOPIC, &batch).await.unwrap();

    let tick = next_frame(&mut rx).await;
    assert_eq!(tick.base, "ETH");
    assert!(timeout(WINDOW, rx.recv()).await.is_err());
}
