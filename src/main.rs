use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use PriceInfra::api::{self, hub::{run_fan_out, SubscriptionHub}, GatewayState};
use PriceInfra::config::{AppConfig, BusBackend, BusConfig};
use PriceInfra::event_log::consumer::{EventConsumer, OffsetReset};
use PriceInfra::event_log::memory::InMemoryBus;
use PriceInfra::event_log::producer::KafkaEventProducer;
use PriceInfra::interfaces::event_producer::EventProducer;
use PriceInfra::interfaces::event_subscriber::EventSubscriber;
use PriceInfra::observability::{metrics::register_metrics, tracing::init_tracing};
use PriceInfra::price_infra::aggregator::PriceAggregator;
use PriceInfra::price_infra::cache::LatestValueCache;
use PriceInfra::price_infra::connectors::binance::BinanceConnector;
use PriceInfra::price_infra::connectors::coinbase::CoinbaseConnector;
use PriceInfra::price_infra::connectors::kraken::KrakenConnector;
use PriceInfra::price_infra::connectors::StreamingConnector;
use PriceInfra::price_infra::ingest::{run_polling, run_streaming, run_symbol_refresh, FeedSchedule};
use PriceInfra::utils::task_supervisor::TaskSupervisor;
use uuid::Uuid;

const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(10);

/// The bus backend chosen by configuration.
enum Bus {
    Kafka {
        producer: Arc<KafkaEventProducer>,
        config: BusConfig,
    },
    Memory(Arc<InMemoryBus>),
}

impl Bus {
    fn connect(config: &BusConfig) -> anyhow::Result<Self> {
        Ok(match config.backend {
            BusBackend::Kafka => Bus::Kafka {
                producer: Arc::new(KafkaEventProducer::new(&config.brokers)?),
                config: config.clone(),
            },
            BusBackend::Memory => Bus::Memory(Arc::new(InMemoryBus::default())),
        })
    }

    fn producer(&self) -> Arc<dyn EventProducer> {
        match self {
            Bus::Kafka { producer, .. } => producer.clone(),
            Bus::Memory(bus) => bus.clone(),
        }
    }

    fn subscriber(&self, topic: &str, group_id: &str, offset_reset: OffsetReset) -> anyhow::Result<Box<dyn EventSubscriber>> {
        Ok(match self {
            Bus::Kafka { config, .. } => {
                Box::new(EventConsumer::new(&config.brokers, topic, group_id, offset_reset)?)
            }
            Bus::Memory(bus) => Box::new(bus.subscribe(topic)),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var(PriceInfra::ENV_VAR).unwrap_or_else(|_| PriceInfra::DEFAULT_ENV.to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    init_tracing(&config.logging)?;
    register_metrics()?;
    tracing::info!(env = %env, backend = ?config.bus.backend, "Starting price infra");

    let bus = Bus::connect(&config.bus)?;
    let producer = bus.producer();
    let cache = Arc::new(LatestValueCache::new());
    let hub = Arc::new(SubscriptionHub::new());
    let mut supervisor = TaskSupervisor::new();

    // Subscribers are created before any feed publishes so the in-memory bus
    // does not drop the first batches.
    let raw_subscriber = bus.subscriber(&config.bus.raw_topic, &config.bus.group_id, OffsetReset::Earliest)?;
    let gateway_group = format!("{}-gateway-{}", config.bus.group_id, Uuid::new_v4());
    let aggregated_subscriber = bus.subscriber(&config.bus.aggregated_topic, &gateway_group, OffsetReset::Latest)?;

    let aggregator = PriceAggregator::new(
        producer.clone(),
        cache.clone(),
        &config.bus.aggregated_topic,
        config.aggregator.window(),
    );
    supervisor.spawn("aggregator", aggregator.run(raw_subscriber));
    supervisor.spawn("fan-out", run_fan_out(hub.clone(), aggregated_subscriber));

    let connectors = &config.connectors;
    let polling = FeedSchedule {
        cycle: connectors.poll_interval(),
        symbol_refresh: connectors.symbol_refresh(),
    };

    if connectors.binance.enabled {
        let binance = Arc::new(BinanceConnector::new(&connectors.binance.rest_url)?);
        supervisor.spawn("binance", run_polling(binance, producer.clone(), config.bus.raw_topic.clone(), polling));
    }

    if connectors.kraken.enabled {
        let kraken = Arc::new(KrakenConnector::new(&connectors.kraken.rest_url)?);
        supervisor.spawn("kraken", run_polling(kraken, producer.clone(), config.bus.raw_topic.clone(), polling));
    }

    if connectors.coinbase.enabled {
        let ws_url = connectors.coinbase.ws_url.as_deref()
            .context("connectors.coinbase.ws_url must be set")?;
        let coinbase = CoinbaseConnector::new(&connectors.coinbase.rest_url, ws_url)?;
        let streaming = FeedSchedule {
            cycle: connectors.flush_interval(),
            symbol_refresh: connectors.symbol_refresh(),
        };

        supervisor.spawn(
            "coinbase-symbols",
            run_symbol_refresh(coinbase.symbol_source(), "coinbase".to_string(), streaming.symbol_refresh),
        );
        supervisor.spawn("coinbase", run_streaming(coinbase, producer.clone(), config.bus.raw_topic.clone(), streaming));
    }

    let state = Arc::new(GatewayState::new(hub, cache, &config.gateway.api_key));
    let gateway_config = config.gateway.clone();
    supervisor.spawn("gateway", async move {
        if let Err(e) = api::serve(&gateway_config, state).await {
            tracing::error!(error = %e, "Gateway stopped");
        }
    });

    let mut health = tokio::time::interval(HEALTH_CHECK_PERIOD);
    loop {
        tokio::select! {
            _ = health.tick() => {
                if let Err(e) = supervisor.check_health() {
                    tracing::error!(error = %e, remaining = supervisor.active_task_count(), "Pipeline degraded");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    tracing::info!("Shutting down");
    supervisor.shutdown_all();
    Ok(())
}
