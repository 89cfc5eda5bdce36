//! # wa-relay Service
//!
//! Binary entry point for the WhatsApp webhook relay.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Connects to Postgres, Redis and the message broker
//! - Starts the outgoing-message consumer
//! - Starts the HTTP server from wa-relay-api

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wa_relay_api::config::LoggingConfig;
use wa_relay_api::{
    start_server, AppState, DependencyHealthChecker, ServiceConfig, ServiceError, ServiceMetrics,
    LEGACY_ENV_OVERRIDES,
};
use wa_relay_core::adapters::{PostgresMerchantStore, RedisCache};
use wa_relay_core::{
    CacheAsideMerchantResolver, CacheStatusTracker, MetricsCollector, OutgoingConsumer,
    OutgoingDeliveryHandler, QueueJobPublisher, SendGateway, WebhookPipeline, WhatsAppSendGateway,
};
use wa_relay_queue::{QueueClient, QueueClientFactory, QueueConfig};

/// Everything the process runs, wired to live dependencies
struct Runtime {
    state: AppState,
    consumer: OutgoingConsumer,
}

#[tokio::main]
async fn main() {
    let loaded = load_configuration();
    init_tracing(loaded.as_ref().ok().map(|c| &c.logging));

    info!("Starting wa-relay service");

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };
    info!(config = ?service_config, "Configuration loaded");

    let runtime = match connect(&service_config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            let err = ServiceError::HealthCheckFailed {
                message: format!("{:#}", e),
            };
            error!(error = %err, "Could not reach a required dependency; aborting");
            std::process::exit(err.exit_code());
        }
    };

    let cancel = CancellationToken::new();
    let consumer = runtime.consumer;
    let consumer_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.run(cancel).await }
    });

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        "Starting HTTP server"
    );
    let result = start_server(runtime.state).await;

    cancel.cancel();
    if let Err(e) = consumer_task.await {
        error!(error = %e, "Outgoing consumer task failed");
    }

    if let Err(e) = result {
        error!(error = %e, "Server failed");
        std::process::exit(e.exit_code());
    }

    info!("wa-relay service stopped");
}

// ============================================================================
// Private helpers
// ============================================================================

fn init_tracing(logging: Option<&LoggingConfig>) {
    let level = logging.map(|l| l.level.as_str()).unwrap_or("info");
    let json = logging.map(|l| l.json_format).unwrap_or(false);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "wa_relay_service={level},wa_relay_api={level},wa_relay_core={level},wa_relay_queue={level},tower_http=debug"
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load configuration.
///
/// Sources, later ones overriding earlier ones:
///  1. /etc/wa-relay/service.yaml
///  2. ./config/service.yaml
///  3. the file named by RELAY_CONFIG_FILE (must exist when set)
///  4. RELAY__SECTION__KEY environment variables
///  5. the flat variables in [`LEGACY_ENV_OVERRIDES`] (PORT, REDIS_URL, ...)
fn load_configuration() -> anyhow::Result<ServiceConfig> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/wa-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var("RELAY_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            builder = builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }
    }

    builder = builder.add_source(config::Environment::with_prefix("RELAY").separator("__"));

    for (variable, key) in LEGACY_ENV_OVERRIDES {
        match std::env::var(variable) {
            Ok(value) if !value.is_empty() => {
                builder = builder
                    .set_override(*key, value)
                    .with_context(|| format!("invalid value in {}", variable))?;
            }
            _ => {}
        }
    }

    let config: ServiceConfig = builder
        .build()
        .context("failed to build configuration")?
        .try_deserialize()
        .context("could not deserialize service configuration")?;

    config.validate()?;
    Ok(config)
}

/// Connect every dependency and wire the pipeline, gateway and consumer
async fn connect(config: &ServiceConfig) -> anyhow::Result<Runtime> {
    let metrics = ServiceMetrics::new().context("failed to initialize metrics")?;
    let collector: Arc<dyn MetricsCollector> = metrics.clone();

    let store = Arc::new(
        PostgresMerchantStore::connect(&config.database.url, &config.database.store_config())
            .await
            .context("failed to connect to Postgres")?,
    );
    info!("Connected to Postgres");

    let cache = Arc::new(
        RedisCache::connect(&config.redis.url)
            .await
            .context("failed to connect to Redis")?,
    );
    info!("Connected to Redis");

    let processing_queue = config.queue.processing_queue_name()?;
    let outgoing_queue = config.queue.outgoing_queue_name()?;
    let queue_config = QueueConfig::from_url(
        &config.queue.url,
        vec![
            processing_queue.as_str().to_string(),
            outgoing_queue.as_str().to_string(),
        ],
    )
    .context("invalid queue configuration")?;
    let queue: Arc<dyn QueueClient> = Arc::from(
        QueueClientFactory::create_client(queue_config)
            .await
            .context("failed to connect to the message broker")?,
    );
    info!(provider = ?queue.provider_type(), "Connected to the message broker");

    let resolver = CacheAsideMerchantResolver::new(cache.clone(), store.clone(), collector.clone())
        .with_cache_ttl(Duration::from_secs(config.processing.merchant_cache_ttl_seconds))
        .with_query_timeout(config.database.query_timeout());
    let publisher = QueueJobPublisher::new(queue.clone(), processing_queue, collector.clone());
    let status_tracker = CacheStatusTracker::new(cache.clone(), collector.clone())
        .with_ttl(Duration::from_secs(config.processing.status_ttl_seconds));
    let pipeline = WebhookPipeline::new(
        Arc::new(resolver),
        Arc::new(publisher),
        Arc::new(status_tracker),
        collector.clone(),
    );

    let whatsapp = WhatsAppSendGateway::new(config.whatsapp.send_gateway_config())
        .context("failed to build the send API client")?;
    if !whatsapp.is_configured() {
        warn!("Send API credentials are not configured; outgoing messages will be requeued");
    }
    let gateway: Arc<dyn SendGateway> = Arc::new(whatsapp);

    let consumer = OutgoingConsumer::new(
        queue.clone(),
        outgoing_queue,
        OutgoingDeliveryHandler::new(gateway.clone()),
        collector,
    )
    .with_receive_timeout(chrono::Duration::seconds(
        config.queue.receive_timeout_seconds as i64,
    ));

    let health_checker = Arc::new(DependencyHealthChecker::new(cache, queue, store));

    let state = AppState::new(
        config.clone(),
        Arc::new(pipeline),
        gateway,
        health_checker,
        metrics,
    );

    Ok(Runtime { state, consumer })
}
