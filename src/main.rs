use payment_ledger::api::{create_router, AppState};
use payment_ledger::config::Settings;
use payment_ledger::events::handlers::AuditLogHandler;
use payment_ledger::events::{
    ConsumerConfig, EventConsumer, EventProcessor, HandlerRegistry, KafkaEventPublisher,
    ProducerConfig,
};
use payment_ledger::observability::{
    init_logging, init_metrics, HealthChecker, LogConfig, LogFormat,
};
use payment_ledger::services::OutboxDispatcher;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration first (needed for log level). A bad config is a
    // fatal startup failure.
    let settings = Settings::new()?;

    // Initialize structured logging
    let log_config = LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(
            std::env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .as_str(),
        ),
        include_target: true,
        include_file: false,
        include_line: false,
    };
    init_logging(&log_config);

    // Initialize Prometheus metrics
    let metrics_handle = init_metrics();
    info!("Configuration loaded, metrics initialized");

    // Connect to PostgreSQL. The store is the one hard dependency: failure
    // here exits non-zero.
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;

    info!("Database connection established");

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    // Connect to Redis. The cache is advisory: a dead cache degrades latency
    // only, so startup proceeds on failure.
    info!("Connecting to Redis at {}...", settings.redis.url);
    let redis_client = redis::Client::open(settings.redis.url.clone())?;
    match redis_client.get_multiplexed_async_connection().await {
        Ok(mut con) => match redis::cmd("PING").query_async::<_, ()>(&mut con).await {
            Ok(()) => info!("Redis connection established"),
            Err(e) => warn!("Redis PING failed: {}. Continuing without cache.", e),
        },
        Err(e) => warn!("Redis unavailable: {}. Continuing without cache.", e),
    }

    // Connect to Kafka (with timeout, preserve client). The outbox keeps
    // events durable while the broker is away, so this too is non-fatal.
    info!("Checking Kafka connection...");
    use rskafka::client::ClientBuilder;

    let brokers: Vec<String> = settings
        .kafka
        .brokers
        .split(',')
        .map(|b| b.trim().to_string())
        .collect();
    let kafka_client = match tokio::time::timeout(
        Duration::from_secs(3),
        ClientBuilder::new(brokers.clone()).build(),
    )
    .await
    {
        Ok(Ok(client)) => {
            info!("Kafka client created successfully");
            Some(Arc::new(client))
        }
        Ok(Err(e)) => {
            warn!("Kafka connection failed: {}. Continuing without Kafka.", e);
            None
        }
        Err(_) => {
            warn!("Kafka connection timed out. Continuing without Kafka.");
            None
        }
    };

    let topic = format!("{}.events", settings.kafka.topic_prefix);

    // Start the outbox dispatcher
    if settings.outbox.enabled {
        if let Some(client) = &kafka_client {
            let publisher = Arc::new(KafkaEventPublisher::new(
                client.clone(),
                ProducerConfig { brokers },
            ));
            let dispatcher = OutboxDispatcher::new(
                pool.clone(),
                publisher,
                topic.clone(),
                settings.outbox.clone(),
            );
            tokio::spawn(dispatcher.run());
            info!("Outbox dispatcher started for topic {}", topic);
        } else {
            warn!("Outbox dispatcher idle: no Kafka client. Events accumulate until restart.");
        }
    } else {
        info!("Outbox dispatcher disabled by configuration");
    }

    // Start the inbound consumer
    if settings.consumer.enabled {
        if let Some(client) = &kafka_client {
            let audit: Arc<dyn payment_ledger::events::EventHandler> = Arc::new(AuditLogHandler);
            let registry = HandlerRegistry::new()
                .register("PAYMENT_CREATED", audit.clone())
                .register("PAYMENT_AUTHORIZED", audit.clone())
                .register("PAYMENT_SETTLED", audit.clone())
                .register("PAYMENT_FAILED", audit);

            let consumer = EventConsumer::new(
                client.clone(),
                EventProcessor::new(pool.clone()),
                registry,
                ConsumerConfig {
                    topics: settings.consumer.topics.clone(),
                    group_id: settings.consumer.group_id.clone(),
                    ..ConsumerConfig::default()
                },
            );
            tokio::spawn(async move {
                if let Err(e) = consumer.run().await {
                    tracing::error!("Consumer stopped with error: {}", e);
                }
            });
            info!("Consumer group '{}' started", settings.consumer.group_id);
        } else {
            warn!("Consumer disabled: no Kafka client");
        }
    }

    // Create health checker
    let health_checker = Arc::new(HealthChecker::new(
        pool.clone(),
        redis_client.clone(),
        kafka_client.clone(),
    ));

    // Create application state with metrics handle and health checker
    let state = AppState::new(pool, redis_client, kafka_client, &settings.idempotency)
        .with_metrics(metrics_handle)
        .with_health_checker(health_checker);

    // Create API router
    let app = create_router(state);

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", settings.application.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
