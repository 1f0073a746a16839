use axum::{
    routing::{get, post},
    Router,
};
use http::HeaderName;
use metrics_exporter_prometheus::PrometheusHandle;
use rskafka::client::Client as KafkaClient;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::IdempotencySettings;
use crate::idempotency::IdempotencyResolver;
use crate::observability::HealthChecker;
use crate::services::{AccountService, LedgerService, PaymentService, SettlementService};

/// Correlation header: generated when absent, echoed on every response, and
/// propagated into the request's trace span.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Application state shared across handlers. Collaborators are plain structs
/// wired once at startup; there is no container.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis_client: redis::Client,
    pub kafka_client: Option<Arc<KafkaClient>>,
    pub payments: Arc<PaymentService>,
    pub settlements: Arc<SettlementService>,
    pub accounts: Arc<AccountService>,
    pub ledger: Arc<LedgerService>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Option<Arc<HealthChecker>>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis_client: redis::Client,
        kafka_client: Option<Arc<KafkaClient>>,
        idempotency: &IdempotencySettings,
    ) -> Self {
        let resolver = Arc::new(IdempotencyResolver::new(
            pool.clone(),
            redis_client.clone(),
            idempotency,
        ));

        Self {
            payments: Arc::new(PaymentService::new(pool.clone(), resolver)),
            settlements: Arc::new(SettlementService::new(pool.clone())),
            accounts: Arc::new(AccountService::new(pool.clone())),
            ledger: Arc::new(LedgerService::new(pool.clone())),
            pool,
            redis_client,
            kafka_client,
            metrics_handle: None,
            health_checker: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Adds health checker to the state.
    pub fn with_health_checker(mut self, checker: Arc<HealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }

    /// Returns true if Kafka is connected.
    pub fn kafka_connected(&self) -> bool {
        self.kafka_client.is_some()
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let correlation_header = HeaderName::from_static(CORRELATION_ID_HEADER);

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Account endpoints
        .route("/api/accounts", post(handlers::create_account))
        .route("/api/accounts/:id", get(handlers::get_account))
        .route("/api/accounts/:id/balance", get(handlers::get_account_balance))
        .route("/api/accounts/:id/ledger", get(handlers::get_account_ledger))
        // Payment endpoints
        .route("/api/payments", post(handlers::create_payment))
        .route("/api/payments/:id", get(handlers::get_payment))
        .route("/api/payments/:id/authorize", post(handlers::authorize_payment))
        .route("/api/payments/:id/fail", post(handlers::fail_payment))
        .route("/api/payments/:id/settle", post(handlers::settle_payment))
        // Request deadline: on expiry the in-flight store transaction is
        // dropped and rolls back with no side effects.
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(PropagateRequestIdLayer::new(correlation_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(correlation_header, MakeRequestUuid))
        .with_state(state)
}
