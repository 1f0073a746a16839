use crate::config::IdempotencySettings;
use crate::error::{AppError, Result};
use crate::observability::get_metrics;
use crate::repositories::PaymentRepository;
use redis::AsyncCommands;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

/// Maps a client dedup key to the payment it already produced. Resolution is
/// two-tiered: a Redis fast path, then the authoritative lookup against the
/// payments table. The cache is only a hint - every cache failure is logged
/// and swallowed, and the unique constraint on `payments.idempotency_key`
/// remains the durable guarantor.
pub struct IdempotencyResolver {
    redis: redis::Client,
    payments: PaymentRepository,
    key_prefix: String,
    ttl_seconds: i64,
}

impl IdempotencyResolver {
    pub fn new(pool: PgPool, redis: redis::Client, settings: &IdempotencySettings) -> Self {
        Self {
            redis,
            payments: PaymentRepository::new(pool),
            key_prefix: settings.key_prefix.clone(),
            ttl_seconds: settings.effective_ttl_seconds(),
        }
    }

    fn cache_key(&self, dedup_key: &str) -> String {
        format!("{}:{}", self.key_prefix, dedup_key)
    }

    /// Resolves a dedup key to a prior payment id, if one exists.
    pub async fn resolve(&self, dedup_key: &str) -> Result<Option<Uuid>> {
        match self.cache_get(dedup_key).await {
            Ok(Some(payment_id)) => {
                debug!(dedup_key, "Idempotency cache hit");
                get_metrics().record_cache_operation("get", true);
                return Ok(Some(payment_id));
            }
            Ok(None) => {
                get_metrics().record_cache_operation("get", true);
            }
            Err(e) => {
                get_metrics().record_cache_operation("get", false);
                warn!(dedup_key, "Idempotency cache read failed, falling back to store: {}", e);
            }
        }

        if let Some(record) = self.payments.find_by_idempotency_key(dedup_key).await? {
            // Opportunistic write-through; a failure here costs a future
            // cache miss, nothing more.
            if let Err(e) = self.cache_set(dedup_key, record.id).await {
                debug!(dedup_key, "Idempotency cache write-through failed: {}", e);
            }
            return Ok(Some(record.id));
        }

        Ok(None)
    }

    /// Best-effort cache write after a payment row has been committed. The
    /// durable mapping was already established by the unique constraint.
    pub async fn remember(&self, dedup_key: &str, payment_id: Uuid) {
        match self.cache_set(dedup_key, payment_id).await {
            Ok(()) => get_metrics().record_cache_operation("set", true),
            Err(e) => {
                get_metrics().record_cache_operation("set", false);
                debug!(dedup_key, "Idempotency cache remember failed: {}", e);
            }
        }
    }

    async fn cache_get(&self, dedup_key: &str) -> Result<Option<Uuid>> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let value: Option<String> = conn
            .get(self.cache_key(dedup_key))
            .await
            .map_err(AppError::Redis)?;

        // An unparseable cached value is treated as a miss; the store
        // fallback will repair it.
        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    async fn cache_set(&self, dedup_key: &str, payment_id: Uuid) -> Result<()> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let _: () = conn
            .set_ex(
                self.cache_key(dedup_key),
                payment_id.to_string(),
                self.ttl_seconds as u64,
            )
            .await
            .map_err(AppError::Redis)?;

        Ok(())
    }
}
