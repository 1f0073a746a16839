use crate::config::OutboxSettings;
use crate::error::{AppError, Result};
use crate::events::producer::EventPublisher;
use crate::observability::get_metrics;
use crate::repositories::OutboxRepository;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Counters for a single dispatcher tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Rows skipped because an earlier event of the same aggregate failed in
    /// this tick (head-of-line ordering).
    pub deferred: usize,
}

/// Background worker that drains the outbox into the message log with
/// at-least-once delivery. Multiple instances may run concurrently: the
/// SKIP LOCKED lease keeps them off each other's rows, and oldest-first
/// draining plus the aggregate partition key preserves per-aggregate order.
pub struct OutboxDispatcher {
    pool: PgPool,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
    settings: OutboxSettings,
}

impl OutboxDispatcher {
    pub fn new(
        pool: PgPool,
        publisher: Arc<dyn EventPublisher>,
        topic: impl Into<String>,
        settings: OutboxSettings,
    ) -> Self {
        Self {
            pool,
            publisher,
            topic: topic.into(),
            settings,
        }
    }

    /// Runs the poll loop until the task is aborted.
    pub async fn run(self) {
        info!(
            topic = %self.topic,
            poll_interval_ms = self.settings.poll_interval_ms,
            "Outbox dispatcher started"
        );

        let mut interval =
            tokio::time::interval(Duration::from_millis(self.settings.poll_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(stats) => {
                    if stats.published > 0 || stats.failed > 0 {
                        debug!(
                            published = stats.published,
                            failed = stats.failed,
                            dead_lettered = stats.dead_lettered,
                            "Outbox tick complete"
                        );
                    }
                }
                Err(e) => {
                    // A failed tick is not fatal; the rows are still durable
                    // and the next poll retries.
                    error!("Outbox tick failed: {}", e);
                }
            }
        }
    }

    /// One dispatch pass: lease a batch, deliver, mark. The lease
    /// transaction stays open for the whole batch so peers skip these rows;
    /// marks land in the same transaction and become visible at commit. A
    /// crash mid-batch leaves every row unpublished - redelivery, never
    /// loss.
    pub async fn tick(&self) -> Result<DispatchStats> {
        let mut stats = DispatchStats::default();

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let batch =
            OutboxRepository::lease_unpublished_in(&mut tx, self.settings.batch_size).await?;
        if batch.is_empty() {
            return Ok(stats);
        }

        // Aggregates with a failed delivery this tick; their later rows must
        // not jump ahead of the failed one.
        let mut blocked: HashSet<Uuid> = HashSet::new();

        for event in batch {
            if blocked.contains(&event.aggregate_id) {
                stats.deferred += 1;
                continue;
            }

            if event.retry_count >= self.settings.max_retries {
                stats.dead_lettered += 1;
                get_metrics().record_outbox_dead_letter(&event.event_type);
                continue;
            }

            let payload = serde_json::to_vec(&event.payload)
                .map_err(|e| anyhow::anyhow!("failed to encode outbox payload: {}", e))?;
            let key = event.aggregate_id.to_string();

            let delivery = timeout(
                Duration::from_millis(self.settings.send_timeout_ms),
                self.publisher.publish(&self.topic, &key, payload),
            )
            .await;

            match delivery {
                Ok(Ok(_offset)) => {
                    OutboxRepository::mark_published_in(&mut tx, event.id, Utc::now()).await?;
                    stats.published += 1;
                    get_metrics().record_outbox_published(&event.event_type);
                }
                Ok(Err(e)) => {
                    warn!(event_id = %event.id, "Outbox delivery failed: {}", e);
                    OutboxRepository::record_failure_in(&mut tx, event.id, &e.to_string())
                        .await?;
                    blocked.insert(event.aggregate_id);
                    stats.failed += 1;
                    get_metrics().record_outbox_failure(&event.event_type);
                }
                Err(_elapsed) => {
                    warn!(event_id = %event.id, "Outbox delivery timed out");
                    OutboxRepository::record_failure_in(&mut tx, event.id, "delivery timed out")
                        .await?;
                    blocked.insert(event.aggregate_id);
                    stats.failed += 1;
                    get_metrics().record_outbox_failure(&event.event_type);
                }
            }
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_stats_default() {
        let stats = DispatchStats::default();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.dead_lettered, 0);
        assert_eq!(stats.deferred, 0);
    }
}
