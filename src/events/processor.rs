use crate::error::{AppError, Result};
use crate::events::types::ParsedEnvelope;
use crate::models::{ProcessedEvent, ProcessingResult};
use crate::repositories::ProcessedEventRepository;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use tracing::warn;

/// A consumer-side handler for one event type. The handler receives the
/// connection of the open processing transaction: its store effects commit
/// or roll back together with the dedup record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        envelope: &ParsedEnvelope,
        payload: &serde_json::Value,
        conn: &mut PgConnection,
    ) -> Result<()>;
}

/// Idempotent guard around event handlers. Deduplicates deliveries per
/// consumer group through the processed-event table; the
/// `(event_id, consumer_group)` primary key guarantees a handler runs at
/// most once per group no matter how often the log redelivers.
pub struct EventProcessor {
    pool: PgPool,
    repo: ProcessedEventRepository,
}

impl EventProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: ProcessedEventRepository::new(pool.clone()),
            pool,
        }
    }

    /// Runs `handler` for the event unless this consumer group has already
    /// processed it. Returns false (without invoking the handler) on a
    /// duplicate. On handler failure the handler's work is rolled back, a
    /// FAILED record is committed durably, and the error is re-raised so the
    /// transport does not acknowledge the delivery.
    pub async fn process(
        &self,
        envelope: &ParsedEnvelope,
        payload: &serde_json::Value,
        consumer_group: &str,
        handler: &dyn EventHandler,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        if ProcessedEventRepository::exists_in(&mut tx, envelope.event_id, consumer_group).await? {
            return Ok(false);
        }

        match handler.handle(envelope, payload, &mut tx).await {
            Ok(()) => {
                let record = self.record(envelope, consumer_group, ProcessingResult::Success, None);
                match ProcessedEventRepository::insert_in(&mut *tx, &record).await {
                    Ok(()) => {
                        tx.commit().await.map_err(AppError::Database)?;
                        Ok(true)
                    }
                    // A concurrent consumer of the same group got there
                    // first; our handler effects roll back with the tx.
                    Err(e) if e.is_unique_violation() => {
                        tx.rollback().await.ok();
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(handler_err) => {
                tx.rollback().await.ok();

                let record = self.record(
                    envelope,
                    consumer_group,
                    ProcessingResult::Failed,
                    Some(handler_err.to_string()),
                );
                match self.repo.insert(&record).await {
                    Ok(()) => {}
                    Err(e) if e.is_unique_violation() => {}
                    Err(e) => {
                        warn!(
                            event_id = %envelope.event_id,
                            consumer_group,
                            "Failed to record FAILED processing attempt: {}", e
                        );
                    }
                }

                Err(handler_err)
            }
        }
    }

    /// Records the event as SKIPPED without invoking any handler, preventing
    /// future processing. Returns false if the pair was already recorded.
    pub async fn skip(
        &self,
        envelope: &ParsedEnvelope,
        consumer_group: &str,
        reason: &str,
    ) -> Result<bool> {
        let record = self.record(
            envelope,
            consumer_group,
            ProcessingResult::Skipped,
            Some(reason.to_string()),
        );
        match self.repo.insert(&record).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn record(
        &self,
        envelope: &ParsedEnvelope,
        consumer_group: &str,
        result: ProcessingResult,
        error_message: Option<String>,
    ) -> ProcessedEvent {
        ProcessedEvent {
            event_id: envelope.event_id,
            event_type: envelope.event_type.clone(),
            aggregate_type: envelope.aggregate_type.clone(),
            aggregate_id: envelope.aggregate_id.clone(),
            consumer_group: consumer_group.to_string(),
            result,
            error_message,
            processed_at: Utc::now(),
        }
    }
}
