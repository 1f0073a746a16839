use crate::error::{AppError, Result};
use crate::models::{ProcessedEvent, ProcessingResult};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const PROCESSED_COLUMNS: &str = "event_id, event_type, aggregate_type, aggregate_id, consumer_group, result, error_message, processed_at";

/// Repository for per-consumer-group event dedup records. The primary key
/// `(event_id, consumer_group)` is the single source of truth for consumer
/// dedup.
pub struct ProcessedEventRepository {
    pool: PgPool,
}

impl ProcessedEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Checks whether a `(event_id, consumer_group)` pair has already been
    /// recorded, inside an open transaction.
    pub async fn exists_in(
        conn: &mut PgConnection,
        event_id: Uuid,
        consumer_group: &str,
    ) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM processed_events
                WHERE event_id = $1 AND consumer_group = $2
            )
            "#,
        )
        .bind(event_id)
        .bind(consumer_group)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

    /// Inserts a processing record inside an open transaction. A primary-key
    /// conflict surfaces as a unique violation; callers treat it as
    /// already-processed.
    pub async fn insert_in(conn: &mut PgConnection, record: &ProcessedEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type, aggregate_type, aggregate_id, consumer_group, result, error_message, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.event_id)
        .bind(&record.event_type)
        .bind(&record.aggregate_type)
        .bind(&record.aggregate_id)
        .bind(&record.consumer_group)
        .bind(record.result)
        .bind(&record.error_message)
        .bind(record.processed_at)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Inserts a processing record on its own connection, outside any caller
    /// transaction. Used to durably record a FAILED attempt after the
    /// handler's work has been rolled back.
    pub async fn insert(&self, record: &ProcessedEvent) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        Self::insert_in(&mut conn, record).await
    }

    /// Finds the record for a `(event_id, consumer_group)` pair.
    pub async fn find(
        &self,
        event_id: Uuid,
        consumer_group: &str,
    ) -> Result<Option<ProcessedEvent>> {
        let row = sqlx::query_as::<_, ProcessedEvent>(&format!(
            r#"
            SELECT {PROCESSED_COLUMNS}
            FROM processed_events
            WHERE event_id = $1 AND consumer_group = $2
            "#,
        ))
        .bind(event_id)
        .bind(consumer_group)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds every group's record for one event.
    pub async fn find_by_event(&self, event_id: Uuid) -> Result<Vec<ProcessedEvent>> {
        let rows = sqlx::query_as::<_, ProcessedEvent>(&format!(
            r#"
            SELECT {PROCESSED_COLUMNS}
            FROM processed_events
            WHERE event_id = $1
            ORDER BY consumer_group
            "#,
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Counts records by result for a consumer group.
    pub async fn count_by_result(
        &self,
        consumer_group: &str,
        result: ProcessingResult,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM processed_events
            WHERE consumer_group = $1 AND result = $2
            "#,
        )
        .bind(consumer_group)
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

    /// Deletes the record for a pair. Operator tooling for purging a poison
    /// marker after the upstream defect is fixed.
    pub async fn delete(&self, event_id: Uuid, consumer_group: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM processed_events
            WHERE event_id = $1 AND consumer_group = $2
            "#,
        )
        .bind(event_id)
        .bind(consumer_group)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
