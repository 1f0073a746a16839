use crate::error::{AppError, Result};
use crate::models::OutboxEvent;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

const OUTBOX_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, payload, sequence_number, retry_count, last_error, created_at, published_at";

/// An event about to be appended to the outbox.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: Uuid,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Repository for the transactional outbox. `append` takes an open
/// transaction handle as an explicit argument: an outbox row only makes
/// sense inside the business transaction whose effects it describes, and if
/// that transaction rolls back the row disappears with it.
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends an event inside the given business transaction. The sequence
    /// number is assigned by the store and strictly increases with insertion
    /// order, which is the basis of per-aggregate ordering.
    pub async fn append(
        tx: &mut Transaction<'_, Postgres>,
        event: NewOutboxEvent,
    ) -> Result<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(&format!(
            r#"
            INSERT INTO outbox_events (id, aggregate_type, aggregate_id, event_type, payload, retry_count, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, NOW())
            RETURNING {OUTBOX_COLUMNS}
            "#,
        ))
        .bind(event.id)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .fetch_one(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Leases up to `limit` unpublished rows, oldest first, skipping rows
    /// already locked by a peer dispatcher. Must run inside the lease
    /// transaction; the locks are held until it commits.
    pub async fn lease_unpublished_in(
        conn: &mut PgConnection,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxEvent>(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS}
            FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY sequence_number ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        ))
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Marks an event as published. `published_at` is set exactly once.
    pub async fn mark_published_in(
        conn: &mut PgConnection,
        id: Uuid,
        published_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET published_at = $2, last_error = NULL
            WHERE id = $1 AND published_at IS NULL
            "#,
        )
        .bind(id)
        .bind(published_at)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Records a delivery failure: bumps the retry counter and stores the
    /// error. The row stays unpublished and is retried on a later poll.
    pub async fn record_failure_in(
        conn: &mut PgConnection,
        id: Uuid,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET retry_count = retry_count + 1, last_error = $2
            WHERE id = $1 AND published_at IS NULL
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Counts unpublished rows (pending plus dead-lettered).
    pub async fn count_unpublished(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM outbox_events WHERE published_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

    /// Lists dead-lettered rows for operator inspection.
    pub async fn find_dead_letters(&self, max_retries: i32, limit: i64) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxEvent>(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS}
            FROM outbox_events
            WHERE published_at IS NULL AND retry_count >= $1
            ORDER BY sequence_number ASC
            LIMIT $2
            "#,
        ))
        .bind(max_retries)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Resets the retry counter of a dead-lettered row so the dispatcher
    /// picks it up again. Operator-driven recovery.
    pub async fn reset_retries(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET retry_count = 0, last_error = NULL
            WHERE id = $1 AND published_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Reaps published rows older than the retention horizon.
    pub async fn delete_published_before(&self, horizon: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM outbox_events
            WHERE published_at IS NOT NULL AND published_at < $1
            "#,
        )
        .bind(horizon)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
