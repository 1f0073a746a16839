use crate::error::{AppError, Result};
use crate::models::{PaymentRecord, PaymentStatus};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = "id, amount, currency, from_account_id, to_account_id, status, failure_reason, idempotency_key, ledger_transaction_id, created_at, updated_at";

/// Repository for PaymentRecord rows. Rows are created by admission and
/// mutated only through status updates; payments are never deleted.
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a payment inside an open transaction. The unique constraint on
    /// `idempotency_key` is the durable dedup guarantor: the loser of a
    /// concurrent admission race sees a unique violation here.
    pub async fn insert_in(
        conn: &mut PgConnection,
        record: &PaymentRecord,
    ) -> Result<PaymentRecord> {
        let row = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            INSERT INTO payments ({PAYMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(record.id)
        .bind(record.amount)
        .bind(record.currency)
        .bind(record.from_account_id)
        .bind(record.to_account_id)
        .bind(record.status)
        .bind(&record.failure_reason)
        .bind(&record.idempotency_key)
        .bind(record.ledger_transaction_id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a payment by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE id = $1
            "#,
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds a payment by its idempotency key. This is the authoritative
    /// fallback of the idempotency resolver.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE idempotency_key = $1
            "#,
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Loads a payment with a row lock inside an open transaction, so that
    /// concurrent settlement attempts serialize on the row.
    pub async fn find_by_id_for_update_in(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE id = $1
            FOR UPDATE
            "#,
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Updates status (and failure reason) inside an open transaction.
    pub async fn update_status_in(
        conn: &mut PgConnection,
        id: Uuid,
        status: PaymentStatus,
        failure_reason: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<PaymentRecord> {
        let row = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            UPDATE payments
            SET status = $2, failure_reason = $3, updated_at = $4
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(status)
        .bind(failure_reason)
        .bind(updated_at)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Binds the ledger transaction to the payment and moves it to SETTLED in
    /// one statement, inside an open transaction. The row's check constraint
    /// and the unique index on `ledger_transaction_id` make a partial or
    /// double binding impossible.
    pub async fn bind_settlement_in(
        conn: &mut PgConnection,
        id: Uuid,
        ledger_transaction_id: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<PaymentRecord> {
        let row = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            UPDATE payments
            SET status = 'SETTLED', ledger_transaction_id = $2, updated_at = $3
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(ledger_transaction_id)
        .bind(updated_at)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Counts payments holding the given idempotency key. Used by tests to
    /// assert the at-most-one invariant.
    pub async fn count_by_idempotency_key(&self, key: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM payments WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }
}
