use crate::error::{map_ledger_db_error, AppError, Result};
use crate::models::{EntryType, LedgerEntry, LedgerTransaction};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for ledger transactions and entries. Entries are append-only;
/// no update or delete is exposed, corrections are new reversing
/// transactions.
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the transaction row inside an open transaction.
    pub async fn insert_transaction_in(
        conn: &mut PgConnection,
        transaction: &LedgerTransaction,
    ) -> Result<LedgerTransaction> {
        let row = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            INSERT INTO transactions (id, description, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, description, created_at
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.description)
        .bind(transaction.created_at)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Inserts a single entry inside an open transaction. The sequence number
    /// is assigned by the store; the deferred balance constraint rechecks the
    /// transaction at commit.
    pub async fn insert_entry_in(
        conn: &mut PgConnection,
        transaction_id: Uuid,
        account_id: Uuid,
        amount: Decimal,
        entry_type: EntryType,
        description: &str,
    ) -> Result<LedgerEntry> {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (id, transaction_id, account_id, amount, entry_type, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id, transaction_id, account_id, amount, entry_type, description, sequence_number, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(transaction_id)
        .bind(account_id)
        .bind(amount)
        .bind(entry_type)
        .bind(description)
        .fetch_one(conn)
        .await
        .map_err(map_ledger_db_error)?;

        Ok(row)
    }

    /// Finds a ledger transaction by ID.
    pub async fn find_transaction(&self, id: Uuid) -> Result<Option<LedgerTransaction>> {
        let row = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            SELECT id, description, created_at
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds all entries for a transaction, in posting order.
    pub async fn entries_by_transaction(&self, transaction_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, transaction_id, account_id, amount, entry_type, description, sequence_number, created_at
            FROM ledger_entries
            WHERE transaction_id = $1
            ORDER BY sequence_number
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Finds entries for an account with pagination, newest first.
    pub async fn entries_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, transaction_id, account_id, amount, entry_type, description, sequence_number, created_at
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY sequence_number DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Counts entries for an account for pagination.
    pub async fn count_by_account(&self, account_id: Uuid) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM ledger_entries
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

    /// Derives the balance of an account from its entries. The sign of each
    /// entry depends on the account type: ASSET accounts grow with debits,
    /// LIABILITY and EQUITY accounts grow with credits. Balances are never
    /// stored.
    pub async fn balance_of(&self, account_id: Uuid) -> Result<Decimal> {
        let row: (Option<Decimal>,) = sqlx::query_as(
            r#"
            SELECT SUM(
                CASE
                    WHEN a.account_type = 'ASSET' THEN
                        CASE WHEN e.entry_type = 'DEBIT' THEN e.amount ELSE -e.amount END
                    ELSE
                        CASE WHEN e.entry_type = 'CREDIT' THEN e.amount ELSE -e.amount END
                END
            )
            FROM ledger_entries e
            JOIN accounts a ON a.id = e.account_id
            WHERE e.account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0.unwrap_or(Decimal::ZERO))
    }

    /// Returns the debit and credit sums for a transaction. Used to verify
    /// the balance invariant from the outside.
    pub async fn transaction_sums(&self, transaction_id: Uuid) -> Result<(Decimal, Decimal)> {
        let row: (Decimal, Decimal) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN entry_type = 'DEBIT' THEN amount ELSE 0 END), 0) AS debits,
                COALESCE(SUM(CASE WHEN entry_type = 'CREDIT' THEN amount ELSE 0 END), 0) AS credits
            FROM ledger_entries
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
