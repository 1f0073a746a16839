use crate::error::{AppError, Result};
use crate::models::Account;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for Account rows. Accounts are append-only: there are no
/// update or delete operations.
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new account.
    pub async fn create(&self, account: &Account) -> Result<Account> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, account_number, account_type, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, account_number, account_type, created_at
            "#,
        )
        .bind(account.id)
        .bind(&account.account_number)
        .bind(account.account_type)
        .bind(account.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds an account by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, account_number, account_type, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Finds an account by its unique account number.
    pub async fn find_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, account_number, account_type, created_at
            FROM accounts
            WHERE account_number = $1
            "#,
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Loads the given accounts inside an open transaction. Used by the
    /// ledger engine to verify that every referenced account exists before
    /// posting entries.
    pub async fn find_all_in(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, account_number, account_type, created_at
            FROM accounts
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
