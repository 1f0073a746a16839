use crate::models::PaymentStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application-level error for the payment ledger.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("missing required header: {0}")]
    MissingHeader(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid payment transition from {from:?} to {to:?}")]
    InvalidTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("unbalanced ledger transaction: debits {debits} != credits {credits}")]
    Unbalanced { debits: Decimal, credits: Decimal },

    #[error("ledger constraint violation: {0}")]
    LedgerConstraint(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("redis error: {0}")]
    Redis(redis::RedisError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the underlying database error is a unique-constraint
    /// violation (PostgreSQL SQLSTATE 23505). The admission path uses this to
    /// detect the loser of a duplicate-key race; the consumer framework uses
    /// it to treat a processed-event conflict as already-processed.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }

    /// True when the error is retryable by the caller with the same
    /// idempotency key (transient store or cache trouble, never a validation
    /// or state-machine rejection).
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Redis(_))
    }
}

/// Maps a database error raised by the deferred ledger-balance trigger
/// (SQLSTATE 23514, check_violation) onto the ledger constraint kind so the
/// caller sees a stable name rather than a raw driver error.
pub fn map_ledger_db_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db) = err {
        if db.code().as_deref() == Some("23514") {
            return AppError::LedgerConstraint(db.message().to_string());
        }
    }
    AppError::Database(err)
}
