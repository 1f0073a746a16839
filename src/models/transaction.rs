use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A ledger transaction: the logical group under which a balanced set of
/// debit and credit entries is posted. The row itself carries no amounts;
/// amounts live on the entries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(description: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            description,
            created_at: Utc::now(),
        }
    }
}
