use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account types following double-entry bookkeeping principles.
/// Each type has a "normal balance" that determines how debits and credits
/// affect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Assets: resources owned. Normal balance is DEBIT.
    Asset,
    /// Liabilities: amounts owed. Normal balance is CREDIT.
    Liability,
    /// Equity: residual interest. Normal balance is CREDIT.
    Equity,
}

impl AccountType {
    /// Returns true if the account type has a normal debit balance.
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset)
    }

    /// Returns true if the account type has a normal credit balance.
    pub fn is_credit_normal(&self) -> bool {
        matches!(self, AccountType::Liability | AccountType::Equity)
    }
}

/// A ledger account. Accounts are append-only: they are never deleted while
/// any ledger entry or payment references them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub account_number: String,
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account with the given number and type.
    pub fn new(account_number: String, account_type: AccountType) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_number,
            account_type,
            created_at: Utc::now(),
        }
    }
}
