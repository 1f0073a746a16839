use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::AccountType;

/// Entry type for double-entry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entry_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// Debit entry - increases assets, decreases liabilities/equity.
    Debit,
    /// Credit entry - decreases assets, increases liabilities/equity.
    Credit,
}

impl EntryType {
    /// Returns the opposite entry type.
    pub fn opposite(&self) -> Self {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }
}

/// A single immutable entry in the ledger. Every transaction posts at least
/// one debit and one credit whose sums must balance exactly; entries are
/// never updated or deleted, corrections are new reversing transactions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    /// Amount of the entry (always positive, direction comes from entry_type).
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub description: String,
    /// Store-assigned, strictly increasing with insertion order.
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Returns the effect of this entry on the balance of an account of the
    /// given type. ASSET accounts grow with debits; LIABILITY and EQUITY
    /// accounts grow with credits.
    pub fn balance_effect(&self, account_type: AccountType) -> Decimal {
        match (account_type.is_debit_normal(), self.entry_type) {
            (true, EntryType::Debit) => self.amount,
            (true, EntryType::Credit) => -self.amount,
            (false, EntryType::Debit) => -self.amount,
            (false, EntryType::Credit) => self.amount,
        }
    }
}

/// One side of a transaction about to be posted: the account it touches, the
/// positive amount, and a free-form description.
#[derive(Debug, Clone)]
pub struct EntryLine {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub description: String,
}

impl EntryLine {
    pub fn new(account_id: Uuid, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account_id,
            amount,
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(entry_type: EntryType, amount: Decimal) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            amount,
            entry_type,
            description: "test".to_string(),
            sequence_number: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_type_opposite() {
        assert_eq!(EntryType::Debit.opposite(), EntryType::Credit);
        assert_eq!(EntryType::Credit.opposite(), EntryType::Debit);
    }

    #[test]
    fn test_balance_effect_asset() {
        let debit = entry(EntryType::Debit, dec!(100));
        let credit = entry(EntryType::Credit, dec!(100));
        assert_eq!(debit.balance_effect(AccountType::Asset), dec!(100));
        assert_eq!(credit.balance_effect(AccountType::Asset), dec!(-100));
    }

    #[test]
    fn test_balance_effect_liability_and_equity() {
        let debit = entry(EntryType::Debit, dec!(40));
        let credit = entry(EntryType::Credit, dec!(40));
        assert_eq!(debit.balance_effect(AccountType::Liability), dec!(-40));
        assert_eq!(credit.balance_effect(AccountType::Liability), dec!(40));
        assert_eq!(debit.balance_effect(AccountType::Equity), dec!(-40));
        assert_eq!(credit.balance_effect(AccountType::Equity), dec!(40));
    }

    #[test]
    fn test_entry_serialization() {
        let e = entry(EntryType::Debit, dec!(12.5000));
        let json = serde_json::to_string(&e).unwrap();
        let back: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.amount, dec!(12.5000));
        assert_eq!(back.entry_type, EntryType::Debit);
    }
}
