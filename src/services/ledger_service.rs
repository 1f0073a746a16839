use crate::error::{map_ledger_db_error, AppError, Result};
use crate::models::ledger_entry::EntryLine;
use crate::models::{EntryType, LedgerEntry, LedgerTransaction};
use crate::repositories::{AccountRepository, LedgerRepository};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Request to post a balanced set of entries as one ledger transaction.
#[derive(Debug, Clone)]
pub struct PostTransactionRequest {
    pub description: String,
    pub debits: Vec<EntryLine>,
    pub credits: Vec<EntryLine>,
}

/// A posted transaction together with its entries.
#[derive(Debug, Clone)]
pub struct PostedTransaction {
    pub transaction: LedgerTransaction,
    pub entries: Vec<LedgerEntry>,
}

/// The double-entry ledger engine. Posts balanced debit/credit batches and
/// derives balances from entries; nothing here ever updates or deletes an
/// entry.
pub struct LedgerService {
    pool: PgPool,
    ledger_repo: LedgerRepository,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger_repo: LedgerRepository::new(pool.clone()),
            pool,
        }
    }

    /// Validates a posting request before anything touches the store: both
    /// sides non-empty, every amount strictly positive, and the sides equal
    /// under exact decimal comparison.
    pub fn validate(request: &PostTransactionRequest) -> Result<()> {
        if request.debits.is_empty() || request.credits.is_empty() {
            return Err(AppError::Validation(
                "a ledger transaction needs at least one debit and one credit".to_string(),
            ));
        }

        for line in request.debits.iter().chain(request.credits.iter()) {
            if line.amount <= Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "entry amount must be positive, got {} for account {}",
                    line.amount, line.account_id
                )));
            }
        }

        let debits: Decimal = request.debits.iter().map(|l| l.amount).sum();
        let credits: Decimal = request.credits.iter().map(|l| l.amount).sum();
        if debits != credits {
            return Err(AppError::Unbalanced { debits, credits });
        }

        Ok(())
    }

    /// Posts the transaction inside an already-open store transaction so the
    /// caller can bundle it with other work (the settlement coordinator
    /// does). The deferred balance constraint rechecks the sums when the
    /// caller commits.
    pub async fn post_transaction_in(
        tx: &mut Transaction<'_, Postgres>,
        request: &PostTransactionRequest,
    ) -> Result<PostedTransaction> {
        Self::validate(request)?;

        let mut account_ids: Vec<Uuid> = request
            .debits
            .iter()
            .chain(request.credits.iter())
            .map(|l| l.account_id)
            .collect();
        account_ids.sort_unstable();
        account_ids.dedup();

        let accounts = AccountRepository::find_all_in(&mut *tx, &account_ids).await?;
        if accounts.len() != account_ids.len() {
            let known: Vec<Uuid> = accounts.iter().map(|a| a.id).collect();
            let missing = account_ids
                .iter()
                .find(|id| !known.contains(id))
                .copied()
                .unwrap_or_default();
            return Err(AppError::NotFound(format!("account '{}' not found", missing)));
        }

        let transaction = LedgerRepository::insert_transaction_in(
            &mut *tx,
            &LedgerTransaction::new(request.description.clone()),
        )
        .await?;

        let mut entries = Vec::with_capacity(request.debits.len() + request.credits.len());
        for line in &request.debits {
            let entry = LedgerRepository::insert_entry_in(
                &mut *tx,
                transaction.id,
                line.account_id,
                line.amount,
                EntryType::Debit,
                &line.description,
            )
            .await?;
            entries.push(entry);
        }
        for line in &request.credits {
            let entry = LedgerRepository::insert_entry_in(
                &mut *tx,
                transaction.id,
                line.account_id,
                line.amount,
                EntryType::Credit,
                &line.description,
            )
            .await?;
            entries.push(entry);
        }

        Ok(PostedTransaction {
            transaction,
            entries,
        })
    }

    /// Posts a balanced transaction in its own store transaction.
    pub async fn post_transaction(
        &self,
        request: PostTransactionRequest,
    ) -> Result<PostedTransaction> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let posted = Self::post_transaction_in(&mut tx, &request).await?;
        tx.commit().await.map_err(map_ledger_db_error)?;
        Ok(posted)
    }

    /// Derives an account balance from its entries.
    pub async fn balance_of(&self, account_id: Uuid) -> Result<Decimal> {
        self.ledger_repo.balance_of(account_id).await
    }

    /// Loads a ledger transaction.
    pub async fn get_transaction(&self, id: Uuid) -> Result<LedgerTransaction> {
        self.ledger_repo
            .find_transaction(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ledger transaction '{}' not found", id)))
    }

    /// Loads all entries of a transaction in posting order.
    pub async fn entries_of(&self, transaction_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.ledger_repo.entries_by_transaction(transaction_id).await
    }

    /// Loads entries for an account with pagination.
    pub async fn entries_for_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>> {
        self.ledger_repo
            .entries_by_account(account_id, limit, offset)
            .await
    }

    /// Counts entries for an account.
    pub async fn count_entries_for_account(&self, account_id: Uuid) -> Result<i64> {
        self.ledger_repo.count_by_account(account_id).await
    }

    /// Returns (debits, credits) sums for a transaction.
    pub async fn transaction_sums(&self, transaction_id: Uuid) -> Result<(Decimal, Decimal)> {
        self.ledger_repo.transaction_sums(transaction_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(amount: Decimal) -> EntryLine {
        EntryLine::new(Uuid::new_v4(), amount, "test")
    }

    #[test]
    fn test_validate_accepts_balanced_request() {
        let request = PostTransactionRequest {
            description: "transfer".to_string(),
            debits: vec![line(dec!(60)), line(dec!(40))],
            credits: vec![line(dec!(100))],
        };
        assert!(LedgerService::validate(&request).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_side() {
        let request = PostTransactionRequest {
            description: "broken".to_string(),
            debits: vec![],
            credits: vec![line(dec!(100))],
        };
        assert!(matches!(
            LedgerService::validate(&request),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_positive_amount() {
        let request = PostTransactionRequest {
            description: "broken".to_string(),
            debits: vec![line(dec!(0))],
            credits: vec![line(dec!(0))],
        };
        assert!(matches!(
            LedgerService::validate(&request),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unbalanced_sides() {
        let request = PostTransactionRequest {
            description: "broken".to_string(),
            debits: vec![line(dec!(100))],
            credits: vec![line(dec!(50))],
        };
        match LedgerService::validate(&request) {
            Err(AppError::Unbalanced { debits, credits }) => {
                assert_eq!(debits, dec!(100));
                assert_eq!(credits, dec!(50));
            }
            other => panic!("expected Unbalanced, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_compares_exact_decimals() {
        let request = PostTransactionRequest {
            description: "precision".to_string(),
            debits: vec![line(dec!(0.1000)), line(dec!(0.2000))],
            credits: vec![line(dec!(0.3000))],
        };
        assert!(LedgerService::validate(&request).is_ok());

        let request = PostTransactionRequest {
            description: "precision".to_string(),
            debits: vec![line(dec!(0.1001))],
            credits: vec![line(dec!(0.1000))],
        };
        assert!(matches!(
            LedgerService::validate(&request),
            Err(AppError::Unbalanced { .. })
        ));
    }
}
