use crate::error::{AppError, Result};
use crate::models::{Account, AccountType};
use crate::repositories::AccountRepository;
use sqlx::PgPool;
use uuid::Uuid;

/// Service for account management. Accounts are append-only; there is no
/// update or delete surface.
pub struct AccountService {
    repo: AccountRepository,
}

impl AccountService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: AccountRepository::new(pool),
        }
    }

    /// Creates a new account. Account numbers are unique; a duplicate number
    /// is a validation error, not a new account.
    pub async fn create_account(
        &self,
        account_number: String,
        account_type: AccountType,
    ) -> Result<Account> {
        if account_number.trim().is_empty() {
            return Err(AppError::Validation(
                "account_number cannot be empty".to_string(),
            ));
        }

        let account = Account::new(account_number, account_type);
        match self.repo.create(&account).await {
            Ok(created) => Ok(created),
            Err(e) if e.is_unique_violation() => Err(AppError::Validation(format!(
                "account number '{}' already exists",
                account.account_number
            ))),
            Err(e) => Err(e),
        }
    }

    /// Finds an account by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Account> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account '{}' not found", id)))
    }

    /// Finds an account by its number.
    pub async fn find_by_number(&self, account_number: &str) -> Result<Account> {
        self.repo
            .find_by_number(account_number)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("account '{}' not found", account_number))
            })
    }
}
