use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Currency;

/// Status of a payment in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Payment has been admitted but not yet authorized.
    Created,
    /// Payment has been authorized and can be settled.
    Authorized,
    /// Payment has been settled; ledger entries exist.
    Settled,
    /// Payment failed; no ledger entries exist.
    Failed,
}

impl PaymentStatus {
    /// Returns true if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Settled | PaymentStatus::Failed)
    }

    /// Returns true if the edge `self -> to` is an allowed transition.
    /// Self-transitions are always rejected; duplicate effects are handled by
    /// idempotency resolution, not by re-walking an edge.
    pub fn can_transition_to(&self, to: PaymentStatus) -> bool {
        matches!(
            (self, to),
            (PaymentStatus::Created, PaymentStatus::Authorized)
                | (PaymentStatus::Created, PaymentStatus::Failed)
                | (PaymentStatus::Authorized, PaymentStatus::Settled)
                | (PaymentStatus::Authorized, PaymentStatus::Failed)
        )
    }
}

/// Domain value for a payment. Carries no persistence concerns: the
/// idempotency key and the bound ledger-transaction id live only on
/// [`PaymentRecord`]. Transitions are pure, returning a new value with a
/// fresh `updated_at`; nothing here touches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a new payment in CREATED state. Validates the money-movement
    /// basics; currency validity is the caller's job (the boundary parses the
    /// closed enum).
    pub fn new(
        amount: Decimal,
        currency: Currency,
        from_account_id: Uuid,
        to_account_id: Uuid,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        if from_account_id == to_account_id {
            return Err(AppError::Validation(
                "from and to accounts must be different".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            amount,
            currency,
            from_account_id,
            to_account_id,
            status: PaymentStatus::Created,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn transition(self, to: PaymentStatus) -> Result<Self> {
        if !self.status.can_transition_to(to) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(Self {
            status: to,
            updated_at: Utc::now(),
            ..self
        })
    }

    /// CREATED -> AUTHORIZED.
    pub fn authorize(self) -> Result<Self> {
        self.transition(PaymentStatus::Authorized)
    }

    /// AUTHORIZED -> SETTLED.
    pub fn settle(self) -> Result<Self> {
        self.transition(PaymentStatus::Settled)
    }

    /// CREATED/AUTHORIZED -> FAILED, recording the reason.
    pub fn fail(self, reason: impl Into<String>) -> Result<Self> {
        let failed = self.transition(PaymentStatus::Failed)?;
        Ok(Self {
            failure_reason: Some(reason.into()),
            ..failed
        })
    }
}

/// Persistence record for a payment: the columns exactly as stored, including
/// the dedup key and the bound ledger-transaction id. The check constraint on
/// the row keeps `ledger_transaction_id` non-null iff status is SETTLED.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub idempotency_key: String,
    pub ledger_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Builds the record to insert for a freshly created domain payment.
    pub fn from_domain(payment: &Payment, idempotency_key: String) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            currency: payment.currency,
            from_account_id: payment.from_account_id,
            to_account_id: payment.to_account_id,
            status: payment.status,
            failure_reason: payment.failure_reason.clone(),
            idempotency_key,
            ledger_transaction_id: None,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }

    /// Converts back to the domain value, shedding persistence fields.
    pub fn domain(&self) -> Payment {
        Payment {
            id: self.id,
            amount: self.amount,
            currency: self.currency,
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            status: self.status,
            failure_reason: self.failure_reason.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment() -> Payment {
        Payment::new(dec!(100), Currency::USD, Uuid::new_v4(), Uuid::new_v4()).unwrap()
    }

    #[test]
    fn test_creation_validates_amount() {
        let err = Payment::new(dec!(0), Currency::USD, Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(err, Err(AppError::Validation(_))));

        let err = Payment::new(dec!(-5), Currency::USD, Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_creation_rejects_identical_accounts() {
        let account = Uuid::new_v4();
        let err = Payment::new(dec!(100), Currency::USD, account, account);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_allowed_transitions() {
        let authorized = payment().authorize().unwrap();
        assert_eq!(authorized.status, PaymentStatus::Authorized);

        let settled = authorized.clone().settle().unwrap();
        assert_eq!(settled.status, PaymentStatus::Settled);

        let failed = authorized.fail("insufficient funds").unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("insufficient funds"));
    }

    #[test]
    fn test_created_can_fail_directly() {
        let failed = payment().fail("account frozen").unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
    }

    #[test]
    fn test_settle_requires_authorized() {
        let result = payment().settle();
        assert!(matches!(
            result,
            Err(AppError::InvalidTransition {
                from: PaymentStatus::Created,
                to: PaymentStatus::Settled,
            })
        ));
    }

    #[test]
    fn test_terminal_states_reject_all_edges() {
        let settled = payment().authorize().unwrap().settle().unwrap();
        assert!(settled.status.is_terminal());
        assert!(settled.clone().authorize().is_err());
        assert!(settled.clone().fail("late").is_err());
        assert!(settled.settle().is_err());

        let failed = payment().fail("no").unwrap();
        assert!(failed.status.is_terminal());
        assert!(failed.clone().authorize().is_err());
        assert!(failed.settle().is_err());
    }

    #[test]
    fn test_self_transition_rejected() {
        assert!(!PaymentStatus::Created.can_transition_to(PaymentStatus::Created));
        assert!(!PaymentStatus::Authorized.can_transition_to(PaymentStatus::Authorized));
        assert!(!PaymentStatus::Settled.can_transition_to(PaymentStatus::Settled));
    }

    #[test]
    fn test_transition_is_pure() {
        let created = payment();
        let before = created.clone();
        let authorized = created.authorize().unwrap();
        assert_eq!(before.status, PaymentStatus::Created);
        assert!(authorized.updated_at >= before.updated_at);
    }

    #[test]
    fn test_record_round_trip() {
        let domain = payment();
        let record = PaymentRecord::from_domain(&domain, "key-1".to_string());
        assert_eq!(record.idempotency_key, "key-1");
        assert!(record.ledger_transaction_id.is_none());
        assert_eq!(record.domain(), domain);
    }
}
