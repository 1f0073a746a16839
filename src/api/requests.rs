use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountType, Currency};
use std::str::FromStr;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Request body for payment admission. The dedup key travels in the
/// `Idempotency-Key` header, not the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
}

impl CreatePaymentRequest {
    pub fn validate(&self) -> Result<Currency, Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.amount <= Decimal::ZERO {
            errors.push(ValidationError::new("amount", "amount must be positive"));
        }
        if self.from_account_id == self.to_account_id {
            errors.push(ValidationError::new(
                "to_account_id",
                "from and to accounts must be different",
            ));
        }

        let currency = match Currency::from_str(&self.currency) {
            Ok(currency) => Some(currency),
            Err(e) => {
                errors.push(ValidationError::new("currency", e.to_string()));
                None
            }
        };

        match (currency, errors.is_empty()) {
            (Some(currency), true) => Ok(currency),
            _ => Err(errors),
        }
    }
}

/// Request body for failing a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailPaymentRequest {
    pub reason: String,
}

impl FailPaymentRequest {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        if self.reason.trim().is_empty() {
            return Err(vec![ValidationError::new("reason", "reason cannot be empty")]);
        }
        Ok(())
    }
}

/// Request body for account creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub account_number: String,
    pub account_type: AccountType,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        if self.account_number.trim().is_empty() {
            return Err(vec![ValidationError::new(
                "account_number",
                "account_number cannot be empty",
            )]);
        }
        Ok(())
    }
}

/// Pagination query for the account ledger listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ListLedgerEntriesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, currency: &str) -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount,
            currency: currency.to_string(),
            from_account_id: Uuid::new_v4(),
            to_account_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_create_payment_valid() {
        assert_eq!(request(dec!(100), "usd").validate().unwrap(), Currency::USD);
    }

    #[test]
    fn test_create_payment_rejects_bad_amount_and_currency() {
        let errors = request(dec!(0), "XXX").validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_create_payment_rejects_same_accounts() {
        let account = Uuid::new_v4();
        let mut req = request(dec!(10), "USD");
        req.from_account_id = account;
        req.to_account_id = account;
        let errors = req.validate().unwrap_err();
        assert_eq!(errors[0].field, "to_account_id");
    }

    #[test]
    fn test_amount_deserializes_from_decimal_string() {
        let json = r#"{"amount":"42.5000","currency":"USD","from_account_id":"550e8400-e29b-41d4-a716-446655440000","to_account_id":"550e8400-e29b-41d4-a716-446655440001"}"#;
        let req: CreatePaymentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.amount, dec!(42.5));
    }

    #[test]
    fn test_fail_request_requires_reason() {
        let req = FailPaymentRequest {
            reason: "  ".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
