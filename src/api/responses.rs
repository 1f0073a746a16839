use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Account, AccountType, LedgerEntry, PaymentRecord, PaymentStatus};

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validation error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl From<&crate::api::requests::ValidationError> for ValidationErrorDetail {
    fn from(e: &crate::api::requests::ValidationError) -> Self {
        Self {
            field: e.field.clone(),
            message: e.message.clone(),
        }
    }
}

/// HTTP mapping for application errors. Validation problems are the
/// client's, transition conflicts are 409, and everything touching
/// infrastructure collapses to an opaque 500.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::MissingHeader(header) => (
                StatusCode::BAD_REQUEST,
                "MISSING_HEADER",
                format!("Missing Required Header: {}", header),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", self.to_string())
            }
            AppError::Unbalanced { .. } => {
                (StatusCode::BAD_REQUEST, "UNBALANCED", self.to_string())
            }
            AppError::LedgerConstraint(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Internal(_) => {
                tracing::error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (
            status,
            Json(ApiResponse::<()>::error(ErrorResponse::new(code, message))),
        )
            .into_response()
    }
}

/// Payment representation returned by the API. Amounts serialize as decimal
/// strings, timestamps as ISO-8601.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub ledger_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.id,
            amount: record.amount,
            currency: record.currency.to_string(),
            from_account_id: record.from_account_id,
            to_account_id: record.to_account_id,
            status: record.status,
            failure_reason: record.failure_reason,
            ledger_transaction_id: record.ledger_transaction_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Account response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub account_number: String,
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            account_number: account.account_number,
            account_type: account.account_type,
            created_at: account.created_at,
        }
    }
}

/// Derived balance response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub as_of: DateTime<Utc>,
}

/// Ledger entry response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntryResponse {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub entry_type: String,
    pub description: String,
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            transaction_id: entry.transaction_id,
            account_id: entry.account_id,
            amount: entry.amount,
            entry_type: format!("{:?}", entry.entry_type).to_uppercase(),
            description: entry.description,
            sequence_number: entry.sequence_number,
            created_at: entry.created_at,
        }
    }
}

/// Settlement response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub payment_id: Uuid,
    pub ledger_transaction_id: Uuid,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub services: ServiceHealth,
}

/// Service health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub database: bool,
    pub redis: bool,
    pub kafka: bool,
}

/// Paginated list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}
