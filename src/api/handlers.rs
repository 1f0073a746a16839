use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::api::requests::{
    CreateAccountRequest, CreatePaymentRequest, FailPaymentRequest, ListLedgerEntriesQuery,
};
use crate::api::responses::{
    AccountResponse, ApiResponse, BalanceResponse, HealthResponse, LedgerEntryResponse,
    PaginatedResponse, PaymentResponse, ServiceHealth, SettlementResponse,
};
use crate::error::AppError;

use super::routes::AppState;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

fn validation_failure(errors: &[crate::api::requests::ValidationError]) -> AppError {
    // Surface the first field error as the message; the full list rides in
    // the details.
    AppError::Validation(
        errors
            .first()
            .map(|e| format!("{}: {}", e.field, e.message))
            .unwrap_or_else(|| "request validation failed".to_string()),
    )
}

// ============================================================================
// Health & metrics
// ============================================================================

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();
    let redis_healthy = state
        .redis_client
        .get_multiplexed_async_connection()
        .await
        .is_ok();
    let kafka_healthy = state.kafka_connected();

    let response = HealthResponse {
        status: if db_healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        services: ServiceHealth {
            database: db_healthy,
            redis: redis_healthy,
            kafka: kafka_healthy,
        },
    };

    Json(ApiResponse::success(response))
}

/// Detailed health check with per-dependency latency.
pub async fn detailed_health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<crate::observability::AggregatedHealth>>, StatusCode> {
    match &state.health_checker {
        Some(checker) => Ok(Json(ApiResponse::success(checker.check_all().await))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();

    if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    match &state.metrics_handle {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::NOT_FOUND),
    }
}

// ============================================================================
// Payment handlers
// ============================================================================

/// Admit a payment. The `Idempotency-Key` header is required; a duplicate
/// admission returns 200 with the identical representation instead of 201.
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), AppError> {
    let dedup_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::MissingHeader("Idempotency-Key".to_string()))?;

    let currency = request
        .validate()
        .map_err(|errors| validation_failure(&errors))?;

    let outcome = state
        .payments
        .admit(
            &dedup_key,
            request.amount,
            currency,
            request.from_account_id,
            request.to_account_id,
        )
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(ApiResponse::success(PaymentResponse::from(outcome.payment))),
    ))
}

/// Get a payment by ID.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, AppError> {
    let payment = state.payments.get(id).await?;
    Ok(Json(ApiResponse::success(PaymentResponse::from(payment))))
}

/// Authorize a payment.
pub async fn authorize_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, AppError> {
    let payment = state.payments.authorize(id).await?;
    Ok(Json(ApiResponse::success(PaymentResponse::from(payment))))
}

/// Fail a payment with a reason.
pub async fn fail_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FailPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentResponse>>, AppError> {
    request
        .validate()
        .map_err(|errors| validation_failure(&errors))?;

    let payment = state.payments.fail(id, request.reason.trim()).await?;
    Ok(Json(ApiResponse::success(PaymentResponse::from(payment))))
}

/// Settle an authorized payment. Idempotent: repeated calls return the same
/// ledger transaction id.
pub async fn settle_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SettlementResponse>>, AppError> {
    let ledger_transaction_id = state.settlements.settle(id).await?;
    Ok(Json(ApiResponse::success(SettlementResponse {
        payment_id: id,
        ledger_transaction_id,
    })))
}

// ============================================================================
// Account handlers
// ============================================================================

/// Create a new account.
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountResponse>>), AppError> {
    request
        .validate()
        .map_err(|errors| validation_failure(&errors))?;

    let account = state
        .accounts
        .create_account(request.account_number, request.account_type)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AccountResponse::from(account))),
    ))
}

/// Get account by ID.
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    let account = state.accounts.find_by_id(id).await?;
    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}

/// Get the derived balance of an account.
pub async fn get_account_balance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BalanceResponse>>, AppError> {
    let account = state.accounts.find_by_id(id).await?;
    let balance = state.ledger.balance_of(id).await?;

    Ok(Json(ApiResponse::success(BalanceResponse {
        account_id: account.id,
        account_type: account.account_type,
        balance,
        as_of: Utc::now(),
    })))
}

/// Get the ledger entries of an account, paginated.
pub async fn get_account_ledger(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListLedgerEntriesQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<LedgerEntryResponse>>>, AppError> {
    // 404 for an unknown account, not an empty page.
    state.accounts.find_by_id(id).await?;

    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let total = state.ledger.count_entries_for_account(id).await?;
    let entries = state.ledger.entries_for_account(id, limit, offset).await?;
    let items: Vec<LedgerEntryResponse> =
        entries.into_iter().map(LedgerEntryResponse::from).collect();

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, limit, offset,
    ))))
}
