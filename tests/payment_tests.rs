mod common;

use payment_ledger::config::IdempotencySettings;
use payment_ledger::error::AppError;
use payment_ledger::idempotency::IdempotencyResolver;
use payment_ledger::models::{AccountType, Currency, PaymentStatus};
use payment_ledger::repositories::{OutboxRepository, PaymentRepository};
use payment_ledger::services::PaymentService;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

fn payment_service(pool: &PgPool) -> PaymentService {
    payment_service_with_redis(pool, "redis://localhost:6379")
}

fn payment_service_with_redis(pool: &PgPool, redis_url: &str) -> PaymentService {
    let redis_client = redis::Client::open(redis_url).expect("redis client");
    let resolver = Arc::new(IdempotencyResolver::new(
        pool.clone(),
        redis_client,
        &IdempotencySettings::default(),
    ));
    PaymentService::new(pool.clone(), resolver)
}

#[tokio::test]
async fn test_admission_is_idempotent() {
    let pool = common::setup_test_db().await;
    let service = payment_service(&pool);

    let from = common::create_account(&pool, AccountType::Asset).await;
    let to = common::create_account(&pool, AccountType::Asset).await;
    let key = common::unique_key("K1");

    let first = service
        .admit(&key, dec!(100.00), Currency::USD, from.id, to.id)
        .await
        .expect("first admission");
    assert!(first.created);
    assert_eq!(first.payment.status, PaymentStatus::Created);

    let second = service
        .admit(&key, dec!(100.00), Currency::USD, from.id, to.id)
        .await
        .expect("second admission");
    assert!(!second.created);
    assert_eq!(second.payment.id, first.payment.id);

    // n-fold admission keeps returning the same row.
    for _ in 0..3 {
        let again = service
            .admit(&key, dec!(100.00), Currency::USD, from.id, to.id)
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.payment.id, first.payment.id);
    }

    let repo = PaymentRepository::new(pool.clone());
    assert_eq!(repo.count_by_idempotency_key(&key).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_admissions_collapse_to_one_row() {
    let pool = common::setup_test_db().await;

    let from = common::create_account(&pool, AccountType::Asset).await;
    let to = common::create_account(&pool, AccountType::Asset).await;
    let key = common::unique_key("K2");

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        let key = key.clone();
        let (from_id, to_id) = (from.id, to.id);
        handles.push(tokio::spawn(async move {
            let service = payment_service(&pool);
            service
                .admit(&key, dec!(50.00), Currency::USD, from_id, to_id)
                .await
        }));
    }

    let mut created = 0;
    let mut ids = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().expect("admission should not error");
        if outcome.created {
            created += 1;
        }
        ids.push(outcome.payment.id);
    }

    assert_eq!(created, 1, "exactly one admission wins the race");
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "all callers see one id");

    let repo = PaymentRepository::new(pool.clone());
    assert_eq!(repo.count_by_idempotency_key(&key).await.unwrap(), 1);
}

#[tokio::test]
async fn test_admission_survives_cache_outage() {
    let pool = common::setup_test_db().await;
    // Point the resolver at a dead cache; resolution must fall back to the
    // store without surfacing errors.
    let service = payment_service_with_redis(&pool, "redis://127.0.0.1:1");

    let from = common::create_account(&pool, AccountType::Asset).await;
    let to = common::create_account(&pool, AccountType::Asset).await;
    let key = common::unique_key("K-cacheless");

    let first = service
        .admit(&key, dec!(75.00), Currency::EUR, from.id, to.id)
        .await
        .expect("admission with cache down");
    assert!(first.created);

    let second = service
        .admit(&key, dec!(75.00), Currency::EUR, from.id, to.id)
        .await
        .expect("duplicate admission with cache down");
    assert!(!second.created);
    assert_eq!(second.payment.id, first.payment.id);

    let repo = PaymentRepository::new(pool.clone());
    assert_eq!(repo.count_by_idempotency_key(&key).await.unwrap(), 1);
}

#[tokio::test]
async fn test_admission_validation() {
    let pool = common::setup_test_db().await;
    let service = payment_service(&pool);

    let from = common::create_account(&pool, AccountType::Asset).await;
    let to = common::create_account(&pool, AccountType::Asset).await;

    // Missing dedup key.
    let result = service
        .admit("  ", dec!(10), Currency::USD, from.id, to.id)
        .await;
    assert!(matches!(result, Err(AppError::MissingHeader(_))));

    // Non-positive amount.
    let result = service
        .admit(&common::unique_key("K"), dec!(0), Currency::USD, from.id, to.id)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    // Identical accounts.
    let result = service
        .admit(&common::unique_key("K"), dec!(10), Currency::USD, from.id, from.id)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    // Unknown account.
    let result = service
        .admit(
            &common::unique_key("K"),
            dec!(10),
            Currency::USD,
            from.id,
            Uuid::new_v4(),
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_admission_appends_created_event_to_outbox() {
    let pool = common::setup_test_db().await;
    let service = payment_service(&pool);

    let from = common::create_account(&pool, AccountType::Asset).await;
    let to = common::create_account(&pool, AccountType::Asset).await;

    let outcome = service
        .admit(
            &common::unique_key("K-outbox"),
            dec!(20),
            Currency::USD,
            from.id,
            to.id,
        )
        .await
        .unwrap();

    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM outbox_events WHERE aggregate_id = $1 AND event_type = 'PAYMENT_CREATED'",
    )
    .bind(outcome.payment.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, 1);

    // Duplicate admission must not enqueue a second event.
    service
        .admit(
            &outcome.payment.idempotency_key,
            dec!(20),
            Currency::USD,
            from.id,
            to.id,
        )
        .await
        .unwrap();

    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM outbox_events WHERE aggregate_id = $1",
    )
    .bind(outcome.payment.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, 1);
}

#[tokio::test]
async fn test_authorize_and_fail_transitions() {
    let pool = common::setup_test_db().await;
    let service = payment_service(&pool);

    let from = common::create_account(&pool, AccountType::Asset).await;
    let to = common::create_account(&pool, AccountType::Asset).await;

    let outcome = service
        .admit(
            &common::unique_key("K-auth"),
            dec!(30),
            Currency::GBP,
            from.id,
            to.id,
        )
        .await
        .unwrap();

    let authorized = service.authorize(outcome.payment.id).await.unwrap();
    assert_eq!(authorized.status, PaymentStatus::Authorized);

    // Authorizing twice is an illegal self-transition.
    let again = service.authorize(outcome.payment.id).await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));

    let failed = service
        .fail(outcome.payment.id, "compliance rejection")
        .await
        .unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("compliance rejection"));

    // Terminal: nothing moves a failed payment.
    let after_fail = service.authorize(outcome.payment.id).await;
    assert!(matches!(after_fail, Err(AppError::InvalidTransition { .. })));

    // Each transition left its event behind.
    let repo = OutboxRepository::new(pool.clone());
    assert!(repo.count_unpublished().await.unwrap() >= 3);
}

#[tokio::test]
async fn test_get_payment_not_found() {
    let pool = common::setup_test_db().await;
    let service = payment_service(&pool);

    let result = service.get(Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
