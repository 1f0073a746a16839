mod common;

use payment_ledger::config::IdempotencySettings;
use payment_ledger::error::AppError;
use payment_ledger::idempotency::IdempotencyResolver;
use payment_ledger::models::{AccountType, Currency, EntryType, PaymentRecord, PaymentStatus};
use payment_ledger::services::{LedgerService, PaymentService, SettlementService};
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

fn payment_service(pool: &PgPool) -> PaymentService {
    let redis_client = redis::Client::open("redis://localhost:6379").expect("redis client");
    let resolver = Arc::new(IdempotencyResolver::new(
        pool.clone(),
        redis_client,
        &IdempotencySettings::default(),
    ));
    PaymentService::new(pool.clone(), resolver)
}

async fn authorized_payment(pool: &PgPool, amount: rust_decimal::Decimal) -> PaymentRecord {
    let service = payment_service(pool);
    let from = common::create_account(pool, AccountType::Asset).await;
    let to = common::create_account(pool, AccountType::Liability).await;

    let outcome = service
        .admit(
            &common::unique_key("K-settle"),
            amount,
            Currency::USD,
            from.id,
            to.id,
        )
        .await
        .expect("admission");
    service
        .authorize(outcome.payment.id)
        .await
        .expect("authorization")
}

#[tokio::test]
async fn test_settlement_posts_balanced_pair() {
    let pool = common::setup_test_db().await;
    let payment = authorized_payment(&pool, dec!(100.0000)).await;

    let settlements = SettlementService::new(pool.clone());
    let ledger = LedgerService::new(pool.clone());

    let from_before = ledger.balance_of(payment.from_account_id).await.unwrap();
    let to_before = ledger.balance_of(payment.to_account_id).await.unwrap();

    let tx_id = settlements.settle(payment.id).await.expect("settlement");

    let entries = ledger.entries_of(tx_id).await.unwrap();
    assert_eq!(entries.len(), 2);

    let debit = entries.iter().find(|e| e.entry_type == EntryType::Debit).unwrap();
    let credit = entries.iter().find(|e| e.entry_type == EntryType::Credit).unwrap();
    assert_eq!(debit.account_id, payment.from_account_id);
    assert_eq!(debit.amount, dec!(100.0000));
    assert_eq!(credit.account_id, payment.to_account_id);
    assert_eq!(credit.amount, dec!(100.0000));

    // from is an ASSET: a debit moves it by +100 from the ledger's point of
    // view; to is a LIABILITY: a credit moves it by +100.
    let from_after = ledger.balance_of(payment.from_account_id).await.unwrap();
    let to_after = ledger.balance_of(payment.to_account_id).await.unwrap();
    assert_eq!(from_after - from_before, dec!(100.0000));
    assert_eq!(to_after - to_before, dec!(100.0000));

    let service = payment_service(&pool);
    let settled = service.get(payment.id).await.unwrap();
    assert_eq!(settled.status, PaymentStatus::Settled);
    assert_eq!(settled.ledger_transaction_id, Some(tx_id));

    // Ledger-tx id is non-null iff SETTLED: verified by the row itself.
    let row: (bool,) = sqlx::query_as(
        "SELECT (status = 'SETTLED') = (ledger_transaction_id IS NOT NULL) FROM payments WHERE id = $1",
    )
    .bind(payment.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(row.0);
}

#[tokio::test]
async fn test_settlement_is_idempotent() {
    let pool = common::setup_test_db().await;
    let payment = authorized_payment(&pool, dec!(40.0000)).await;

    let settlements = SettlementService::new(pool.clone());
    let ledger = LedgerService::new(pool.clone());

    let first = settlements.settle(payment.id).await.unwrap();
    for _ in 0..4 {
        let again = settlements.settle(payment.id).await.unwrap();
        assert_eq!(again, first, "every settle call returns the same ledger tx");
    }

    let entries = ledger.entries_of(first).await.unwrap();
    assert_eq!(entries.len(), 2, "exactly one balanced pair exists");

    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE description LIKE $1")
            .bind(format!("%{}%", payment.id))
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(row.0, 1, "exactly one ledger transaction exists");
}

#[tokio::test]
async fn test_concurrent_settlements_bind_once() {
    let pool = common::setup_test_db().await;
    let payment = authorized_payment(&pool, dec!(10.0000)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let id = payment.id;
        handles.push(tokio::spawn(async move {
            SettlementService::new(pool).settle(id).await
        }));
    }

    let mut tx_ids = Vec::new();
    for handle in handles {
        tx_ids.push(handle.await.unwrap().expect("settle should not error"));
    }
    assert!(tx_ids.windows(2).all(|w| w[0] == w[1]));

    let ledger = LedgerService::new(pool.clone());
    assert_eq!(ledger.entries_of(tx_ids[0]).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_settle_rejects_unauthorized_payment() {
    let pool = common::setup_test_db().await;
    let service = payment_service(&pool);

    let from = common::create_account(&pool, AccountType::Asset).await;
    let to = common::create_account(&pool, AccountType::Asset).await;

    let outcome = service
        .admit(
            &common::unique_key("K-created"),
            dec!(10),
            Currency::USD,
            from.id,
            to.id,
        )
        .await
        .unwrap();

    let settlements = SettlementService::new(pool.clone());
    let result = settlements.settle(outcome.payment.id).await;
    assert!(matches!(
        result,
        Err(AppError::InvalidTransition {
            from: PaymentStatus::Created,
            to: PaymentStatus::Settled,
        })
    ));

    // Nothing leaked: no ledger rows, no settled event.
    let ledger = LedgerService::new(pool.clone());
    assert_eq!(
        ledger.count_entries_for_account(from.id).await.unwrap(),
        0
    );
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM outbox_events WHERE aggregate_id = $1 AND event_type = 'PAYMENT_SETTLED'",
    )
    .bind(outcome.payment.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, 0);

    let unchanged = service.get(outcome.payment.id).await.unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Created);
}

#[tokio::test]
async fn test_settle_missing_payment() {
    let pool = common::setup_test_db().await;
    let settlements = SettlementService::new(pool.clone());

    let result = settlements.settle(Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_settlement_enqueues_settled_event() {
    let pool = common::setup_test_db().await;
    let payment = authorized_payment(&pool, dec!(55.0000)).await;

    let settlements = SettlementService::new(pool.clone());
    settlements.settle(payment.id).await.unwrap();
    settlements.settle(payment.id).await.unwrap();

    // The idempotent short-circuit must not enqueue a second event.
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM outbox_events WHERE aggregate_id = $1 AND event_type = 'PAYMENT_SETTLED'",
    )
    .bind(payment.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, 1);
}
