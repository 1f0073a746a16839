mod common;

use async_trait::async_trait;
use payment_ledger::error::{AppError, Result};
use payment_ledger::events::processor::EventHandler;
use payment_ledger::events::types::ParsedEnvelope;
use payment_ledger::events::EventProcessor;
use payment_ledger::models::{ProcessingResult};
use payment_ledger::repositories::ProcessedEventRepository;
use sqlx::PgConnection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Handler that counts invocations.
#[derive(Default)]
struct CountingHandler {
    calls: Arc<AtomicUsize>,
}

impl CountingHandler {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for CountingHandler {
    async fn handle(
        &self,
        _envelope: &ParsedEnvelope,
        _payload: &serde_json::Value,
        _conn: &mut PgConnection,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Handler that always raises.
struct PoisonHandler;

#[async_trait]
impl EventHandler for PoisonHandler {
    async fn handle(
        &self,
        _envelope: &ParsedEnvelope,
        _payload: &serde_json::Value,
        _conn: &mut PgConnection,
    ) -> Result<()> {
        Err(AppError::Validation("cannot digest this event".to_string()))
    }
}

/// Handler whose store effects must roll back together with the dedup
/// record.
struct WritingThenFailingHandler {
    account_number: String,
}

#[async_trait]
impl EventHandler for WritingThenFailingHandler {
    async fn handle(
        &self,
        _envelope: &ParsedEnvelope,
        _payload: &serde_json::Value,
        conn: &mut PgConnection,
    ) -> Result<()> {
        sqlx::query("INSERT INTO accounts (id, account_number, account_type) VALUES ($1, $2, 'ASSET')")
            .bind(Uuid::new_v4())
            .bind(&self.account_number)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Err(AppError::Validation("late failure".to_string()))
    }
}

fn envelope(event_type: &str) -> ParsedEnvelope {
    ParsedEnvelope {
        event_id: Uuid::new_v4(),
        event_type: event_type.to_string(),
        aggregate_type: "payment".to_string(),
        aggregate_id: Uuid::new_v4().to_string(),
    }
}

fn payload() -> serde_json::Value {
    serde_json::json!({"payload": {"status": "SETTLED"}})
}

#[tokio::test]
async fn test_handler_runs_once_per_group() {
    let pool = common::setup_test_db().await;
    let processor = EventProcessor::new(pool.clone());
    let handler = CountingHandler::default();
    let envelope = envelope("PAYMENT_SETTLED");

    let processed = processor
        .process(&envelope, &payload(), "group-a", &handler)
        .await
        .unwrap();
    assert!(processed);
    assert_eq!(handler.calls(), 1);

    // Redelivery after a crash-before-ack: the handler must not run again.
    for _ in 0..3 {
        let processed = processor
            .process(&envelope, &payload(), "group-a", &handler)
            .await
            .unwrap();
        assert!(!processed);
    }
    assert_eq!(handler.calls(), 1);

    let repo = ProcessedEventRepository::new(pool.clone());
    let record = repo.find(envelope.event_id, "group-a").await.unwrap().unwrap();
    assert_eq!(record.result, ProcessingResult::Success);
}

#[tokio::test]
async fn test_groups_are_independent() {
    let pool = common::setup_test_db().await;
    let processor = EventProcessor::new(pool.clone());
    let envelope = envelope("PAYMENT_SETTLED");

    let mut handlers = Vec::new();
    for group in ["g1", "g2", "g3"] {
        let handler = CountingHandler::default();
        let processed = processor
            .process(&envelope, &payload(), group, &handler)
            .await
            .unwrap();
        assert!(processed);
        handlers.push(handler);
    }

    for handler in &handlers {
        assert_eq!(handler.calls(), 1);
    }

    let repo = ProcessedEventRepository::new(pool.clone());
    let records = repo.find_by_event(envelope.event_id).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.event_id == envelope.event_id));
}

#[tokio::test]
async fn test_poison_event_records_failed_and_reraises() {
    let pool = common::setup_test_db().await;
    let processor = EventProcessor::new(pool.clone());
    let envelope = envelope("PAYMENT_SETTLED");

    let result = processor
        .process(&envelope, &payload(), "group-poison", &PoisonHandler)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    // The FAILED row is durable even though the handler's transaction
    // rolled back.
    let repo = ProcessedEventRepository::new(pool.clone());
    let record = repo
        .find(envelope.event_id, "group-poison")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.result, ProcessingResult::Failed);
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .contains("cannot digest"));

    // On redelivery the committed FAILED row short-circuits: no retry storm.
    let handler = CountingHandler::default();
    let processed = processor
        .process(&envelope, &payload(), "group-poison", &handler)
        .await
        .unwrap();
    assert!(!processed);
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_failed_handler_work_rolls_back() {
    let pool = common::setup_test_db().await;
    let processor = EventProcessor::new(pool.clone());
    let envelope = envelope("PAYMENT_SETTLED");

    let account_number = common::unique_key("GHOST");
    let handler = WritingThenFailingHandler {
        account_number: account_number.clone(),
    };

    let result = processor
        .process(&envelope, &payload(), "group-rollback", &handler)
        .await;
    assert!(result.is_err());

    // The insert vanished with the rolled-back transaction.
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE account_number = $1")
        .bind(&account_number)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, 0);
}

#[tokio::test]
async fn test_skip_prevents_future_processing() {
    let pool = common::setup_test_db().await;
    let processor = EventProcessor::new(pool.clone());
    let envelope = envelope("UNKNOWN_TYPE");

    let recorded = processor
        .skip(&envelope, "group-skip", "no handler bound")
        .await
        .unwrap();
    assert!(recorded);

    // Skipping twice is a no-op.
    let recorded = processor
        .skip(&envelope, "group-skip", "no handler bound")
        .await
        .unwrap();
    assert!(!recorded);

    // A later delivery with a real handler still does not run it.
    let handler = CountingHandler::default();
    let processed = processor
        .process(&envelope, &payload(), "group-skip", &handler)
        .await
        .unwrap();
    assert!(!processed);
    assert_eq!(handler.calls(), 0);

    let repo = ProcessedEventRepository::new(pool.clone());
    let record = repo
        .find(envelope.event_id, "group-skip")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.result, ProcessingResult::Skipped);
    assert_eq!(
        repo.count_by_result("group-skip", ProcessingResult::Skipped)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_concurrent_same_group_consumers_execute_once() {
    let pool = common::setup_test_db().await;
    let envelope = envelope("PAYMENT_SETTLED");
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let pool = pool.clone();
        let envelope = envelope.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let processor = EventProcessor::new(pool);
            let handler = CountingHandler { calls };
            processor
                .process(&envelope, &payload(), "group-race", &handler)
                .await
        }));
    }

    let mut processed_count = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            processed_count += 1;
        }
    }

    // Only one consumer's handler effects survive; the others either saw the
    // committed record up front or lost the insert race and rolled back.
    assert_eq!(processed_count, 1);

    let repo = ProcessedEventRepository::new(pool.clone());
    let records = repo.find_by_event(envelope.event_id).await.unwrap();
    assert_eq!(records.len(), 1);
}
