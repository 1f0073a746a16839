use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A pending (or published) outbound event. Rows are inserted inside the
/// business transaction that produced them; `published_at` is set exactly
/// once by the dispatcher after the broker acknowledged the delivery.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Store-assigned, strictly increasing with insertion order; the basis of
    /// per-aggregate ordering.
    pub sequence_number: i64,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Returns true once the event has exhausted its delivery attempts and
    /// requires operator action.
    pub fn is_dead_lettered(&self, max_retries: i32) -> bool {
        self.published_at.is_none() && self.retry_count >= max_retries
    }
}
