use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Outcome of a consumer-side processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "processed_result", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingResult {
    Success,
    Skipped,
    Failed,
}

/// Dedup record for an inbound event. The primary key is
/// `(event_id, consumer_group)`: the same event may be consumed
/// independently by many groups, but never twice by the same group.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessedEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub consumer_group: String,
    pub result: ProcessingResult,
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serialization() {
        assert_eq!(
            serde_json::to_string(&ProcessingResult::Success).unwrap(),
            "\"SUCCESS\""
        );
        assert_eq!(
            serde_json::to_string(&ProcessingResult::Skipped).unwrap(),
            "\"SKIPPED\""
        );
    }
}
