use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{PaymentRecord, PaymentStatus};
use crate::repositories::NewOutboxEvent;

/// Aggregate type string used for payment events.
pub const PAYMENT_AGGREGATE: &str = "payment";

/// Type of domain event emitted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PaymentCreated,
    PaymentAuthorized,
    PaymentSettled,
    PaymentFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PaymentCreated => "PAYMENT_CREATED",
            EventType::PaymentAuthorized => "PAYMENT_AUTHORIZED",
            EventType::PaymentSettled => "PAYMENT_SETTLED",
            EventType::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope wrapping every outbound event with common metadata. The envelope
/// is what lands in the outbox payload and, eventually, on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: T,
}

/// Event payload for payment lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub payment_id: Uuid,
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

impl PaymentEvent {
    pub fn from_record(record: &PaymentRecord) -> Self {
        Self {
            payment_id: record.id,
            amount: record.amount,
            currency: record.currency.to_string(),
            from_account_id: record.from_account_id,
            to_account_id: record.to_account_id,
            status: record.status,
            failure_reason: record.failure_reason.clone(),
            ledger_transaction_id: record.ledger_transaction_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Builds the outbox row for a payment lifecycle event. The outbox row id
/// doubles as the envelope's `event_id`, so consumers dedup on the same
/// identity the dispatcher publishes under.
pub fn payment_outbox_event(
    event_type: EventType,
    record: &PaymentRecord,
) -> Result<NewOutboxEvent> {
    let event_id = Uuid::new_v4();
    let envelope = EventEnvelope {
        event_id,
        event_type,
        aggregate_type: PAYMENT_AGGREGATE.to_string(),
        aggregate_id: record.id,
        occurred_at: Utc::now(),
        payload: PaymentEvent::from_record(record),
    };
    let payload = serde_json::to_value(&envelope)
        .map_err(|e| anyhow::anyhow!("failed to serialize event envelope: {}", e))?;

    Ok(NewOutboxEvent {
        id: event_id,
        aggregate_type: PAYMENT_AGGREGATE.to_string(),
        aggregate_id: record.id,
        event_type: event_type.as_str().to_string(),
        payload,
    })
}

/// The envelope fields a consumer needs before it can route and dedup a
/// delivery: extracted from the raw JSON by known field names, with a
/// camelCase fallback for events produced by other stacks.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
}

impl ParsedEnvelope {
    /// Extracts the envelope from a raw event value. Returns None when no
    /// usable event id can be found; such deliveries are unroutable.
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        let event_id = string_field(value, &["event_id", "eventId", "id"])?;
        let event_id = Uuid::parse_str(&event_id).ok()?;

        let event_type =
            string_field(value, &["event_type", "eventType", "type"]).unwrap_or_default();
        let aggregate_type =
            string_field(value, &["aggregate_type", "aggregateType"]).unwrap_or_default();
        let aggregate_id = string_field(
            value,
            &["aggregate_id", "aggregateId", "payment_id", "paymentId"],
        )
        .unwrap_or_default();

        Some(Self {
            event_id,
            event_type,
            aggregate_type,
            aggregate_id,
        })
    }
}

fn string_field(value: &serde_json::Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| value.get(name))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
