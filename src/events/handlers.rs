use crate::error::Result;
use crate::events::processor::EventHandler;
use crate::events::types::ParsedEnvelope;
use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::info;

/// Default handler: writes an audit line for every payment lifecycle event.
/// Deliberately store-free, so the only committed effect of processing is
/// the dedup record itself.
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    async fn handle(
        &self,
        envelope: &ParsedEnvelope,
        payload: &serde_json::Value,
        _conn: &mut PgConnection,
    ) -> Result<()> {
        let status = payload
            .get("payload")
            .and_then(|p| p.get("status"))
            .and_then(|s| s.as_str())
            .unwrap_or("?");

        info!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            aggregate_id = %envelope.aggregate_id,
            status,
            "Payment event observed"
        );
        Ok(())
    }
}
