use crate::error::{map_ledger_db_error, AppError, Result};
use crate::events::types::{payment_outbox_event, EventType};
use crate::models::ledger_entry::EntryLine;
use crate::observability::{get_metrics, LatencyTimer};
use crate::repositories::{OutboxRepository, PaymentRepository};
use crate::services::ledger_service::{LedgerService, PostTransactionRequest};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// The settlement coordinator. `settle` is the one place where payment
/// state, ledger rows, and the outbound event are bound together - all of it
/// inside a single store transaction, so there is no partial state to
/// recover from.
pub struct SettlementService {
    pool: PgPool,
}

impl SettlementService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Settles an authorized payment and returns the ledger transaction id.
    /// Idempotent: a payment that already carries a ledger transaction id
    /// returns it unchanged, however many times this is called.
    pub async fn settle(&self, payment_id: Uuid) -> Result<Uuid> {
        let timer = LatencyTimer::new();
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let record = PaymentRepository::find_by_id_for_update_in(&mut tx, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment '{}' not found", payment_id)))?;

        // Primary idempotency point. The row's check constraint makes this
        // safe under races: a ledger transaction id is only ever visible on
        // a SETTLED row.
        if let Some(ledger_transaction_id) = record.ledger_transaction_id {
            return Ok(ledger_transaction_id);
        }

        // Pure transition; rejects anything but AUTHORIZED -> SETTLED.
        let settled = record.domain().settle()?;

        let posted = LedgerService::post_transaction_in(
            &mut tx,
            &PostTransactionRequest {
                description: format!("settlement of payment {}", record.id),
                debits: vec![EntryLine::new(
                    record.from_account_id,
                    record.amount,
                    format!("payment {} debit", record.id),
                )],
                credits: vec![EntryLine::new(
                    record.to_account_id,
                    record.amount,
                    format!("payment {} credit", record.id),
                )],
            },
        )
        .await?;

        let updated = PaymentRepository::bind_settlement_in(
            &mut tx,
            record.id,
            posted.transaction.id,
            settled.updated_at,
        )
        .await?;

        OutboxRepository::append(
            &mut tx,
            payment_outbox_event(EventType::PaymentSettled, &updated)?,
        )
        .await?;

        // The deferred ledger-balance constraint and the payment row checks
        // fire here; any violation rolls the whole settlement back.
        tx.commit().await.map_err(map_ledger_db_error)?;

        get_metrics().record_payment_settled(&updated.currency.to_string());
        get_metrics().record_settlement_latency(timer.elapsed_ms());
        info!(
            payment_id = %payment_id,
            ledger_transaction_id = %posted.transaction.id,
            "Payment settled"
        );

        Ok(posted.transaction.id)
    }
}
