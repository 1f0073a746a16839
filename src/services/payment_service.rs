use crate::error::{AppError, Result};
use crate::events::types::{payment_outbox_event, EventType};
use crate::idempotency::IdempotencyResolver;
use crate::models::{Currency, Payment, PaymentRecord};
use crate::observability::get_metrics;
use crate::repositories::{AccountRepository, OutboxRepository, PaymentRepository};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of an admission: the payment and whether this request created it.
/// A duplicate admission maps to HTTP 200 instead of 201.
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub payment: PaymentRecord,
    pub created: bool,
}

/// Admission and lifecycle service for payments. Creation is idempotent on
/// the client dedup key; state changes append their domain event to the
/// outbox inside the same store transaction.
pub struct PaymentService {
    pool: PgPool,
    payments: PaymentRepository,
    resolver: Arc<IdempotencyResolver>,
}

impl PaymentService {
    pub fn new(pool: PgPool, resolver: Arc<IdempotencyResolver>) -> Self {
        Self {
            payments: PaymentRepository::new(pool.clone()),
            pool,
            resolver,
        }
    }

    /// Admits a payment request. Resolution order: idempotency cache, then
    /// the store, then a fresh insert. Two concurrent admissions racing past
    /// a miss both try to insert; the loser observes the unique violation,
    /// re-resolves, and returns the winner's record.
    pub async fn admit(
        &self,
        dedup_key: &str,
        amount: Decimal,
        currency: Currency,
        from_account_id: Uuid,
        to_account_id: Uuid,
    ) -> Result<AdmissionOutcome> {
        if dedup_key.trim().is_empty() {
            return Err(AppError::MissingHeader("Idempotency-Key".to_string()));
        }

        if let Some(payment_id) = self.resolver.resolve(dedup_key).await? {
            if let Some(existing) = self.payments.find_by_id(payment_id).await? {
                get_metrics().record_admission_duplicate();
                return Ok(AdmissionOutcome {
                    payment: existing,
                    created: false,
                });
            }
            // Payments are never deleted, so a dangling cache hint means the
            // cache is ahead of us; fall through to the store path.
            warn!(dedup_key, %payment_id, "Idempotency hint points at a missing payment");
        }

        let payment = Payment::new(amount, currency, from_account_id, to_account_id)?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let accounts =
            AccountRepository::find_all_in(&mut tx, &[from_account_id, to_account_id]).await?;
        for id in [from_account_id, to_account_id] {
            if !accounts.iter().any(|a| a.id == id) {
                return Err(AppError::Validation(format!("account '{}' does not exist", id)));
            }
        }

        let record = PaymentRecord::from_domain(&payment, dedup_key.to_string());
        let inserted = match PaymentRepository::insert_in(&mut tx, &record).await {
            Ok(inserted) => inserted,
            Err(e) if e.is_unique_violation() => {
                // Lost the admission race; the winner's row is authoritative.
                drop(tx);
                let existing = self
                    .payments
                    .find_by_idempotency_key(dedup_key)
                    .await?
                    .ok_or_else(|| {
                        anyhow::anyhow!("dedup key winner disappeared during re-resolution")
                    })?;
                self.resolver.remember(dedup_key, existing.id).await;
                get_metrics().record_admission_duplicate();
                return Ok(AdmissionOutcome {
                    payment: existing,
                    created: false,
                });
            }
            Err(e) => return Err(e),
        };

        OutboxRepository::append(
            &mut tx,
            payment_outbox_event(EventType::PaymentCreated, &inserted)?,
        )
        .await?;

        tx.commit().await.map_err(AppError::Database)?;

        self.resolver.remember(dedup_key, inserted.id).await;
        get_metrics().record_admission_created(&inserted.currency.to_string());
        info!(payment_id = %inserted.id, "Payment admitted");

        Ok(AdmissionOutcome {
            payment: inserted,
            created: true,
        })
    }

    /// Loads a payment by ID.
    pub async fn get(&self, id: Uuid) -> Result<PaymentRecord> {
        self.payments
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment '{}' not found", id)))
    }

    /// CREATED -> AUTHORIZED, with a PAYMENT_AUTHORIZED event in the same
    /// transaction.
    pub async fn authorize(&self, id: Uuid) -> Result<PaymentRecord> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let record = PaymentRepository::find_by_id_for_update_in(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment '{}' not found", id)))?;

        let authorized = record.domain().authorize()?;
        let updated = PaymentRepository::update_status_in(
            &mut tx,
            id,
            authorized.status,
            None,
            authorized.updated_at,
        )
        .await?;

        OutboxRepository::append(
            &mut tx,
            payment_outbox_event(EventType::PaymentAuthorized, &updated)?,
        )
        .await?;

        tx.commit().await.map_err(AppError::Database)?;
        info!(payment_id = %id, "Payment authorized");
        Ok(updated)
    }

    /// CREATED/AUTHORIZED -> FAILED, with a PAYMENT_FAILED event in the same
    /// transaction.
    pub async fn fail(&self, id: Uuid, reason: &str) -> Result<PaymentRecord> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let record = PaymentRepository::find_by_id_for_update_in(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment '{}' not found", id)))?;

        let failed = record.domain().fail(reason)?;
        let updated = PaymentRepository::update_status_in(
            &mut tx,
            id,
            failed.status,
            failed.failure_reason.as_deref(),
            failed.updated_at,
        )
        .await?;

        OutboxRepository::append(
            &mut tx,
            payment_outbox_event(EventType::PaymentFailed, &updated)?,
        )
        .await?;

        tx.commit().await.map_err(AppError::Database)?;
        get_metrics().record_payment_failed(reason);
        info!(payment_id = %id, reason, "Payment failed");
        Ok(updated)
    }
}
