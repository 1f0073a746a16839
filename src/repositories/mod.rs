pub mod account_repository;
pub mod ledger_repository;
pub mod outbox_repository;
pub mod payment_repository;
pub mod processed_event_repository;

pub use account_repository::AccountRepository;
pub use ledger_repository::LedgerRepository;
pub use outbox_repository::{NewOutboxEvent, OutboxRepository};
pub use payment_repository::PaymentRepository;
pub use processed_event_repository::ProcessedEventRepository;

use sqlx::PgPool;

/// Database connection pool type alias.
pub type DbPool = PgPool;
