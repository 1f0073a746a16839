pub mod account_service;
pub mod ledger_service;
pub mod outbox_dispatcher;
pub mod payment_service;
pub mod settlement_service;

pub use account_service::AccountService;
pub use ledger_service::{LedgerService, PostTransactionRequest, PostedTransaction};
pub use outbox_dispatcher::{DispatchStats, OutboxDispatcher};
pub use payment_service::{AdmissionOutcome, PaymentService};
pub use settlement_service::SettlementService;
