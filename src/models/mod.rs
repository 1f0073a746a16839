pub mod account;
pub mod currency;
pub mod ledger_entry;
pub mod outbox_event;
pub mod payment;
pub mod processed_event;
pub mod transaction;

pub use account::{Account, AccountType};
pub use currency::Currency;
pub use ledger_entry::{EntryLine, EntryType, LedgerEntry};
pub use outbox_event::OutboxEvent;
pub use payment::{Payment, PaymentRecord, PaymentStatus};
pub use processed_event::{ProcessedEvent, ProcessingResult};
pub use transaction::LedgerTransaction;
