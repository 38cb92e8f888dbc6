//! # Backend and collaborator contracts
//!
//! * [`LedgerStore`] is the write side of the escrow ledger. All mutations run inside an explicit
//!   [`LedgerScope`] that the caller opens, threads through each call, and commits.
//! * [`AccountManagement`] provides read-only queries over committed ledger data.
//! * [`PaymentProcessor`] is everything the engine asks of the external payment processor.
//! * [`InvoiceRenderer`] and [`Notifier`] are the document and push-notification collaborators.
//!
//! The ledger traits follow the backend pattern: a concrete database (e.g. [`crate::SqliteDatabase`]) implements them
//! and the APIs are generic over it. The collaborator traits are object-safe and are held as `Arc<dyn ..>`.
mod account_management;
mod collaborators;
mod data_objects;
mod ledger_store;
mod payment_processor;

pub use account_management::AccountManagement;
pub use collaborators::{InvoiceRenderer, Notification, Notifier, NotifyError, RenderError};
pub use data_objects::{AccountInfo, HistoryEntry, Pagination, DEFAULT_PAGE_SIZE};
pub use ledger_store::{LedgerError, LedgerScope, LedgerStore};
pub use payment_processor::{PaymentProcessor, ProcessorError};
