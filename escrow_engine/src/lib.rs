//! Escrow Payment Engine
//!
//! The escrow engine settles marketplace job payments through an external payment processor (EPP) and keeps a local
//! ledger in step with what the processor reports. Payers' funds are held when a job is booked, captured when the job
//! is done, and paid out to the payee's connected account.
//!
//! The library is divided into these sections:
//! 1. The ledger ([`mod@traits`], [`mod@sqlite`] and [`mod@db_types`]). The [`LedgerStore`] trait describes every
//!    mutation, each of which runs inside an explicit scope. SQLite is the supported backend.
//! 2. The engine public API ([`mod@escrow_api`]). [`EscrowApi`] drives holds, captures and cancellations,
//!    [`WebhookGate`] and [`EventReconciler`] apply processor events, [`WalletApi`] requests payouts, and
//!    [`AccountApi`] manages accounts and payment methods.
//! 3. Pure building blocks: fee calculation ([`mod@fees`]), signature verification and retries ([`mod@helpers`]), the
//!    saga runner ([`mod@saga`]) and the processor's wire types ([`mod@epp`]).
//!
//! The engine also emits notification events. A small channel-based hook framework ([`mod@events`]) lets the host
//! route them to a push [`Notifier`] without the payment flows ever waiting on delivery.
pub mod config;
pub mod db_types;
pub mod epp;
pub mod escrow_api;
pub mod events;
pub mod fees;
pub mod helpers;
pub mod saga;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

pub use config::{EngineConfig, SigningContext, WebhookPolicy};
pub use escrow_api::{
    accounts_api::AccountApi,
    errors::{ErrorCategory, EscrowError},
    escrow_flow_api::EscrowApi,
    escrow_objects,
    reconciler::EventReconciler,
    wallet_api::{PayoutReceipt, PayoutRequest, WalletApi},
    webhook_gate::{GateOutcome, WebhookDelivery, WebhookGate},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    AccountManagement,
    InvoiceRenderer,
    LedgerError,
    LedgerScope,
    LedgerStore,
    Notifier,
    PaymentProcessor,
    ProcessorError,
};
