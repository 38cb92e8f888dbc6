//! # Escrow engine public API
//!
//! * [`escrow_flow_api`] moves payments through authorization, capture and cancellation, and takes one-shot payments.
//! * [`webhook_gate`] authenticates, de-duplicates and dispatches inbound processor events.
//! * [`reconciler`] applies each processor event to the ledger.
//! * [`wallet_api`] initiates payouts from connected-account balances.
//! * [`accounts_api`] manages payment accounts and methods and serves read queries.
//!
//! Every API is created from a ledger backend plus the collaborators it needs. The collaborators are shared
//! (`Arc<dyn ..>`) and the configuration is passed in by value and never changes afterwards.
use std::{future::Future, sync::Arc, time::Duration};

use log::*;

use crate::{
    db_types::PaymentAccount,
    traits::{PaymentProcessor, ProcessorError},
};

pub mod accounts_api;
pub mod errors;
pub mod escrow_flow_api;
pub mod escrow_objects;
pub mod reconciler;
pub mod wallet_api;
pub mod webhook_gate;

use errors::EscrowError;

/// Runs a processor call with a deadline. A call that runs out of time may still have taken effect, so it is reported
/// as [`EscrowError::UnknownOutcome`] rather than as a failure.
pub(crate) async fn call_epp<T, F>(timeout: Duration, what: &str, call: F) -> Result<T, EscrowError>
where F: Future<Output = Result<T, ProcessorError>> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => {
            warn!("🔄️ {what} failed. {e}");
            Err(e.into())
        },
        Err(_) => {
            warn!("🔄️ {what} did not complete within {}ms", timeout.as_millis());
            Err(EscrowError::UnknownOutcome(format!("{what} timed out after {}ms", timeout.as_millis())))
        },
    }
}

/// Compensation for a placed hold
pub(crate) fn cancel_hold_later(
    processor: Arc<dyn PaymentProcessor>,
    timeout: Duration,
    hold_id: String,
) -> impl Future<Output = Result<(), String>> + Send + 'static {
    async move {
        match tokio::time::timeout(timeout, processor.cancel_hold(&hold_id)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("Could not cancel hold {hold_id}. {e}")),
            Err(_) => Err(format!("Cancelling hold {hold_id} timed out")),
        }
    }
}

/// Enforces the one-account-per-identity rule. Several matches are a consistency violation; zero matches are left
/// for the caller to interpret.
pub(crate) fn at_most_one(mut accounts: Vec<PaymentAccount>, what: &str) -> Result<Option<PaymentAccount>, EscrowError> {
    match accounts.len() {
        0 => Ok(None),
        1 => Ok(accounts.pop()),
        n => {
            error!("🔄️ Found {n} payment accounts for {what}. There must be at most one.");
            Err(EscrowError::ConsistencyViolation(format!("{n} payment accounts exist for {what}")))
        },
    }
}

/// Like [`at_most_one`], but a missing account is also a consistency violation. Used when the processor refers to
/// an identity that the ledger should already know about.
pub(crate) fn exactly_one(accounts: Vec<PaymentAccount>, what: &str) -> Result<PaymentAccount, EscrowError> {
    at_most_one(accounts, what)?
        .ok_or_else(|| EscrowError::ConsistencyViolation(format!("No payment account exists for {what}")))
}
