//! Ledger entities.
//!
//! These are the rows owned by the [`crate::LedgerStore`]. Nothing outside the store writes them, and the only writers
//! of [`PaymentTransaction::status`] are the escrow flow and the event reconciler.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use epg_common::MinorUnits;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------   TransactionStatus     -----------------------------------------------------
/// The lifecycle of a [`PaymentTransaction`].
///
/// ```text
///   authorize ─► Uncaptured ─┬─ capture ─► Pending ─┬─► Success
///                            │                       └─► Failed
///                            └─ cancel ──► Declined
///   one-shot charge ───────────────────────► Pending
/// ```
/// `Success`, `Failed` and `Declined` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Declined,
    Uncaptured,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Declined)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Success => write!(f, "Success"),
            Self::Failed => write!(f, "Failed"),
            Self::Declined => write!(f, "Declined"),
            Self::Uncaptured => write!(f, "Uncaptured"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            "Declined" => Ok(Self::Declined),
            "Uncaptured" => Ok(Self::Uncaptured),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to Pending");
            Self::Pending
        })
    }
}

//--------------------------------------   PaymentAccount     --------------------------------------------------------
/// The link between a marketplace user and their identities at the payment processor.
///
/// A user may have at most one of these. The store does not enforce that with a constraint, so every financial
/// operation resolves accounts through a check that fails loudly when it finds more than one.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentAccount {
    pub id: i64,
    pub user_id: String,
    /// The customer identity used when this user pays
    pub customer_id: Option<String>,
    /// The connected-account identity used when this user is paid
    pub connected_account_id: Option<String>,
    pub is_onboarded: bool,
    pub payouts_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPaymentAccount {
    pub user_id: String,
    pub customer_id: Option<String>,
    pub connected_account_id: Option<String>,
}

impl NewPaymentAccount {
    pub fn new<S: Into<String>>(user_id: S) -> Self {
        Self { user_id: user_id.into(), ..Default::default() }
    }

    pub fn with_customer_id<S: Into<String>>(mut self, customer_id: S) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_connected_account_id<S: Into<String>>(mut self, account_id: S) -> Self {
        self.connected_account_id = Some(account_id.into());
        self
    }
}

//--------------------------------------   PaymentMethod     ---------------------------------------------------------
/// The card details that are copied onto a transaction when it is created, so that history survives the method being
/// detached later.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct MethodSnapshot {
    pub name: Option<String>,
    pub fingerprint: Option<String>,
    pub last4: Option<String>,
    pub brand: Option<String>,
    pub exp_month: Option<i64>,
    pub exp_year: Option<i64>,
    pub wallet: Option<String>,
    pub method_type: Option<String>,
}

impl MethodSnapshot {
    /// e.g. `visa **** 4242 EXP: 12.2030`
    pub fn label(&self) -> String {
        format!(
            "{} **** {} EXP: {}.{}",
            self.brand.as_deref().unwrap_or("card"),
            self.last4.as_deref().unwrap_or("????"),
            self.exp_month.map(|m| m.to_string()).unwrap_or_default(),
            self.exp_year.map(|y| y.to_string()).unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentMethod {
    pub id: i64,
    pub user_id: String,
    /// The payment method id at the processor
    pub external_id: String,
    pub country: Option<String>,
    pub is_default: bool,
    #[sqlx(flatten)]
    pub details: MethodSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPaymentMethod {
    pub user_id: String,
    pub external_id: String,
    pub fingerprint: String,
    pub country: Option<String>,
    pub details: MethodSnapshot,
}

//--------------------------------------   PaymentTransaction     ----------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentTransaction {
    pub id: i64,
    /// The paying user
    pub sender: String,
    /// The user being paid. `None` for payments to the platform itself.
    pub recipient: Option<String>,
    pub status: TransactionStatus,
    /// The gross amount. For escrow transactions this is the hold amount, i.e. job amount + payer fees + tax.
    pub amount: MinorUnits,
    pub currency: String,
    pub description: String,
    pub country: Option<String>,
    pub customer_id: Option<String>,
    pub connected_account_id: Option<String>,
    /// The hold or charge identity at the processor
    pub external_id: String,
    #[sqlx(flatten)]
    pub method: MethodSnapshot,
    /// The percentage fee
    pub service_charge: MinorUnits,
    pub mobilization_fee: MinorUnits,
    pub tax: MinorUnits,
    pub deployee_revenue: MinorUnits,
    pub is_application: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub sender: String,
    pub recipient: Option<String>,
    pub status: TransactionStatus,
    pub amount: MinorUnits,
    pub currency: String,
    pub description: String,
    pub country: Option<String>,
    pub customer_id: Option<String>,
    pub connected_account_id: Option<String>,
    pub external_id: String,
    pub method: MethodSnapshot,
    pub service_charge: MinorUnits,
    pub mobilization_fee: MinorUnits,
    pub tax: MinorUnits,
    pub deployee_revenue: MinorUnits,
    pub is_application: bool,
}

/// The fields a capture rewrites on an escrow transaction.
#[derive(Debug, Clone)]
pub struct CaptureUpdate {
    pub amount: MinorUnits,
    pub tax: MinorUnits,
    pub deployee_revenue: MinorUnits,
    pub description: String,
}

//--------------------------------------   JobPayment     ------------------------------------------------------------
/// Escrow metadata for a marketplace job. Kept separately from the transaction so that fees can be recomputed when the
/// captured amount differs from the authorized one.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobPayment {
    pub id: i64,
    pub transaction_id: i64,
    pub job_id: String,
    /// The job amount before any fees or tax
    pub amount: MinorUnits,
    pub tax: MinorUnits,
    /// The surcharge paid by the payer
    pub deployer_charge: MinorUnits,
    pub application_fee: MinorUnits,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJobPayment {
    pub job_id: String,
    pub amount: MinorUnits,
    pub tax: MinorUnits,
    pub deployer_charge: MinorUnits,
    pub application_fee: MinorUnits,
    pub description: String,
}

//--------------------------------------   Invoice     ---------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Complete,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Invoice {
    pub id: i64,
    pub transaction_id: i64,
    pub user_id: String,
    pub reference: String,
    pub job_status: JobStatus,
    pub description: String,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub deployee: Option<String>,
    pub tax: MinorUnits,
    pub amount: MinorUnits,
    pub fees: MinorUnits,
    pub total: MinorUnits,
    pub payment_method: String,
    pub document_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything an invoice document is rendered from. The same value is stored in the ledger once rendering succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDocument {
    pub user_id: String,
    pub reference: String,
    pub job_status: JobStatus,
    pub description: String,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub deployee: Option<String>,
    pub tax: MinorUnits,
    pub amount: MinorUnits,
    pub fees: MinorUnits,
    pub total: MinorUnits,
    pub payment_method: String,
}

impl From<&Invoice> for InvoiceDocument {
    fn from(invoice: &Invoice) -> Self {
        Self {
            user_id: invoice.user_id.clone(),
            reference: invoice.reference.clone(),
            job_status: invoice.job_status,
            description: invoice.description.clone(),
            job_title: invoice.job_title.clone(),
            location: invoice.location.clone(),
            deployee: invoice.deployee.clone(),
            tax: invoice.tax,
            amount: invoice.amount,
            fees: invoice.fees,
            total: invoice.total,
            payment_method: invoice.payment_method.clone(),
        }
    }
}

//--------------------------------------   Wallet     ----------------------------------------------------------------
/// Local mirror of a connected account's balance at the processor, per currency.
///
/// `value` and `pending_value` are only ever overwritten from processor balance snapshots. `pending_payout` is a
/// running counter that only payout lifecycle events move.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: String,
    pub currency: String,
    pub value: MinorUnits,
    pub pending_value: MinorUnits,
    pub pending_payout: MinorUnits,
    pub is_active: bool,
    pub last_payout_transaction_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// The amount that can still be paid out once in-flight payouts are accounted for.
    pub fn available_for_payout(&self) -> MinorUnits {
        self.value - self.pending_payout
    }
}

//--------------------------------------   PayoutAccount     ---------------------------------------------------------
/// An external destination (bank account or debit card) that a connected account can pay out to.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PayoutAccount {
    pub id: i64,
    pub user_id: String,
    pub external_id: String,
    pub is_bank: bool,
    pub name: Option<String>,
    pub bank_name: Option<String>,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub routing_number: Option<String>,
    pub currency: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPayoutAccount {
    pub user_id: String,
    pub external_id: String,
    pub is_bank: bool,
    pub name: Option<String>,
    pub bank_name: Option<String>,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub routing_number: Option<String>,
    pub currency: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
}

//--------------------------------------   PayoutTransaction     -----------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PayoutTransaction {
    pub id: i64,
    pub user_id: String,
    /// The payout id at the processor
    pub external_id: String,
    pub wallet_id: i64,
    /// The external account the payout was sent to
    pub destination: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayoutTransaction {
    pub user_id: String,
    pub external_id: String,
    pub wallet_id: i64,
    pub destination: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: TransactionStatus,
    pub description: Option<String>,
}

/// What an upsert of a payout lifecycle event did to the payout ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutTransition {
    pub id: i64,
    /// `None` when the upsert inserted a new row
    pub previous: Option<TransactionStatus>,
    pub current: TransactionStatus,
}

impl PayoutTransition {
    /// The change to apply to the wallet's pending payout counter for this transition. Each payout adds to the counter
    /// once when it is first seen in flight and removes it once when it settles.
    pub fn pending_payout_delta(&self, amount: MinorUnits) -> MinorUnits {
        use TransactionStatus::*;
        match (self.previous, self.current) {
            (None, Pending) => amount,
            (Some(Pending), Success | Failed) => -amount,
            _ => MinorUnits::default(),
        }
    }
}

//--------------------------------------   WebhookEventLog     -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEventLog {
    pub id: i64,
    pub event_type: String,
    pub event_id: String,
    pub deliveries: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payout_deltas_apply_once_per_lifecycle() {
        use TransactionStatus::*;
        let amt = MinorUnits::from(5_000);
        let t = |previous, current| PayoutTransition { id: 1, previous, current };
        assert_eq!(t(None, Pending).pending_payout_delta(amt), amt);
        assert_eq!(t(Some(Pending), Pending).pending_payout_delta(amt), MinorUnits::from(0));
        assert_eq!(t(Some(Pending), Success).pending_payout_delta(amt), -amt);
        assert_eq!(t(Some(Pending), Failed).pending_payout_delta(amt), -amt);
        assert_eq!(t(Some(Success), Success).pending_payout_delta(amt), MinorUnits::from(0));
        assert_eq!(t(None, Success).pending_payout_delta(amt), MinorUnits::from(0));
    }

    #[test]
    fn status_strings() {
        for s in ["Pending", "Success", "Failed", "Declined", "Uncaptured"] {
            let status = TransactionStatus::from_str(s).unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!(TransactionStatus::from_str("Lost").is_err());
        assert!(TransactionStatus::Declined.is_terminal());
        assert!(!TransactionStatus::Uncaptured.is_terminal());
    }

    #[test]
    fn method_label() {
        let snap = MethodSnapshot {
            brand: Some("visa".into()),
            last4: Some("4242".into()),
            exp_month: Some(12),
            exp_year: Some(2030),
            ..Default::default()
        };
        assert_eq!(snap.label(), "visa **** 4242 EXP: 12.2030");
    }
}
