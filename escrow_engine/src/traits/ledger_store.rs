use thiserror::Error;

use crate::{
    db_types::{
        CaptureUpdate,
        Invoice,
        InvoiceDocument,
        JobPayment,
        MinorUnits,
        NewJobPayment,
        NewPaymentAccount,
        NewPaymentMethod,
        NewPaymentTransaction,
        NewPayoutAccount,
        NewPayoutTransaction,
        PaymentAccount,
        PaymentMethod,
        PaymentTransaction,
        PayoutAccount,
        PayoutTransaction,
        PayoutTransition,
        TransactionStatus,
        Wallet,
        WebhookEventLog,
    },
    traits::AccountManagement,
};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    /// A transient collision with another writer. Safe to retry.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Ledger operation timed out: {0}")]
    Timeout(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Transaction {id} cannot move to {to}. It is currently {from}")]
    IllegalStatusTransition { id: i64, from: TransactionStatus, to: TransactionStatus },
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Timeout(_))
    }
}

const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => LedgerError::Conflict(e.to_string()),
            sqlx::Error::RowNotFound => LedgerError::NotFound(e.to_string()),
            sqlx::Error::Database(db_err) => {
                // Extended result codes keep the primary code in the low byte
                let primary = db_err.code().and_then(|c| c.parse::<i64>().ok()).map(|c| c & 0xff);
                match primary {
                    Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => LedgerError::Conflict(e.to_string()),
                    _ => LedgerError::DatabaseError(e.to_string()),
                }
            },
            _ => LedgerError::DatabaseError(e.to_string()),
        }
    }
}

/// An open unit of ledger work. Everything written through a scope becomes visible together on [`commit`], or not at
/// all. Dropping a scope without committing rolls it back.
///
/// [`commit`]: LedgerScope::commit
#[allow(async_fn_in_trait)]
pub trait LedgerScope: Send {
    async fn commit(self) -> Result<(), LedgerError>;

    async fn rollback(self) -> Result<(), LedgerError>;
}

/// The write side of the escrow ledger.
///
/// Every mutation takes the scope it runs in explicitly, so callers decide which writes must land together. The
/// reads that take a scope see that scope's uncommitted writes.
#[allow(async_fn_in_trait)]
pub trait LedgerStore: Clone + AccountManagement {
    type Scope: LedgerScope;

    /// The URL of the database
    fn url(&self) -> &str;

    async fn begin(&self) -> Result<Self::Scope, LedgerError>;

    // ---------------------------------------  Accounts  ----------------------------------------------------------
    async fn insert_payment_account(
        &self,
        scope: &mut Self::Scope,
        account: NewPaymentAccount,
    ) -> Result<PaymentAccount, LedgerError>;

    async fn accounts_for_user(&self, scope: &mut Self::Scope, user_id: &str)
        -> Result<Vec<PaymentAccount>, LedgerError>;

    async fn accounts_for_customer_id(
        &self,
        scope: &mut Self::Scope,
        customer_id: &str,
    ) -> Result<Vec<PaymentAccount>, LedgerError>;

    async fn accounts_for_connected_account(
        &self,
        scope: &mut Self::Scope,
        connected_account_id: &str,
    ) -> Result<Vec<PaymentAccount>, LedgerError>;

    async fn set_customer_id(
        &self,
        scope: &mut Self::Scope,
        account_id: i64,
        customer_id: &str,
    ) -> Result<PaymentAccount, LedgerError>;

    /// Sets or clears the connected account id for the account
    async fn set_connected_account_id(
        &self,
        scope: &mut Self::Scope,
        account_id: i64,
        connected_account_id: Option<&str>,
    ) -> Result<PaymentAccount, LedgerError>;

    async fn set_onboarding_flags(
        &self,
        scope: &mut Self::Scope,
        account_id: i64,
        is_onboarded: bool,
        payouts_enabled: bool,
    ) -> Result<PaymentAccount, LedgerError>;

    // ---------------------------------------  Payment methods  ---------------------------------------------------
    /// Inserts the method, or overwrites the existing row for the same `(user_id, fingerprint)`.
    async fn upsert_payment_method(
        &self,
        scope: &mut Self::Scope,
        method: NewPaymentMethod,
    ) -> Result<PaymentMethod, LedgerError>;

    async fn default_payment_method(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
    ) -> Result<Option<PaymentMethod>, LedgerError>;

    async fn payment_method_by_external_id(
        &self,
        scope: &mut Self::Scope,
        external_id: &str,
    ) -> Result<Option<PaymentMethod>, LedgerError>;

    /// Marks the method as the user's default and clears the flag on every other method they own.
    async fn mark_default_payment_method(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
        external_id: &str,
    ) -> Result<PaymentMethod, LedgerError>;

    /// Returns the number of rows deleted.
    async fn delete_payment_method(&self, scope: &mut Self::Scope, external_id: &str) -> Result<u64, LedgerError>;

    async fn uncaptured_count_for_fingerprint(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
        fingerprint: &str,
    ) -> Result<i64, LedgerError>;

    // ---------------------------------------  Transactions  ------------------------------------------------------
    async fn insert_transaction(
        &self,
        scope: &mut Self::Scope,
        transaction: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, LedgerError>;

    async fn transaction_by_id(
        &self,
        scope: &mut Self::Scope,
        id: i64,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    async fn transaction_by_external_id(
        &self,
        scope: &mut Self::Scope,
        external_id: &str,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    /// Moves an `Uncaptured` transaction to `Pending` with the recomputed capture figures.
    ///
    /// Fails with [`LedgerError::IllegalStatusTransition`] if the transaction is not `Uncaptured`.
    async fn capture_transaction(
        &self,
        scope: &mut Self::Scope,
        id: i64,
        update: CaptureUpdate,
    ) -> Result<PaymentTransaction, LedgerError>;

    /// Sets the status of the transaction, provided its current status is one of `from`. A new description may be
    /// supplied at the same time.
    ///
    /// Fails with [`LedgerError::IllegalStatusTransition`] if the current status is not in `from`.
    async fn update_transaction_status(
        &self,
        scope: &mut Self::Scope,
        id: i64,
        from: &[TransactionStatus],
        to: TransactionStatus,
        description: Option<String>,
    ) -> Result<PaymentTransaction, LedgerError>;

    /// Records a new capturable amount on an `Uncaptured` transaction. Returns `None` if the transaction has already
    /// moved on.
    async fn set_capturable_amount(
        &self,
        scope: &mut Self::Scope,
        id: i64,
        amount: MinorUnits,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    // ---------------------------------------  Job payments  ------------------------------------------------------
    /// Inserts the job payment, or re-points the existing row for the same `job_id` at `transaction_id`.
    async fn upsert_job_payment(
        &self,
        scope: &mut Self::Scope,
        transaction_id: i64,
        job: NewJobPayment,
    ) -> Result<JobPayment, LedgerError>;

    async fn job_payment_by_job_id(
        &self,
        scope: &mut Self::Scope,
        job_id: &str,
    ) -> Result<Option<JobPayment>, LedgerError>;

    async fn job_payment_for_transaction(
        &self,
        scope: &mut Self::Scope,
        transaction_id: i64,
    ) -> Result<Option<JobPayment>, LedgerError>;

    async fn update_job_payment_fees(
        &self,
        scope: &mut Self::Scope,
        id: i64,
        tax: MinorUnits,
        application_fee: MinorUnits,
    ) -> Result<JobPayment, LedgerError>;

    // ---------------------------------------  Invoices  ----------------------------------------------------------
    /// Writes the invoice for the transaction, replacing any previous version in full.
    async fn upsert_invoice(
        &self,
        scope: &mut Self::Scope,
        transaction_id: i64,
        document: &InvoiceDocument,
        document_url: Option<String>,
    ) -> Result<Invoice, LedgerError>;

    async fn invoice_for_transaction(
        &self,
        scope: &mut Self::Scope,
        transaction_id: i64,
    ) -> Result<Option<Invoice>, LedgerError>;

    async fn delete_invoice(&self, scope: &mut Self::Scope, transaction_id: i64) -> Result<u64, LedgerError>;

    // ---------------------------------------  Wallets  -----------------------------------------------------------
    async fn fetch_or_create_wallet(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
        currency: &str,
    ) -> Result<Wallet, LedgerError>;

    async fn adjust_pending_payout(
        &self,
        scope: &mut Self::Scope,
        wallet_id: i64,
        delta: MinorUnits,
    ) -> Result<Wallet, LedgerError>;

    async fn set_wallet_value(
        &self,
        scope: &mut Self::Scope,
        wallet_id: i64,
        value: MinorUnits,
    ) -> Result<Wallet, LedgerError>;

    async fn set_wallet_pending_value(
        &self,
        scope: &mut Self::Scope,
        wallet_id: i64,
        pending_value: MinorUnits,
    ) -> Result<Wallet, LedgerError>;

    async fn set_last_payout(
        &self,
        scope: &mut Self::Scope,
        wallet_id: i64,
        payout_id: i64,
    ) -> Result<Wallet, LedgerError>;

    // ---------------------------------------  Payout accounts  ---------------------------------------------------
    async fn upsert_payout_account(
        &self,
        scope: &mut Self::Scope,
        account: NewPayoutAccount,
    ) -> Result<PayoutAccount, LedgerError>;

    /// Overwrites an existing payout account. Returns `None` if there is no row for the external id.
    async fn update_payout_account(
        &self,
        scope: &mut Self::Scope,
        account: NewPayoutAccount,
    ) -> Result<Option<PayoutAccount>, LedgerError>;

    async fn payout_account_by_external_id(
        &self,
        scope: &mut Self::Scope,
        external_id: &str,
    ) -> Result<Option<PayoutAccount>, LedgerError>;

    async fn set_payout_account_active(
        &self,
        scope: &mut Self::Scope,
        external_id: &str,
        active: bool,
    ) -> Result<u64, LedgerError>;

    /// Deletes `user_id`'s payout account. Another user's account with the same external id is left alone.
    async fn delete_payout_account(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
        external_id: &str,
    ) -> Result<u64, LedgerError>;

    async fn delete_payout_accounts_for_user(&self, scope: &mut Self::Scope, user_id: &str)
        -> Result<u64, LedgerError>;

    // ---------------------------------------  Payouts  -----------------------------------------------------------
    /// Records a payout lifecycle event, keyed by `(user_id, external_id, wallet_id)`.
    ///
    /// A terminal payout is never moved again. The returned [`PayoutTransition`] says what actually changed, so the
    /// caller can apply the matching wallet delta exactly once.
    async fn upsert_payout(
        &self,
        scope: &mut Self::Scope,
        payout: NewPayoutTransaction,
    ) -> Result<(PayoutTransaction, PayoutTransition), LedgerError>;

    // ---------------------------------------  Webhook log  -------------------------------------------------------
    /// Atomically records a delivery of the event and returns the log entry. `deliveries == 1` means this caller is the
    /// first to see the event.
    async fn claim_webhook_event(&self, event_type: &str, event_id: &str) -> Result<WebhookEventLog, LedgerError>;

    /// Forgets the event so that a redelivery is processed again.
    async fn release_webhook_event(&self, event_type: &str, event_id: &str) -> Result<(), LedgerError>;
}
