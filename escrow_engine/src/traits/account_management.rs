use crate::{
    db_types::{
        Invoice,
        JobPayment,
        PaymentAccount,
        PaymentMethod,
        PaymentTransaction,
        PayoutAccount,
        PayoutTransaction,
        Wallet,
        WebhookEventLog,
    },
    traits::{
        data_objects::{HistoryEntry, Pagination},
        LedgerError,
    },
};

/// Read-only queries over the ledger. None of these open a scope; they see committed data only.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    async fn fetch_payment_accounts(&self, user_id: &str) -> Result<Vec<PaymentAccount>, LedgerError>;

    async fn fetch_payment_methods(&self, user_id: &str) -> Result<Vec<PaymentMethod>, LedgerError>;

    async fn fetch_wallet(&self, user_id: &str, currency: &str) -> Result<Option<Wallet>, LedgerError>;

    async fn fetch_wallets(&self, user_id: &str) -> Result<Vec<Wallet>, LedgerError>;

    async fn fetch_payout_accounts(&self, user_id: &str) -> Result<Vec<PayoutAccount>, LedgerError>;

    async fn fetch_payouts(&self, user_id: &str) -> Result<Vec<PayoutTransaction>, LedgerError>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, LedgerError>;

    async fn fetch_transaction_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    async fn fetch_job_payment(&self, job_id: &str) -> Result<Option<JobPayment>, LedgerError>;

    async fn fetch_invoice_for_transaction(&self, transaction_id: i64) -> Result<Option<Invoice>, LedgerError>;

    /// Transactions the user sent, plus the successful ones they received, newest first.
    async fn transaction_history(&self, user_id: &str, page: Pagination) -> Result<Vec<HistoryEntry>, LedgerError>;

    /// The user's invoices, newest first
    async fn invoices_for_user(&self, user_id: &str, page: Pagination) -> Result<Vec<Invoice>, LedgerError>;

    async fn fetch_webhook_event(&self, event_type: &str, event_id: &str)
        -> Result<Option<WebhookEventLog>, LedgerError>;
}
