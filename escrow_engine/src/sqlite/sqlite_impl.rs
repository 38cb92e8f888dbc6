//! `SqliteDatabase` is the SQLite ledger backend.
//!
//! It implements [`LedgerStore`] and [`AccountManagement`] by delegating to the query functions in [`super::db`]. A
//! [`SqliteScope`] is a thin wrapper around an open `sqlx` transaction.
use std::fmt::Debug;

use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqliteConnection, SqlitePool, Transaction};

use super::db::{
    accounts,
    db_url,
    invoices,
    job_payments,
    new_pool,
    payment_methods,
    payout_accounts,
    payouts,
    transactions,
    wallets,
    webhook_events,
};
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
    traits::{AccountManagement, HistoryEntry, LedgerError, LedgerScope, LedgerStore, Pagination},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `EPG_DATABASE_URL` for the connection
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Opens the database at `url`, creating the file if needed, and brings the schema up to date.
    pub async fn open_and_migrate(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        if !Sqlite::database_exists(url).await? {
            info!("🗃️ Creating database {url}");
            Sqlite::create_database(url).await?;
        }
        let db = SqliteDatabase::new_with_url(url, max_connections).await?;
        sqlx::migrate!("./src/sqlite/migrations").run(db.pool()).await?;
        debug!("🗃️ Migrations complete");
        Ok(db)
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct SqliteScope {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteScope {
    fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

impl LedgerScope for SqliteScope {
    async fn commit(self) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl LedgerStore for SqliteDatabase {
    type Scope = SqliteScope;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn begin(&self) -> Result<Self::Scope, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(SqliteScope { tx })
    }

    async fn insert_payment_account(
        &self,
        scope: &mut Self::Scope,
        account: NewPaymentAccount,
    ) -> Result<PaymentAccount, LedgerError> {
        accounts::insert_account(account, scope.conn()).await
    }

    async fn accounts_for_user(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
    ) -> Result<Vec<PaymentAccount>, LedgerError> {
        accounts::accounts_for_user(user_id, scope.conn()).await
    }

    async fn accounts_for_customer_id(
        &self,
        scope: &mut Self::Scope,
        customer_id: &str,
    ) -> Result<Vec<PaymentAccount>, LedgerError> {
        accounts::accounts_for_customer_id(customer_id, scope.conn()).await
    }

    async fn accounts_for_connected_account(
        &self,
        scope: &mut Self::Scope,
        connected_account_id: &str,
    ) -> Result<Vec<PaymentAccount>, LedgerError> {
        accounts::accounts_for_connected_account(connected_account_id, scope.conn()).await
    }

    async fn set_customer_id(
        &self,
        scope: &mut Self::Scope,
        account_id: i64,
        customer_id: &str,
    ) -> Result<PaymentAccount, LedgerError> {
        accounts::set_customer_id(account_id, customer_id, scope.conn()).await
    }

    async fn set_connected_account_id(
        &self,
        scope: &mut Self::Scope,
        account_id: i64,
        connected_account_id: Option<&str>,
    ) -> Result<PaymentAccount, LedgerError> {
        accounts::set_connected_account_id(account_id, connected_account_id, scope.conn()).await
    }

    async fn set_onboarding_flags(
        &self,
        scope: &mut Self::Scope,
        account_id: i64,
        is_onboarded: bool,
        payouts_enabled: bool,
    ) -> Result<PaymentAccount, LedgerError> {
        accounts::set_onboarding_flags(account_id, is_onboarded, payouts_enabled, scope.conn()).await
    }

    async fn upsert_payment_method(
        &self,
        scope: &mut Self::Scope,
        method: NewPaymentMethod,
    ) -> Result<PaymentMethod, LedgerError> {
        payment_methods::upsert_method(method, scope.conn()).await
    }

    async fn default_payment_method(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
    ) -> Result<Option<PaymentMethod>, LedgerError> {
        payment_methods::default_method(user_id, scope.conn()).await
    }

    async fn payment_method_by_external_id(
        &self,
        scope: &mut Self::Scope,
        external_id: &str,
    ) -> Result<Option<PaymentMethod>, LedgerError> {
        payment_methods::method_by_external_id(external_id, scope.conn()).await
    }

    async fn mark_default_payment_method(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
        external_id: &str,
    ) -> Result<PaymentMethod, LedgerError> {
        payment_methods::mark_default(user_id, external_id, scope.conn()).await
    }

    async fn delete_payment_method(&self, scope: &mut Self::Scope, external_id: &str) -> Result<u64, LedgerError> {
        payment_methods::delete_method(external_id, scope.conn()).await
    }

    async fn uncaptured_count_for_fingerprint(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
        fingerprint: &str,
    ) -> Result<i64, LedgerError> {
        transactions::uncaptured_count_for_fingerprint(user_id, fingerprint, scope.conn()).await
    }

    async fn insert_transaction(
        &self,
        scope: &mut Self::Scope,
        transaction: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, LedgerError> {
        transactions::insert_transaction(transaction, scope.conn()).await
    }

    async fn transaction_by_id(
        &self,
        scope: &mut Self::Scope,
        id: i64,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        transactions::transaction_by_id(id, scope.conn()).await
    }

    async fn transaction_by_external_id(
        &self,
        scope: &mut Self::Scope,
        external_id: &str,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        transactions::transaction_by_external_id(external_id, scope.conn()).await
    }

    async fn capture_transaction(
        &self,
        scope: &mut Self::Scope,
        id: i64,
        update: CaptureUpdate,
    ) -> Result<PaymentTransaction, LedgerError> {
        transactions::capture_transaction(id, update, scope.conn()).await
    }

    async fn update_transaction_status(
        &self,
        scope: &mut Self::Scope,
        id: i64,
        from: &[TransactionStatus],
        to: TransactionStatus,
        description: Option<String>,
    ) -> Result<PaymentTransaction, LedgerError> {
        transactions::update_status(id, from, to, description, scope.conn()).await
    }

    async fn set_capturable_amount(
        &self,
        scope: &mut Self::Scope,
        id: i64,
        amount: MinorUnits,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        transactions::set_capturable_amount(id, amount, scope.conn()).await
    }

    async fn upsert_job_payment(
        &self,
        scope: &mut Self::Scope,
        transaction_id: i64,
        job: NewJobPayment,
    ) -> Result<JobPayment, LedgerError> {
        job_payments::upsert_job_payment(transaction_id, job, scope.conn()).await
    }

    async fn job_payment_by_job_id(
        &self,
        scope: &mut Self::Scope,
        job_id: &str,
    ) -> Result<Option<JobPayment>, LedgerError> {
        job_payments::job_payment_by_job_id(job_id, scope.conn()).await
    }

    async fn job_payment_for_transaction(
        &self,
        scope: &mut Self::Scope,
        transaction_id: i64,
    ) -> Result<Option<JobPayment>, LedgerError> {
        job_payments::job_payment_for_transaction(transaction_id, scope.conn()).await
    }

    async fn update_job_payment_fees(
        &self,
        scope: &mut Self::Scope,
        id: i64,
        tax: MinorUnits,
        application_fee: MinorUnits,
    ) -> Result<JobPayment, LedgerError> {
        job_payments::update_fees(id, tax, application_fee, scope.conn()).await
    }

    async fn upsert_invoice(
        &self,
        scope: &mut Self::Scope,
        transaction_id: i64,
        document: &InvoiceDocument,
        document_url: Option<String>,
    ) -> Result<Invoice, LedgerError> {
        invoices::upsert_invoice(transaction_id, document, document_url, scope.conn()).await
    }

    async fn invoice_for_transaction(
        &self,
        scope: &mut Self::Scope,
        transaction_id: i64,
    ) -> Result<Option<Invoice>, LedgerError> {
        invoices::invoice_for_transaction(transaction_id, scope.conn()).await
    }

    async fn delete_invoice(&self, scope: &mut Self::Scope, transaction_id: i64) -> Result<u64, LedgerError> {
        invoices::delete_invoice(transaction_id, scope.conn()).await
    }

    async fn fetch_or_create_wallet(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
        currency: &str,
    ) -> Result<Wallet, LedgerError> {
        wallets::fetch_or_create_wallet(user_id, currency, scope.conn()).await
    }

    async fn adjust_pending_payout(
        &self,
        scope: &mut Self::Scope,
        wallet_id: i64,
        delta: MinorUnits,
    ) -> Result<Wallet, LedgerError> {
        wallets::adjust_pending_payout(wallet_id, delta, scope.conn()).await
    }

    async fn set_wallet_value(
        &self,
        scope: &mut Self::Scope,
        wallet_id: i64,
        value: MinorUnits,
    ) -> Result<Wallet, LedgerError> {
        wallets::set_value(wallet_id, value, scope.conn()).await
    }

    async fn set_wallet_pending_value(
        &self,
        scope: &mut Self::Scope,
        wallet_id: i64,
        pending_value: MinorUnits,
    ) -> Result<Wallet, LedgerError> {
        wallets::set_pending_value(wallet_id, pending_value, scope.conn()).await
    }

    async fn set_last_payout(
        &self,
        scope: &mut Self::Scope,
        wallet_id: i64,
        payout_id: i64,
    ) -> Result<Wallet, LedgerError> {
        wallets::set_last_payout(wallet_id, payout_id, scope.conn()).await
    }

    async fn upsert_payout_account(
        &self,
        scope: &mut Self::Scope,
        account: NewPayoutAccount,
    ) -> Result<PayoutAccount, LedgerError> {
        payout_accounts::upsert_payout_account(account, scope.conn()).await
    }

    async fn update_payout_account(
        &self,
        scope: &mut Self::Scope,
        account: NewPayoutAccount,
    ) -> Result<Option<PayoutAccount>, LedgerError> {
        payout_accounts::update_payout_account(account, scope.conn()).await
    }

    async fn payout_account_by_external_id(
        &self,
        scope: &mut Self::Scope,
        external_id: &str,
    ) -> Result<Option<PayoutAccount>, LedgerError> {
        payout_accounts::payout_account_by_external_id(external_id, scope.conn()).await
    }

    async fn set_payout_account_active(
        &self,
        scope: &mut Self::Scope,
        external_id: &str,
        active: bool,
    ) -> Result<u64, LedgerError> {
        payout_accounts::set_active(external_id, active, scope.conn()).await
    }

    async fn delete_payout_account(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
        external_id: &str,
    ) -> Result<u64, LedgerError> {
        payout_accounts::delete_payout_account(user_id, external_id, scope.conn()).await
    }

    async fn delete_payout_accounts_for_user(
        &self,
        scope: &mut Self::Scope,
        user_id: &str,
    ) -> Result<u64, LedgerError> {
        payout_accounts::delete_for_user(user_id, scope.conn()).await
    }

    async fn upsert_payout(
        &self,
        scope: &mut Self::Scope,
        payout: NewPayoutTransaction,
    ) -> Result<(PayoutTransaction, PayoutTransition), LedgerError> {
        payouts::upsert_payout(payout, scope.conn()).await
    }

    async fn claim_webhook_event(&self, event_type: &str, event_id: &str) -> Result<WebhookEventLog, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::claim_event(event_type, event_id, &mut conn).await
    }

    async fn release_webhook_event(&self, event_type: &str, event_id: &str) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::release_event(event_type, event_id, &mut conn).await
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_payment_accounts(&self, user_id: &str) -> Result<Vec<PaymentAccount>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        accounts::accounts_for_user(user_id, &mut conn).await
    }

    async fn fetch_payment_methods(&self, user_id: &str) -> Result<Vec<PaymentMethod>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payment_methods::methods_for_user(user_id, &mut conn).await
    }

    async fn fetch_wallet(&self, user_id: &str, currency: &str) -> Result<Option<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_wallet(user_id, currency, &mut conn).await
    }

    async fn fetch_wallets(&self, user_id: &str) -> Result<Vec<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        wallets::wallets_for_user(user_id, &mut conn).await
    }

    async fn fetch_payout_accounts(&self, user_id: &str) -> Result<Vec<PayoutAccount>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payout_accounts::payout_accounts_for_user(user_id, &mut conn).await
    }

    async fn fetch_payouts(&self, user_id: &str) -> Result<Vec<PayoutTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payouts::payouts_for_user(user_id, &mut conn).await
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::transaction_by_id(id, &mut conn).await
    }

    async fn fetch_transaction_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::transaction_by_external_id(external_id, &mut conn).await
    }

    async fn fetch_job_payment(&self, job_id: &str) -> Result<Option<JobPayment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        job_payments::job_payment_by_job_id(job_id, &mut conn).await
    }

    async fn fetch_invoice_for_transaction(&self, transaction_id: i64) -> Result<Option<Invoice>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        invoices::invoice_for_transaction(transaction_id, &mut conn).await
    }

    async fn transaction_history(&self, user_id: &str, page: Pagination) -> Result<Vec<HistoryEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::history_for_user(user_id, page, &mut conn).await
    }

    async fn invoices_for_user(&self, user_id: &str, page: Pagination) -> Result<Vec<Invoice>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        invoices::invoices_for_user(user_id, page, &mut conn).await
    }

    async fn fetch_webhook_event(
        &self,
        event_type: &str,
        event_id: &str,
    ) -> Result<Option<WebhookEventLog>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::fetch_event(event_type, event_id, &mut conn).await
    }
}
