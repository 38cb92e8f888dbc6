//! Applies verified processor events to the ledger.
//!
//! Each [`EventKind`] has exactly one handler. Handlers return [`EscrowError::RetryRequested`] when the event cannot be
//! applied *yet* (a missing prerequisite, or a ledger write that may succeed next time), so that the processor delivers
//! it again. Any other error is final for that event.
//!
//! Handlers first resolve the one payment account the event is about, by customer id or connected account id. No
//! match, or more than one, is a [`EscrowError::ConsistencyViolation`] and nothing is changed. Detached payment methods
//! no longer name a customer and are removed by their own id.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use log::*;

use crate::{
    config::EngineConfig,
    db_types::{
        InvoiceDocument,
        JobPayment,
        JobStatus,
        MethodSnapshot,
        MinorUnits,
        NewPaymentMethod,
        NewPayoutAccount,
        NewPayoutTransaction,
        PaymentAccount,
        PaymentTransaction,
        TransactionStatus,
    },
    epp::{
        Balance,
        ConnectedAccountObject,
        EppEvent,
        EventKind,
        ExternalAccountObject,
        PaymentIntentObject,
        PaymentMethodObject,
        PayoutObject,
    },
    escrow_api::{at_most_one, call_epp, errors::EscrowError, escrow_flow_api::call_render, exactly_one},
    events::{EventProducers, NotificationEvent, NotificationKind},
    helpers::with_retries,
    saga::Saga,
    traits::{InvoiceRenderer, LedgerError, LedgerScope, LedgerStore, PaymentProcessor},
};

pub struct EventReconciler<B> {
    db: B,
    processor: Arc<dyn PaymentProcessor>,
    renderer: Arc<dyn InvoiceRenderer>,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B> Debug for EventReconciler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventReconciler")
    }
}

impl<B> EventReconciler<B> {
    pub fn new(
        db: B,
        processor: Arc<dyn PaymentProcessor>,
        renderer: Arc<dyn InvoiceRenderer>,
        config: EngineConfig,
        producers: EventProducers,
    ) -> Self {
        Self { db, processor, renderer, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> EventReconciler<B>
where B: LedgerStore
{
    pub async fn handle(&self, event: &EppEvent) -> Result<(), EscrowError> {
        debug!("🪝️ Reconciling {} ({})", event.id, event.event_type);
        let account = event.account.as_deref();
        let result = match &event.kind {
            EventKind::PaymentSucceeded(intent) => self.payment_succeeded(intent).await,
            EventKind::AmountCapturableUpdated(intent) => self.amount_capturable_updated(intent).await,
            EventKind::PaymentFailed(intent) => self.payment_failed(intent).await,
            EventKind::PaymentCanceled(intent) => self.payment_canceled(intent).await,
            EventKind::AccountUpdated(acct) => self.account_updated(acct).await,
            EventKind::ExternalAccountCreated(ext) => self.external_account_created(account, ext).await,
            EventKind::ExternalAccountUpdated(ext) => self.external_account_updated(account, ext).await,
            EventKind::ExternalAccountDeleted(ext) => self.external_account_deleted(account, ext).await,
            EventKind::AccountDeauthorized(_) => self.account_deauthorized(account).await,
            EventKind::PayoutInFlight(payout) => self.payout_in_flight(account, payout).await,
            EventKind::PayoutPaid(payout) => self.payout_paid(account, payout).await,
            EventKind::PayoutFailed(payout) => self.payout_failed(account, payout).await,
            EventKind::BalanceAvailable(balance) => self.balance_available(account, balance).await,
            EventKind::PaymentMethodUpserted(method) => self.payment_method_upserted(method).await,
            EventKind::PaymentMethodDetached(method) => self.payment_method_detached(method).await,
        };
        result.map_err(redeliver_ledger_failures)
    }

    //---------------------------------------   Payment intents   -------------------------------------------------
    async fn payment_succeeded(&self, intent: &PaymentIntentObject) -> Result<(), EscrowError> {
        let txn = self.payer_transaction(intent).await?;
        if txn.status == TransactionStatus::Success {
            debug!("🪝️ Transaction #{} is already settled", txn.id);
            return Ok(());
        }
        let (job, invoice) = {
            let mut scope = self.db.begin().await?;
            let job = self.db.job_payment_for_transaction(&mut scope, txn.id).await?;
            let invoice = self.db.invoice_for_transaction(&mut scope, txn.id).await?;
            scope.rollback().await?;
            (job, invoice)
        };
        let base = invoice.as_ref().map(InvoiceDocument::from);
        let is_application = intent.is_application() || txn.is_application;
        let document = settled_invoice(&txn, job.as_ref(), base, intent.settled_amount(), is_application);
        let url = call_render(self.renderer.as_ref(), &document, self.config.epp_timeout)
            .await
            .map_err(|e| EscrowError::RetryRequested(e.to_string()))?;

        let settled = with_retries(&self.config.retry, "payment_succeeded", || async {
            let mut scope = self.db.begin().await?;
            let t = self
                .db
                .update_transaction_status(
                    &mut scope,
                    txn.id,
                    &[TransactionStatus::Pending, TransactionStatus::Uncaptured],
                    TransactionStatus::Success,
                    None,
                )
                .await?;
            self.db.upsert_invoice(&mut scope, txn.id, &document, Some(url.clone())).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(t)
        })
        .await
        .map_err(retry_unless_illegal)?;
        info!("🪝️ Transaction #{} settled for {}", settled.id, intent.settled_amount());
        let event = NotificationEvent::new(
            NotificationKind::PaymentSucceeded,
            parties(&settled),
            intent.settled_amount(),
            &settled.currency,
        )
        .for_transaction(settled.id);
        self.producers.notify(event).await;
        Ok(())
    }

    async fn amount_capturable_updated(&self, intent: &PaymentIntentObject) -> Result<(), EscrowError> {
        let txn = self.payer_transaction(intent).await?;
        let updated = with_retries(&self.config.retry, "amount_capturable_updated", || async {
            let mut scope = self.db.begin().await?;
            let updated = self.db.set_capturable_amount(&mut scope, txn.id, intent.amount_capturable).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(updated)
        })
        .await?;
        match updated {
            Some(t) => {
                debug!("🪝️ Transaction #{} can capture {}", t.id, t.amount);
                let event =
                    NotificationEvent::new(NotificationKind::PaymentAuthorized, vec![t.sender.clone()], t.amount, &t.currency)
                        .for_transaction(t.id);
                self.producers.notify(event).await;
            },
            None => debug!("🪝️ Transaction #{} is {}. Ignoring capturable amount update", txn.id, txn.status),
        }
        Ok(())
    }

    async fn payment_failed(&self, intent: &PaymentIntentObject) -> Result<(), EscrowError> {
        let txn = self.payer_transaction(intent).await?;
        if txn.status == TransactionStatus::Failed {
            debug!("🪝️ Transaction #{} has already failed", txn.id);
            return Ok(());
        }
        let message = intent.failure_message();
        let is_application = intent.is_application() || txn.is_application;
        let failed = with_retries(&self.config.retry, "payment_failed", || async {
            let mut scope = self.db.begin().await?;
            let t = self
                .db
                .update_transaction_status(
                    &mut scope,
                    txn.id,
                    &[TransactionStatus::Pending, TransactionStatus::Uncaptured],
                    TransactionStatus::Failed,
                    Some(message.clone()),
                )
                .await?;
            if !is_application {
                self.db.delete_invoice(&mut scope, txn.id).await?;
            }
            scope.commit().await?;
            Ok::<_, LedgerError>(t)
        })
        .await
        .map_err(retry_unless_illegal)?;
        info!("🪝️ Transaction #{} failed. {message}", failed.id);
        let event =
            NotificationEvent::new(NotificationKind::PaymentFailed, vec![failed.sender.clone()], failed.amount, &failed.currency)
                .for_transaction(failed.id);
        self.producers.notify(event).await;
        Ok(())
    }

    async fn payment_canceled(&self, intent: &PaymentIntentObject) -> Result<(), EscrowError> {
        let txn = self.payer_transaction(intent).await?;
        if txn.status.is_terminal() {
            // A hold released through `cancel` is already Declined
            debug!("🪝️ Transaction #{} is already {}. Ignoring cancellation", txn.id, txn.status);
            return Ok(());
        }
        let canceled = with_retries(&self.config.retry, "payment_canceled", || async {
            let mut scope = self.db.begin().await?;
            let t = self
                .db
                .update_transaction_status(
                    &mut scope,
                    txn.id,
                    &[TransactionStatus::Pending, TransactionStatus::Uncaptured],
                    TransactionStatus::Failed,
                    None,
                )
                .await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(t)
        })
        .await?;
        info!("🪝️ Transaction #{} was canceled by the processor", canceled.id);
        let event =
            NotificationEvent::new(NotificationKind::PaymentCanceled, parties(&canceled), canceled.amount, &canceled.currency)
                .for_transaction(canceled.id);
        self.producers.notify(event).await;
        Ok(())
    }

    //---------------------------------------   Connected accounts   ----------------------------------------------
    async fn account_updated(&self, acct: &ConnectedAccountObject) -> Result<(), EscrowError> {
        let owner = self.owner_of_connected(&acct.id).await?;
        let ready = acct.is_ready();
        with_retries(&self.config.retry, "account_updated", || async {
            let mut scope = self.db.begin().await?;
            self.db.set_onboarding_flags(&mut scope, owner.id, ready, ready).await?;
            scope.commit().await
        })
        .await?;
        debug!("🪝️ Account {} onboarding status: {ready}", owner.user_id);
        Ok(())
    }

    async fn external_account_created(
        &self,
        account: Option<&str>,
        ext: &ExternalAccountObject,
    ) -> Result<(), EscrowError> {
        let owner = self.owner_of_connected(connected_account_of(account, ext)?).await?;
        let new_account = payout_account_from(&owner, ext);
        let payout_account = with_retries(&self.config.retry, "external_account_created", || async {
            let mut scope = self.db.begin().await?;
            let a = self.db.upsert_payout_account(&mut scope, new_account.clone()).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(a)
        })
        .await?;
        info!("🪝️ Payout account {} added for {}", payout_account.external_id, owner.user_id);
        Ok(())
    }

    async fn external_account_updated(
        &self,
        account: Option<&str>,
        ext: &ExternalAccountObject,
    ) -> Result<(), EscrowError> {
        let owner = self.owner_of_connected(connected_account_of(account, ext)?).await?;
        let changes = payout_account_from(&owner, ext);
        let updated = with_retries(&self.config.retry, "external_account_updated", || async {
            let mut scope = self.db.begin().await?;
            let a = self.db.update_payout_account(&mut scope, changes.clone()).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(a)
        })
        .await?;
        match updated {
            Some(a) => debug!("🪝️ Payout account {} updated (active: {})", a.external_id, a.is_active),
            None => warn!("🪝️ Payout account {} is not in the ledger. Nothing was updated", ext.id),
        }
        Ok(())
    }

    async fn external_account_deleted(
        &self,
        account: Option<&str>,
        ext: &ExternalAccountObject,
    ) -> Result<(), EscrowError> {
        let owner = self.owner_of_connected(connected_account_of(account, ext)?).await?;
        let deleted = with_retries(&self.config.retry, "external_account_deleted", || async {
            let mut scope = self.db.begin().await?;
            let n = self.db.delete_payout_account(&mut scope, &owner.user_id, &ext.id).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(n)
        })
        .await?;
        debug!("🪝️ Payout account {} of {} deleted ({deleted} rows)", ext.id, owner.user_id);
        Ok(())
    }

    async fn account_deauthorized(&self, account: Option<&str>) -> Result<(), EscrowError> {
        let connected = account.ok_or_else(|| EscrowError::validation("Deauthorization does not name an account"))?;
        let owner = self.owner_of_connected(connected).await?;
        let removed = with_retries(&self.config.retry, "account_deauthorized", || async {
            let mut scope = self.db.begin().await?;
            let removed = self.db.delete_payout_accounts_for_user(&mut scope, &owner.user_id).await?;
            self.db.set_connected_account_id(&mut scope, owner.id, None).await?;
            self.db.set_onboarding_flags(&mut scope, owner.id, false, false).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(removed)
        })
        .await?;
        warn!("🪝️ {} disconnected account {connected}. {removed} payout accounts removed", owner.user_id);
        Ok(())
    }

    //---------------------------------------   Payouts   ---------------------------------------------------------
    async fn payout_in_flight(&self, account: Option<&str>, payout: &PayoutObject) -> Result<(), EscrowError> {
        let connected = account.ok_or_else(|| EscrowError::validation(format!("Payout {} has no account", payout.id)))?;
        let owner = self.owner_of_connected(connected).await?;
        let known = {
            let mut scope = self.db.begin().await?;
            let destination = match payout.destination.as_deref() {
                Some(dest) => self.db.payout_account_by_external_id(&mut scope, dest).await?,
                None => None,
            };
            let known = destination.is_some_and(|d| d.user_id == owner.user_id);
            scope.rollback().await?;
            known
        };
        if !known {
            info!(
                "💸️ Payout {} goes to {:?}, which is not known yet. Requesting redelivery",
                payout.id, payout.destination
            );
            return Err(EscrowError::RetryRequested(format!("Payout account for {} is not recorded yet", payout.id)));
        }

        let mut saga = Saga::new("record_payout");
        let processor = Arc::clone(&self.processor);
        let timeout = self.config.epp_timeout;
        let (acct, payout_id) = (connected.to_string(), payout.id.clone());
        saga.step("payout issued", async { Ok::<_, EscrowError>(()) }, move |_| async move {
            match tokio::time::timeout(timeout, processor.cancel_payout(&acct, &payout_id)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format!("Could not cancel payout {payout_id}. {e}")),
                Err(_) => Err(format!("Cancelling payout {payout_id} timed out")),
            }
        })
        .await?;
        let result = self.record_payout(&owner, payout, TransactionStatus::Pending, None).await;
        if let Err(e) = &result {
            error!("💸️ Payout {} could not be recorded and will be canceled. {e}", payout.id);
        }
        // The payout is canceled at the processor, so a redelivery has nothing left to record
        saga.settle(result).await.map_err(|e| match e {
            EscrowError::Ledger(e) => EscrowError::ExternalCall(format!(
                "Payout {} was canceled because it could not be recorded. {e}",
                payout.id
            )),
            e => e,
        })
    }

    async fn payout_paid(&self, account: Option<&str>, payout: &PayoutObject) -> Result<(), EscrowError> {
        let connected = account.ok_or_else(|| EscrowError::validation(format!("Payout {} has no account", payout.id)))?;
        let owner = self.owner_of_connected(connected).await?;
        let balance = call_epp(self.config.epp_timeout, "retrieve_balance", self.processor.retrieve_balance(connected))
            .await
            .map_err(|e| EscrowError::RetryRequested(e.to_string()))?;
        let value = balance.available_in(&payout.currency);
        self.record_payout(&owner, payout, TransactionStatus::Success, Some(value)).await
    }

    async fn payout_failed(&self, account: Option<&str>, payout: &PayoutObject) -> Result<(), EscrowError> {
        let connected = account.ok_or_else(|| EscrowError::validation(format!("Payout {} has no account", payout.id)))?;
        let owner = self.owner_of_connected(connected).await?;
        self.record_payout(&owner, payout, TransactionStatus::Failed, None).await
    }

    /// Writes one payout lifecycle step and its wallet delta in a single scope. `value` refreshes the wallet balance
    /// when the event comes with a fresh balance snapshot.
    async fn record_payout(
        &self,
        owner: &PaymentAccount,
        payout: &PayoutObject,
        status: TransactionStatus,
        value: Option<MinorUnits>,
    ) -> Result<(), EscrowError> {
        let description = match status {
            TransactionStatus::Failed => payout.failure_message.clone().or_else(|| payout.description.clone()),
            _ => payout.description.clone(),
        };
        let label = format!("payout_{status}");
        let (txn, delta) = with_retries(&self.config.retry, &label, || async {
            let mut scope = self.db.begin().await?;
            if status == TransactionStatus::Failed {
                if let Some(dest) = payout.destination.as_deref() {
                    self.db.set_payout_account_active(&mut scope, dest, false).await?;
                }
            }
            let wallet = self.db.fetch_or_create_wallet(&mut scope, &owner.user_id, &payout.currency).await?;
            let new_payout = NewPayoutTransaction {
                user_id: owner.user_id.clone(),
                external_id: payout.id.clone(),
                wallet_id: wallet.id,
                destination: payout.destination.clone(),
                amount: payout.amount,
                currency: wallet.currency.clone(),
                status,
                description: description.clone(),
            };
            let (txn, transition) = self.db.upsert_payout(&mut scope, new_payout).await?;
            let delta = transition.pending_payout_delta(txn.amount);
            if delta != MinorUnits::default() {
                self.db.adjust_pending_payout(&mut scope, wallet.id, delta).await?;
            }
            if transition.previous.is_none() {
                self.db.set_last_payout(&mut scope, wallet.id, txn.id).await?;
            }
            if let Some(value) = value {
                self.db.set_wallet_value(&mut scope, wallet.id, value).await?;
            }
            scope.commit().await?;
            Ok::<_, LedgerError>((txn, delta))
        })
        .await?;
        info!("💸️ Payout {} for {} is {} (pending payout change {delta})", txn.external_id, owner.user_id, txn.status);
        Ok(())
    }

    async fn balance_available(&self, account: Option<&str>, balance: &Balance) -> Result<(), EscrowError> {
        let Some(connected) = account else {
            trace!("🪝️ Ignoring platform balance update");
            return Ok(());
        };
        let mut available = HashMap::<String, MinorUnits>::new();
        for b in &balance.available {
            *available.entry(b.currency.to_ascii_lowercase()).or_default() += b.amount;
        }
        let mut pending = HashMap::<String, MinorUnits>::new();
        for b in &balance.pending {
            *pending.entry(b.currency.to_ascii_lowercase()).or_default() += b.amount;
        }
        let owner = {
            let mut scope = self.db.begin().await?;
            let accounts = self.db.accounts_for_connected_account(&mut scope, connected).await?;
            scope.rollback().await?;
            at_most_one(accounts, connected)?
        };
        let Some(owner) = owner else {
            info!("💸️ Balance for {connected} arrived before its payment account. Requesting redelivery");
            return Err(EscrowError::RetryRequested(format!("No payment account for {connected} yet")));
        };
        with_retries(&self.config.retry, "balance_available", || async {
            let mut scope = self.db.begin().await?;
            for (currency, value) in &available {
                let wallet = self.db.fetch_or_create_wallet(&mut scope, &owner.user_id, currency).await?;
                self.db.set_wallet_value(&mut scope, wallet.id, *value).await?;
            }
            for (currency, value) in &pending {
                let wallet = self.db.fetch_or_create_wallet(&mut scope, &owner.user_id, currency).await?;
                self.db.set_wallet_pending_value(&mut scope, wallet.id, *value).await?;
            }
            scope.commit().await
        })
        .await?;
        debug!("🪝️ Balances for {connected} ({}) refreshed", owner.user_id);
        Ok(())
    }

    //---------------------------------------   Payment methods   -------------------------------------------------
    async fn payment_method_upserted(&self, method: &PaymentMethodObject) -> Result<(), EscrowError> {
        let customer = method
            .customer
            .as_deref()
            .ok_or_else(|| EscrowError::validation(format!("Payment method {} has no customer", method.id)))?;
        let fingerprint = method
            .fingerprint()
            .ok_or_else(|| EscrowError::validation(format!("Payment method {} has no fingerprint", method.id)))?;
        let owner = self.owner_of_customer(customer).await?;
        let new_method = NewPaymentMethod {
            user_id: owner.user_id.clone(),
            external_id: method.id.clone(),
            fingerprint: fingerprint.to_string(),
            country: method.card.as_ref().and_then(|c| c.country.clone()),
            details: snapshot_of(method),
        };
        let saved = with_retries(&self.config.retry, "payment_method_upserted", || async {
            let mut scope = self.db.begin().await?;
            let m = self.db.upsert_payment_method(&mut scope, new_method.clone()).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(m)
        })
        .await?;
        debug!("🪝️ Payment method {} saved for {}", saved.external_id, saved.user_id);
        Ok(())
    }

    async fn payment_method_detached(&self, method: &PaymentMethodObject) -> Result<(), EscrowError> {
        let deleted = with_retries(&self.config.retry, "payment_method_detached", || async {
            let mut scope = self.db.begin().await?;
            let n = self.db.delete_payment_method(&mut scope, &method.id).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(n)
        })
        .await?;
        debug!("🪝️ Payment method {} detached ({deleted} rows)", method.id);
        Ok(())
    }

    //---------------------------------------   Helpers   ---------------------------------------------------------
    async fn transaction_for(&self, external_id: &str) -> Result<PaymentTransaction, EscrowError> {
        self.db.fetch_transaction_by_external_id(external_id).await?.ok_or_else(|| {
            error!("🪝️ The processor reported on {external_id}, but there is no transaction for it");
            EscrowError::ConsistencyViolation(format!("No transaction for {external_id}"))
        })
    }

    /// The transaction a payment intent event is about. The intent's customer must resolve to exactly one payment
    /// account, and that account must be the transaction's payer.
    async fn payer_transaction(&self, intent: &PaymentIntentObject) -> Result<PaymentTransaction, EscrowError> {
        let customer = intent.customer.as_deref().ok_or_else(|| {
            error!("🪝️ Payment intent {} does not name a customer", intent.id);
            EscrowError::ConsistencyViolation(format!("Payment intent {} has no customer", intent.id))
        })?;
        let payer = self.owner_of_customer(customer).await?;
        let txn = self.transaction_for(&intent.id).await?;
        if txn.sender != payer.user_id {
            error!(
                "🪝️ Payment intent {} belongs to {} but transaction #{} was paid by {}",
                intent.id, payer.user_id, txn.id, txn.sender
            );
            return Err(EscrowError::ConsistencyViolation(format!(
                "Transaction #{} was not paid by customer {customer}",
                txn.id
            )));
        }
        Ok(txn)
    }

    async fn owner_of_customer(&self, customer: &str) -> Result<PaymentAccount, EscrowError> {
        let mut scope = self.db.begin().await?;
        let accounts = self.db.accounts_for_customer_id(&mut scope, customer).await?;
        scope.rollback().await?;
        exactly_one(accounts, customer)
    }

    async fn owner_of_connected(&self, connected: &str) -> Result<PaymentAccount, EscrowError> {
        let mut scope = self.db.begin().await?;
        let accounts = self.db.accounts_for_connected_account(&mut scope, connected).await?;
        scope.rollback().await?;
        exactly_one(accounts, connected)
    }
}

fn parties(txn: &PaymentTransaction) -> Vec<String> {
    let mut recipients = vec![txn.sender.clone()];
    recipients.extend(txn.recipient.clone());
    recipients
}

/// A settlement that loses to a terminal status is final. Anything else may succeed on redelivery.
fn retry_unless_illegal(e: LedgerError) -> EscrowError {
    match e {
        e @ LedgerError::IllegalStatusTransition { .. } => EscrowError::Ledger(e),
        e => EscrowError::retry_after(e),
    }
}

/// A ledger failure leaves the event unapplied, so the processor must deliver it again. The gate only keeps the
/// claim for failures that a redelivery cannot fix.
fn redeliver_ledger_failures(e: EscrowError) -> EscrowError {
    match e {
        EscrowError::Ledger(e) => retry_unless_illegal(e),
        e => e,
    }
}

fn connected_account_of<'a>(account: Option<&'a str>, ext: &'a ExternalAccountObject) -> Result<&'a str, EscrowError> {
    ext.account
        .as_deref()
        .or(account)
        .ok_or_else(|| EscrowError::validation(format!("External account {} has no owner", ext.id)))
}

fn payout_account_from(owner: &PaymentAccount, ext: &ExternalAccountObject) -> NewPayoutAccount {
    NewPayoutAccount {
        user_id: owner.user_id.clone(),
        external_id: ext.id.clone(),
        is_bank: ext.is_bank(),
        name: ext.name.clone(),
        bank_name: ext.bank_name.clone(),
        brand: ext.brand.clone(),
        last4: ext.last4.clone(),
        routing_number: ext.routing_number.clone(),
        currency: ext.currency.clone(),
        country: ext.country.clone(),
        is_active: ext.is_active(),
    }
}

fn snapshot_of(method: &PaymentMethodObject) -> MethodSnapshot {
    let card = method.card.clone().unwrap_or_default();
    MethodSnapshot {
        name: method.billing_details.as_ref().and_then(|b| b.name.clone()),
        fingerprint: card.fingerprint,
        last4: card.last4,
        brand: card.brand,
        exp_month: card.exp_month,
        exp_year: card.exp_year,
        wallet: card.wallet.as_ref().and_then(|w| w.get("type")).and_then(|t| t.as_str()).map(String::from),
        method_type: method.method_type.clone(),
    }
}

/// The final invoice for a settled payment. Job payments show the job amount net of the payer's fee and tax; platform
/// charges show no fees.
fn settled_invoice(
    txn: &PaymentTransaction,
    job: Option<&JobPayment>,
    base: Option<InvoiceDocument>,
    settled: MinorUnits,
    is_application: bool,
) -> InvoiceDocument {
    let mut doc = base.unwrap_or_else(|| InvoiceDocument {
        user_id: txn.sender.clone(),
        reference: match job {
            Some(job) => format!("INV-{}", job.job_id),
            None => format!("INV-{}", txn.external_id),
        },
        job_status: JobStatus::Pending,
        description: txn.description.clone(),
        job_title: None,
        location: None,
        deployee: None,
        tax: txn.tax,
        amount: txn.amount,
        fees: MinorUnits::default(),
        total: txn.amount,
        payment_method: txn.method.label(),
    });
    match job {
        Some(job) if !is_application => {
            doc.amount = settled - job.deployer_charge - job.tax;
            doc.fees = job.deployer_charge;
            doc.tax = job.tax;
        },
        _ => {
            doc.amount = settled - txn.tax;
            doc.fees = MinorUnits::default();
            doc.tax = txn.tax;
        },
    }
    doc.total = settled;
    doc.job_status = JobStatus::Complete;
    doc.description = txn.description.clone();
    doc
}
