use std::{collections::HashMap, fmt::Debug, sync::Arc};

use log::*;

use crate::{
    config::EngineConfig,
    db_types::{
        CaptureUpdate,
        InvoiceDocument,
        JobStatus,
        MethodSnapshot,
        NewJobPayment,
        NewPaymentTransaction,
        PaymentMethod,
        PaymentTransaction,
        TransactionStatus,
    },
    epp::{CaptureMethod, PaymentIntent, PaymentIntentRequest, APPLICATION_METADATA_KEY},
    escrow_api::{
        at_most_one,
        call_epp,
        cancel_hold_later,
        errors::EscrowError,
        escrow_objects::{
            AuthorizeRequest,
            AuthorizedPayment,
            CancelRequest,
            CaptureRequest,
            JobCharge,
            PayAccountRequest,
            PlatformChargeRequest,
            validate_amount,
        },
    },
    events::{EventProducers, NotificationEvent, NotificationKind},
    fees::FeeBreakdown,
    helpers::with_retries,
    saga::Saga,
    traits::{InvoiceRenderer, LedgerError, LedgerScope, LedgerStore, PaymentProcessor},
};

pub const CANCELLED_PREFIX: &str = "CANCELLED - ";

/// The payer and payee of a job payment, resolved from the ledger.
#[derive(Debug, Clone)]
struct Parties {
    customer_id: String,
    method: PaymentMethod,
    payee: Option<(String, String)>,
}

impl Parties {
    fn connected_account_id(&self) -> Option<String> {
        self.payee.as_ref().map(|(_, id)| id.clone())
    }

    fn payee(&self) -> Option<String> {
        self.payee.as_ref().map(|(user, _)| user.clone())
    }

    fn method_snapshot(&self) -> MethodSnapshot {
        self.method.details.clone()
    }
}

/// `EscrowApi` drives the payment settlement state machine from the caller's side.
///
/// It only ever makes these moves: nothing → `Uncaptured` (authorize), nothing → `Pending` (one-shot payments),
/// `Uncaptured` → `Pending` (capture) and `Uncaptured` → `Declined` (cancel). Terminal states are reached only when
/// the processor reports them, via the [`crate::EventReconciler`].
pub struct EscrowApi<B> {
    db: B,
    processor: Arc<dyn PaymentProcessor>,
    renderer: Arc<dyn InvoiceRenderer>,
    config: EngineConfig,
    producers: EventProducers,
}

impl<B> Debug for EscrowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EscrowApi")
    }
}

impl<B> EscrowApi<B> {
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

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<B> EscrowApi<B>
where B: LedgerStore
{
    /// Places a hold for a job payment and records it as an `Uncaptured` transaction with its job metadata and
    /// invoice.
    ///
    /// The hold is the only external side effect. If anything after it fails (rendering the invoice, or the ledger
    /// write) the hold is cancelled again before the error is returned. If the hold call itself times out, the outcome
    /// is unknown and [`EscrowError::UnknownOutcome`] is returned; there is no hold id to cancel.
    pub async fn authorize(&self, req: AuthorizeRequest) -> Result<AuthorizedPayment, EscrowError> {
        req.validate()?;
        let parties = self.resolve_parties(&req.payer, Some(&req.payee)).await?;
        let fees = self.config.fees.calculate(req.amount, req.jurisdiction.as_deref());
        debug!(
            "🔄️ Authorizing job {} for {}: hold {} (fees {}, tax {})",
            req.job_id,
            req.amount,
            fees.hold_amount(),
            fees.deployer_fee,
            fees.tax
        );
        let request = self.intent_request(&req, &parties, &fees, CaptureMethod::Manual);
        let timeout = self.config.epp_timeout;
        let processor = Arc::clone(&self.processor);

        let mut saga = Saga::new("authorize_payment");
        let hold = saga
            .step("place hold", call_epp(timeout, "create_hold", self.processor.create_hold(request)), |hold| {
                cancel_hold_later(processor, timeout, hold.id.clone())
            })
            .await;
        let hold = match hold {
            Ok(hold) => hold,
            Err(e) => {
                saga.abort().await;
                return Err(e);
            },
        };
        info!("🔄️ Hold {} placed for job {} ({})", hold.id, req.job_id, hold.amount);
        let result = self.record_authorization(&req, &parties, &fees, &hold).await;
        let authorized = saga.settle(result).await?;

        let event = NotificationEvent::new(
            NotificationKind::PaymentAuthorized,
            vec![req.payer.clone()],
            authorized.transaction.amount,
            &authorized.transaction.currency,
        )
        .for_transaction(authorized.transaction.id);
        self.producers.notify(event).await;
        Ok(authorized)
    }

    async fn record_authorization(
        &self,
        req: &AuthorizeRequest,
        parties: &Parties,
        fees: &FeeBreakdown,
        hold: &PaymentIntent,
    ) -> Result<AuthorizedPayment, EscrowError> {
        let document = InvoiceDocument {
            user_id: req.payer.clone(),
            reference: format!("INV-{}", req.job_id),
            job_status: JobStatus::Pending,
            description: req.description.clone(),
            job_title: req.job_title.clone(),
            location: req.location.clone(),
            deployee: req.deployee_name.clone(),
            tax: fees.tax,
            amount: req.amount,
            fees: fees.deployer_fee,
            total: hold.amount,
            payment_method: parties.method.details.label(),
        };
        let url = call_render(self.renderer.as_ref(), &document, self.config.epp_timeout).await?;
        let authorized = with_retries(&self.config.retry, "authorize", || {
            self.write_authorization(req, parties, fees, hold, &document, &url)
        })
        .await?;
        debug!("🔄️ Transaction #{} recorded for hold {}", authorized.transaction.id, hold.id);
        Ok(authorized)
    }

    async fn write_authorization(
        &self,
        req: &AuthorizeRequest,
        parties: &Parties,
        fees: &FeeBreakdown,
        hold: &PaymentIntent,
        document: &InvoiceDocument,
        url: &str,
    ) -> Result<AuthorizedPayment, LedgerError> {
        let mut scope = self.db.begin().await?;
        let txn = NewPaymentTransaction {
            sender: req.payer.clone(),
            recipient: parties.payee(),
            status: TransactionStatus::Uncaptured,
            amount: hold.amount,
            currency: req.currency.clone(),
            description: req.description.clone(),
            country: req.jurisdiction.clone(),
            customer_id: Some(parties.customer_id.clone()),
            connected_account_id: parties.connected_account_id(),
            external_id: hold.id.clone(),
            method: parties.method_snapshot(),
            service_charge: fees.percentage_fee,
            mobilization_fee: fees.mobilization_fee,
            tax: fees.tax,
            deployee_revenue: hold.amount - fees.application_fee,
            is_application: false,
        };
        let transaction = self.db.insert_transaction(&mut scope, txn).await?;
        let job = NewJobPayment {
            job_id: req.job_id.clone(),
            amount: req.amount,
            tax: fees.tax,
            deployer_charge: fees.deployer_fee,
            application_fee: fees.application_fee,
            description: req.description.clone(),
        };
        let job = self.db.upsert_job_payment(&mut scope, transaction.id, job).await?;
        let invoice = self.db.upsert_invoice(&mut scope, transaction.id, document, Some(url.to_string())).await?;
        scope.commit().await?;
        Ok(AuthorizedPayment { transaction, job, invoice, fees: *fees })
    }

    /// Captures an `Uncaptured` hold, optionally for a different job amount.
    ///
    /// The capture is planned from a read of the ledger, sent to the processor, and only then written, guarded on the
    /// transaction still being `Uncaptured`. No scope is held open while the processor is called, and a rejected
    /// capture leaves the ledger untouched. Settlement (`Success`/`Failed`) arrives later by webhook.
    pub async fn capture(&self, req: CaptureRequest) -> Result<PaymentTransaction, EscrowError> {
        if let Some(amount) = req.amount {
            validate_amount(amount)?;
        }
        let (txn, job) = {
            let mut scope = self.db.begin().await?;
            let txn = self.fetch_own_uncaptured(&mut scope, req.transaction_id, &req.requested_by).await?;
            let job = self
                .db
                .job_payment_by_job_id(&mut scope, &req.job_id)
                .await?
                .ok_or_else(|| EscrowError::validation(format!("Job {} has no payment", req.job_id)))?;
            scope.rollback().await?;
            (txn, job)
        };
        if job.transaction_id != txn.id {
            return Err(EscrowError::validation(format!(
                "Job {} is not paid by transaction #{}",
                req.job_id, txn.id
            )));
        }

        let (amount, tax, application_fee) = match req.amount {
            Some(new_amount) if new_amount != txn.amount => {
                let tax = self.config.fees.tax_for(new_amount, txn.country.as_deref());
                let application_fee = job.application_fee - job.tax + tax;
                let amount = new_amount.checked_add(job.deployer_charge).and_then(|a| a.checked_add(tax)).ok_or_else(
                    || EscrowError::validation(format!("Capture amount {new_amount} is too large")),
                )?;
                debug!("🔄️ Capture of #{} recomputed: {} -> {amount} (fee {application_fee})", txn.id, txn.amount);
                (amount, tax, application_fee)
            },
            _ => (txn.amount, job.tax, job.application_fee),
        };
        let description = if req.cancelled {
            format!("{CANCELLED_PREFIX}{}", txn.description)
        } else {
            txn.description.clone()
        };

        let capture = self.processor.capture_hold(&txn.external_id, amount, application_fee);
        call_epp(self.config.epp_timeout, "capture_hold", capture).await?;

        let update = CaptureUpdate { amount, tax, deployee_revenue: amount - application_fee, description };
        let captured = with_retries(&self.config.retry, "capture", || async {
            let mut scope = self.db.begin().await?;
            let captured = self.db.capture_transaction(&mut scope, txn.id, update.clone()).await?;
            if tax != job.tax || application_fee != job.application_fee {
                self.db.update_job_payment_fees(&mut scope, job.id, tax, application_fee).await?;
            }
            scope.commit().await?;
            Ok::<_, LedgerError>(captured)
        })
        .await
        .map_err(|e| {
            error!(
                "🔄️ Hold {} was captured for {amount} but transaction #{} could not be updated. The settlement event \
                 will bring the ledger up to date. {e}",
                txn.external_id, txn.id
            );
            EscrowError::from(e)
        })?;
        info!("🔄️ Transaction #{} captured for {amount}", txn.id);
        let mut recipients = vec![captured.sender.clone()];
        recipients.extend(captured.recipient.clone());
        let event =
            NotificationEvent::new(NotificationKind::PaymentCaptured, recipients, captured.amount, &captured.currency)
                .for_transaction(captured.id);
        self.producers.notify(event).await;
        Ok(captured)
    }

    /// Releases an `Uncaptured` hold. The ledger moves to `Declined` only after the processor accepts the
    /// cancellation, and only if the transaction is still `Uncaptured` by then.
    pub async fn cancel(&self, req: CancelRequest) -> Result<PaymentTransaction, EscrowError> {
        let txn = {
            let mut scope = self.db.begin().await?;
            let txn = self.fetch_own_uncaptured(&mut scope, req.transaction_id, &req.requested_by).await?;
            scope.rollback().await?;
            txn
        };
        let cancel = self.processor.cancel_hold(&txn.external_id);
        call_epp(self.config.epp_timeout, "cancel_hold", cancel).await?;
        let declined = with_retries(&self.config.retry, "cancel", || async {
            let mut scope = self.db.begin().await?;
            let t = self
                .db
                .update_transaction_status(
                    &mut scope,
                    txn.id,
                    &[TransactionStatus::Uncaptured],
                    TransactionStatus::Declined,
                    None,
                )
                .await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(t)
        })
        .await
        .map_err(|e| {
            error!(
                "🔄️ Hold {} was released but transaction #{} could not be updated. The cancellation event will bring \
                 the ledger up to date. {e}",
                txn.external_id, txn.id
            );
            EscrowError::from(e)
        })?;
        info!("🔄️ Hold {} for transaction #{} released", txn.external_id, txn.id);
        let mut recipients = vec![declined.sender.clone()];
        recipients.extend(declined.recipient.clone());
        let event =
            NotificationEvent::new(NotificationKind::PaymentDeclined, recipients, declined.amount, &declined.currency)
                .for_transaction(declined.id);
        self.producers.notify(event).await;
        Ok(declined)
    }

    /// Charges the payer directly on behalf of the platform. The transaction is `Pending` until the processor reports
    /// the outcome.
    pub async fn charge_platform(&self, req: PlatformChargeRequest) -> Result<PaymentTransaction, EscrowError> {
        req.validate()?;
        let parties = self.resolve_parties(&req.payer, None).await?;
        let tax = self.config.fees.tax_for(req.amount, req.jurisdiction.as_deref());
        let request = PaymentIntentRequest {
            customer_id: parties.customer_id.clone(),
            payment_method_id: parties.method.external_id.clone(),
            amount: req.amount + tax,
            currency: req.currency.clone(),
            description: req.description.clone(),
            capture_method: CaptureMethod::Automatic,
            destination: None,
            application_fee: None,
            metadata: HashMap::from([(APPLICATION_METADATA_KEY.to_string(), "true".to_string())]),
        };
        let charge = call_epp(self.config.epp_timeout, "create_charge", self.processor.create_charge(request)).await?;
        info!("🔄️ Platform charge {} created for {} ({})", charge.id, req.payer, charge.amount);
        let txn = NewPaymentTransaction {
            sender: req.payer.clone(),
            recipient: None,
            status: TransactionStatus::Pending,
            amount: charge.amount,
            currency: req.currency.clone(),
            description: req.description.clone(),
            country: req.jurisdiction.clone(),
            customer_id: Some(parties.customer_id.clone()),
            connected_account_id: None,
            external_id: charge.id.clone(),
            method: parties.method_snapshot(),
            service_charge: Default::default(),
            mobilization_fee: Default::default(),
            tax,
            deployee_revenue: Default::default(),
            is_application: true,
        };
        let recorded = with_retries(&self.config.retry, "charge_platform", || async {
            let mut scope = self.db.begin().await?;
            let t = self.db.insert_transaction(&mut scope, txn.clone()).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(t)
        })
        .await;
        recorded.map_err(|e| {
            error!("🔄️ Charge {} went through but could not be recorded. {e}", charge.id);
            e.into()
        })
    }

    /// Charges the payer and transfers the job amount (less fees) straight to the payee, without a hold.
    pub async fn pay_account(&self, req: PayAccountRequest) -> Result<JobCharge, EscrowError> {
        req.validate()?;
        let parties = self.resolve_parties(&req.payer, Some(&req.payee)).await?;
        let fees = self.config.fees.calculate(req.amount, req.jurisdiction.as_deref());
        let request = self.intent_request(&req, &parties, &fees, CaptureMethod::Automatic);
        let charge =
            call_epp(self.config.epp_timeout, "create_transfer_charge", self.processor.create_transfer_charge(request))
                .await?;
        info!("🔄️ Transfer charge {} created for job {}", charge.id, req.job_id);
        let recorded = with_retries(&self.config.retry, "pay_account", || async {
            let mut scope = self.db.begin().await?;
            let txn = NewPaymentTransaction {
                sender: req.payer.clone(),
                recipient: parties.payee(),
                status: TransactionStatus::Pending,
                amount: charge.amount,
                currency: req.currency.clone(),
                description: req.description.clone(),
                country: req.jurisdiction.clone(),
                customer_id: Some(parties.customer_id.clone()),
                connected_account_id: parties.connected_account_id(),
                external_id: charge.id.clone(),
                method: parties.method_snapshot(),
                service_charge: fees.percentage_fee,
                mobilization_fee: fees.mobilization_fee,
                tax: fees.tax,
                deployee_revenue: charge.amount - fees.application_fee,
                is_application: false,
            };
            let transaction = self.db.insert_transaction(&mut scope, txn).await?;
            let job = NewJobPayment {
                job_id: req.job_id.clone(),
                amount: req.amount,
                tax: fees.tax,
                deployer_charge: fees.deployer_fee,
                application_fee: fees.application_fee,
                description: req.description.clone(),
            };
            let job = self.db.upsert_job_payment(&mut scope, transaction.id, job).await?;
            scope.commit().await?;
            Ok::<_, LedgerError>(JobCharge { transaction, job, fees })
        })
        .await
        .map_err(|e| {
            error!("🔄️ Transfer charge {} went through but could not be recorded. {e}", charge.id);
            EscrowError::from(e)
        })?;
        let t = &recorded.transaction;
        let recipients = vec![req.payer.clone(), req.payee.clone()];
        let event =
            NotificationEvent::new(NotificationKind::PaymentCaptured, recipients, t.amount, &t.currency).for_transaction(t.id);
        self.producers.notify(event).await;
        Ok(recorded)
    }

    fn intent_request(
        &self,
        req: &AuthorizeRequest,
        parties: &Parties,
        fees: &FeeBreakdown,
        capture_method: CaptureMethod,
    ) -> PaymentIntentRequest {
        PaymentIntentRequest {
            customer_id: parties.customer_id.clone(),
            payment_method_id: parties.method.external_id.clone(),
            amount: fees.hold_amount(),
            currency: req.currency.clone(),
            description: req.description.clone(),
            capture_method,
            destination: parties.connected_account_id(),
            application_fee: Some(fees.application_fee),
            metadata: HashMap::from([
                ("job_id".to_string(), req.job_id.clone()),
                (APPLICATION_METADATA_KEY.to_string(), "false".to_string()),
            ]),
        }
    }

    /// Resolves the paying customer (and their default method) and, optionally, the payee's connected account.
    async fn resolve_parties(&self, payer: &str, payee: Option<&str>) -> Result<Parties, EscrowError> {
        let mut scope = self.db.begin().await?;
        let payer_account = at_most_one(self.db.accounts_for_user(&mut scope, payer).await?, payer)?
            .ok_or_else(|| EscrowError::validation(format!("User {payer} has no payment account")))?;
        let customer_id = payer_account
            .customer_id
            .ok_or_else(|| EscrowError::validation(format!("User {payer} cannot make payments yet")))?;
        let method = self
            .db
            .default_payment_method(&mut scope, payer)
            .await?
            .ok_or_else(|| EscrowError::validation(format!("User {payer} has no default payment method")))?;
        let payee = match payee {
            Some(payee) => {
                let account = at_most_one(self.db.accounts_for_user(&mut scope, payee).await?, payee)?
                    .ok_or_else(|| EscrowError::validation(format!("User {payee} has no payment account")))?;
                let connected = account
                    .connected_account_id
                    .ok_or_else(|| EscrowError::validation(format!("User {payee} cannot receive payments yet")))?;
                Some((payee.to_string(), connected))
            },
            None => None,
        };
        scope.rollback().await?;
        Ok(Parties { customer_id, method, payee })
    }

    async fn fetch_own_uncaptured(
        &self,
        scope: &mut B::Scope,
        transaction_id: i64,
        requested_by: &str,
    ) -> Result<PaymentTransaction, EscrowError> {
        let txn = self
            .db
            .transaction_by_id(scope, transaction_id)
            .await?
            .ok_or_else(|| EscrowError::validation(format!("Transaction #{transaction_id} does not exist")))?;
        if txn.sender != requested_by {
            return Err(EscrowError::validation(format!("Transaction #{transaction_id} does not belong to {requested_by}")));
        }
        if txn.status != TransactionStatus::Uncaptured {
            return Err(EscrowError::validation(format!("Transaction #{transaction_id} is {}, not Uncaptured", txn.status)));
        }
        Ok(txn)
    }
}

pub(crate) async fn call_render(
    renderer: &dyn InvoiceRenderer,
    document: &InvoiceDocument,
    timeout: std::time::Duration,
) -> Result<String, EscrowError> {
    match tokio::time::timeout(timeout, renderer.render(document)).await {
        Ok(Ok(url)) => Ok(url),
        Ok(Err(e)) => {
            warn!("🔄️ Invoice {} could not be rendered. {e}", document.reference);
            Err(e.into())
        },
        Err(_) => Err(EscrowError::ExternalCall(format!("Rendering invoice {} timed out", document.reference))),
    }
}
