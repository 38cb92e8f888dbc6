//! In-memory stand-ins for the external collaborators.
//!
//! [`MockProcessor`] records every call it receives and can be scripted to fail or stall specific calls.
//! [`MockRenderer`] and [`RecordingNotifier`] do the same for invoice rendering and push notifications.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    db_types::{InvoiceDocument, MinorUnits},
    epp::{
        Balance,
        BalanceBucket,
        CustomerProfile,
        DebitRequest,
        EppPayout,
        PaymentIntent,
        PaymentIntentRequest,
        PayoutInstruction,
        SourceTypes,
    },
    traits::{
        InvoiceRenderer,
        Notification,
        Notifier,
        NotifyError,
        PaymentProcessor,
        ProcessorError,
        RenderError,
    },
};

/// One recorded processor call: the method name and a short description of its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorCall {
    pub method: &'static str,
    pub args: String,
}

#[derive(Default)]
struct Script {
    failures: HashMap<&'static str, ProcessorError>,
    delays: HashMap<&'static str, Duration>,
}

#[derive(Clone, Default)]
pub struct MockProcessor {
    calls: Arc<Mutex<Vec<ProcessorCall>>>,
    script: Arc<Mutex<Script>>,
    balances: Arc<Mutex<HashMap<String, Balance>>>,
    counter: Arc<AtomicU64>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call to `method` fails with `error`.
    pub fn fail_on(&self, method: &'static str, error: ProcessorError) {
        self.script.lock().unwrap().failures.insert(method, error);
    }

    /// Every subsequent call to `method` sleeps for `delay` before answering.
    pub fn delay_on(&self, method: &'static str, delay: Duration) {
        self.script.lock().unwrap().delays.insert(method, delay);
    }

    pub fn clear_script(&self) {
        let mut script = self.script.lock().unwrap();
        script.failures.clear();
        script.delays.clear();
    }

    /// Sets the live balance reported for a connected account. Both bank and card payouts may use all of it.
    pub fn set_balance(&self, connected_account_id: &str, currency: &str, available: i64) {
        let amount = MinorUnits::from(available);
        let bucket = BalanceBucket {
            amount,
            currency: currency.to_string(),
            source_types: Some(SourceTypes { bank_account: amount, card: amount }),
        };
        let balance = Balance { available: vec![bucket], pending: vec![] };
        self.balances.lock().unwrap().insert(connected_account_id.to_string(), balance);
    }

    pub fn calls(&self) -> Vec<ProcessorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<ProcessorCall> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls_to(method).len()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn record(&self, method: &'static str, args: String) -> Result<(), ProcessorError> {
        self.calls.lock().unwrap().push(ProcessorCall { method, args });
        let (failure, delay) = {
            let script = self.script.lock().unwrap();
            (script.failures.get(method).cloned(), script.delays.get(method).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn intent(&self, prefix: &str, request: &PaymentIntentRequest, status: &str) -> PaymentIntent {
        PaymentIntent {
            id: self.next_id(prefix),
            amount: request.amount,
            currency: request.currency.clone(),
            status: status.to_string(),
            customer: Some(request.customer_id.clone()),
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_hold(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError> {
        self.record("create_hold", format!("{} {}", request.customer_id, request.amount.value())).await?;
        Ok(self.intent("pi", &request, "requires_capture"))
    }

    async fn capture_hold(
        &self,
        hold_id: &str,
        amount: MinorUnits,
        application_fee: MinorUnits,
    ) -> Result<PaymentIntent, ProcessorError> {
        self.record("capture_hold", format!("{hold_id} {} {}", amount.value(), application_fee.value())).await?;
        Ok(PaymentIntent {
            id: hold_id.to_string(),
            amount,
            currency: "usd".into(),
            status: "processing".into(),
            customer: None,
        })
    }

    async fn cancel_hold(&self, hold_id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.record("cancel_hold", hold_id.to_string()).await?;
        Ok(PaymentIntent {
            id: hold_id.to_string(),
            amount: MinorUnits::default(),
            currency: "usd".into(),
            status: "canceled".into(),
            customer: None,
        })
    }

    async fn create_charge(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError> {
        self.record("create_charge", format!("{} {}", request.customer_id, request.amount.value())).await?;
        Ok(self.intent("ch", &request, "processing"))
    }

    async fn create_transfer_charge(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError> {
        let dest = request.destination.clone().unwrap_or_default();
        self.record("create_transfer_charge", format!("{} {dest} {}", request.customer_id, request.amount.value()))
            .await?;
        Ok(self.intent("pi", &request, "processing"))
    }

    async fn create_debit(&self, request: DebitRequest) -> Result<String, ProcessorError> {
        self.record("create_debit", format!("{} {}", request.connected_account_id, request.amount.value())).await?;
        Ok(self.next_id("py"))
    }

    async fn create_payout(&self, instruction: PayoutInstruction) -> Result<EppPayout, ProcessorError> {
        let args = format!("{} {} {}", instruction.connected_account_id, instruction.destination, instruction.amount.value());
        self.record("create_payout", args).await?;
        Ok(EppPayout {
            id: self.next_id("po"),
            amount: instruction.amount,
            currency: instruction.currency,
            status: "pending".into(),
        })
    }

    async fn cancel_payout(&self, connected_account_id: &str, payout_id: &str) -> Result<(), ProcessorError> {
        self.record("cancel_payout", format!("{connected_account_id} {payout_id}")).await
    }

    async fn retrieve_balance(&self, connected_account_id: &str) -> Result<Balance, ProcessorError> {
        self.record("retrieve_balance", connected_account_id.to_string()).await?;
        Ok(self.balances.lock().unwrap().get(connected_account_id).cloned().unwrap_or_default())
    }

    async fn create_customer(&self, profile: &CustomerProfile) -> Result<String, ProcessorError> {
        self.record("create_customer", profile.full_name()).await?;
        Ok(self.next_id("cus"))
    }

    async fn delete_customer(&self, customer_id: &str) -> Result<(), ProcessorError> {
        self.record("delete_customer", customer_id.to_string()).await
    }

    async fn create_connected_account(&self, profile: &CustomerProfile) -> Result<String, ProcessorError> {
        self.record("create_connected_account", profile.full_name()).await?;
        Ok(self.next_id("acct"))
    }

    async fn delete_connected_account(&self, connected_account_id: &str) -> Result<(), ProcessorError> {
        self.record("delete_connected_account", connected_account_id.to_string()).await
    }

    async fn set_default_payment_method(&self, customer_id: &str, method_id: &str) -> Result<(), ProcessorError> {
        self.record("set_default_payment_method", format!("{customer_id} {method_id}")).await
    }

    async fn detach_payment_method(&self, method_id: &str) -> Result<(), ProcessorError> {
        self.record("detach_payment_method", method_id.to_string()).await
    }
}

/// Renders invoices to `mock://invoices/<reference>`, or fails every render once told to.
#[derive(Clone, Default)]
pub struct MockRenderer {
    rendered: Arc<Mutex<Vec<InvoiceDocument>>>,
    failing: Arc<Mutex<Option<String>>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with<S: Into<String>>(&self, reason: S) {
        *self.failing.lock().unwrap() = Some(reason.into());
    }

    pub fn recover(&self) {
        *self.failing.lock().unwrap() = None;
    }

    pub fn rendered(&self) -> Vec<InvoiceDocument> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceRenderer for MockRenderer {
    async fn render(&self, invoice: &InvoiceDocument) -> Result<String, RenderError> {
        if let Some(reason) = self.failing.lock().unwrap().clone() {
            return Err(RenderError(reason));
        }
        self.rendered.lock().unwrap().push(invoice.clone());
        Ok(format!("mock://invoices/{}", invoice.reference))
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// The `type` tags of every notification sent so far
    pub fn tags(&self) -> Vec<String> {
        self.sent().into_iter().filter_map(|n| n.data.get("type").cloned()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}
