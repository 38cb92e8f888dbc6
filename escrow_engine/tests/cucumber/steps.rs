use std::time::Duration;

use cucumber::{then, when};
use escrow_engine::{
    db_types::MinorUnits,
    escrow_objects::{AuthorizeRequest, CancelRequest, CaptureRequest},
    test_utils::fixtures::{event_body, failed_intent_object, intent_object, payout_object},
    traits::AccountManagement,
    PayoutRequest,
    SigningContext,
};
use log::*;
use serde_json::json;

use crate::cucumber::EscrowWorld;

async fn deliver(world: &mut EscrowWorld, context: SigningContext, body: String) {
    let outcome = world.system().deliver(context, &body).await;
    debug!("🚀️ Webhook outcome: {outcome:?}");
    world.last_delivery = Some((context, body));
    world.last_outcome = Some(outcome);
}

//--------------------------------------------   Escrow   -------------------------------------------------------------
#[when(expr = "'{word}' books job {word} from '{word}' for {int} cents")]
async fn book_job(world: &mut EscrowWorld, payer: String, job_id: String, payee: String, amount: i64) {
    let req = AuthorizeRequest::new(payer, payee, MinorUnits::from(amount), job_id.clone(), format!("Job {job_id}"));
    match world.system().escrow.authorize(req).await {
        Ok(auth) => info!("🚀️ Job {job_id} authorized as transaction #{}", auth.transaction.id),
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "'{word}' captures job {word}")]
async fn capture_job(world: &mut EscrowWorld, user: String, job_id: String) {
    capture(world, user, job_id, None).await;
}

#[when(expr = "'{word}' captures job {word} for {int} cents")]
async fn capture_job_for(world: &mut EscrowWorld, user: String, job_id: String, amount: i64) {
    capture(world, user, job_id, Some(MinorUnits::from(amount))).await;
}

async fn capture(world: &mut EscrowWorld, user: String, job_id: String, amount: Option<MinorUnits>) {
    let (_, txn) = world.job(&job_id).await;
    let req = CaptureRequest { transaction_id: txn.id, requested_by: user, job_id, amount, cancelled: false };
    if let Err(e) = world.system().escrow.capture(req).await {
        world.last_error = Some(e);
    }
}

#[when(expr = "'{word}' cancels job {word}")]
async fn cancel_job(world: &mut EscrowWorld, user: String, job_id: String) {
    let (_, txn) = world.job(&job_id).await;
    let req = CancelRequest { transaction_id: txn.id, requested_by: user };
    if let Err(e) = world.system().escrow.cancel(req).await {
        world.last_error = Some(e);
    }
}

#[when(expr = "the processor starts rejecting {word} calls")]
async fn reject_calls(world: &mut EscrowWorld, method: String) {
    let method: &'static str = match method.as_str() {
        "capture_hold" => "capture_hold",
        "cancel_hold" => "cancel_hold",
        "create_hold" => "create_hold",
        "create_payout" => "create_payout",
        other => panic!("Unscripted processor method {other}"),
    };
    let error = escrow_engine::ProcessorError::Rejected("card_declined".into());
    world.system().processor.fail_on(method, error);
}

//--------------------------------------------   Webhooks   -----------------------------------------------------------
#[when(expr = "the processor reports event {word} that job {word} succeeded")]
async fn job_succeeded(world: &mut EscrowWorld, event_id: String, job_id: String) {
    let (_, txn) = world.job(&job_id).await;
    let customer = txn.customer_id.clone().unwrap_or_default();
    let obj = intent_object(&txn.external_id, &customer, txn.amount.value(), false);
    let body = event_body(&event_id, "payment_intent.succeeded", None, obj);
    deliver(world, SigningContext::Platform, body).await;
}

#[when(expr = "the processor reports event {word} that job {word} failed with {string}")]
async fn job_failed(world: &mut EscrowWorld, event_id: String, job_id: String, message: String) {
    let (_, txn) = world.job(&job_id).await;
    let customer = txn.customer_id.clone().unwrap_or_default();
    let obj = failed_intent_object(&txn.external_id, &customer, txn.amount.value(), &message);
    let body = event_body(&event_id, "payment_intent.payment_failed", None, obj);
    deliver(world, SigningContext::Platform, body).await;
}

#[when(expr = "the processor reports event {word} that payout {word} of {int} cents from {word} to {word} is {word}")]
async fn payout_event(
    world: &mut EscrowWorld,
    event_id: String,
    payout_id: String,
    amount: i64,
    connected: String,
    destination: String,
    status: String,
) {
    let event_type = match status.as_str() {
        "created" => "payout.created",
        "paid" => "payout.paid",
        "failed" => "payout.failed",
        other => panic!("Unknown payout status {other}"),
    };
    let mut obj = payout_object(&payout_id, amount, &destination);
    obj["status"] = json!(status);
    let body = event_body(&event_id, event_type, Some(&connected), obj);
    deliver(world, SigningContext::Connect, body).await;
}

#[when("the same event is delivered again")]
async fn redeliver(world: &mut EscrowWorld) {
    let (context, body) = world.last_delivery.clone().expect("No event has been delivered yet");
    deliver(world, context, body).await;
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut EscrowWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

//--------------------------------------------   Payouts   ------------------------------------------------------------
#[when(expr = "'{word}' requests a payout of {int} cents to {word}")]
async fn request_payout(world: &mut EscrowWorld, user: String, amount: i64, destination: String) {
    let req = PayoutRequest { user_id: user, amount: MinorUnits::from(amount), currency: "usd".into(), destination };
    match world.system().wallets.request_payout(req).await {
        Ok(receipt) => info!("🚀️ Payout {} requested", receipt.payout.id),
        Err(e) => world.last_error = Some(e),
    }
}

//--------------------------------------------   Assertions   ---------------------------------------------------------
#[then(expr = "job {word} is {word} for {int} cents")]
async fn job_status(world: &mut EscrowWorld, job_id: String, status: String, amount: i64) {
    let (_, txn) = world.job(&job_id).await;
    assert_eq!(txn.status.to_string(), status, "Job {job_id}");
    assert_eq!(txn.amount, MinorUnits::from(amount), "Job {job_id}");
}

#[then(expr = "job {word} has an application fee of {int} cents")]
async fn application_fee(world: &mut EscrowWorld, job_id: String, fee: i64) {
    let (job, _) = world.job(&job_id).await;
    assert_eq!(job.application_fee, MinorUnits::from(fee));
}

#[then(expr = "the invoice for job {word} shows {int} cents plus {int} cents in fees")]
async fn invoice_amounts(world: &mut EscrowWorld, job_id: String, amount: i64, fees: i64) {
    let (_, txn) = world.job(&job_id).await;
    let invoice = world
        .system()
        .db
        .fetch_invoice_for_transaction(txn.id)
        .await
        .expect("Error fetching invoice")
        .expect("No invoice for job");
    assert_eq!(invoice.amount, MinorUnits::from(amount));
    assert_eq!(invoice.fees, MinorUnits::from(fees));
}

#[then(expr = "job {word} has no invoice")]
async fn no_invoice(world: &mut EscrowWorld, job_id: String) {
    let (_, txn) = world.job(&job_id).await;
    let invoice = world.system().db.fetch_invoice_for_transaction(txn.id).await.expect("Error fetching invoice");
    assert!(invoice.is_none(), "Unexpected invoice {invoice:?}");
}

#[then(expr = "the webhook outcome is {word}")]
async fn webhook_outcome(world: &mut EscrowWorld, expected: String) {
    let outcome = world.last_outcome.as_ref().expect("No webhook has been delivered");
    let actual = match outcome {
        Ok(outcome) => outcome.to_string(),
        Err(e) => e.category().as_str().to_string(),
    };
    assert_eq!(actual, expected);
}

#[then(expr = "the last request failed with {word}")]
async fn last_error(world: &mut EscrowWorld, category: String) {
    let err = world.last_error.take().expect("The last request did not fail");
    assert_eq!(err.category().as_str(), category, "{err}");
}

#[then(expr = "the processor saw {int} {word} call(s)")]
async fn processor_calls(world: &mut EscrowWorld, count: usize, method: String) {
    assert_eq!(world.system().processor.call_count(&method), count, "{method}");
}

#[then(expr = "'{word}' has {int} cents in payouts pending")]
async fn pending_payouts(world: &mut EscrowWorld, user: String, amount: i64) {
    let wallet = world.system().db.fetch_wallet(&user, "usd").await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.pending_payout, MinorUnits::from(amount));
}

#[then(expr = "payout account {word} of '{word}' is {word}")]
async fn payout_account_state(world: &mut EscrowWorld, external_id: String, user: String, state: String) {
    let accounts = world.system().db.fetch_payout_accounts(&user).await.expect("Error fetching payout accounts");
    let account = accounts.iter().find(|a| a.external_id == external_id).expect("No such payout account");
    assert_eq!(account.is_active, state == "active");
}
