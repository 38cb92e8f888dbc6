use std::{collections::HashMap, time::Duration};

use escrow_engine::{
    db_types::{JobStatus, MinorUnits, NewPaymentAccount, TransactionStatus},
    escrow_objects::{AuthorizeRequest, CancelRequest, CaptureRequest, PlatformChargeRequest},
    fees::FeeSchedule,
    test_utils::{
        fixtures::{event_body, intent_object, seed_customer, seed_payee, CONNECT_SECRET, PLATFORM_SECRET},
        system::{test_config, TestSystem},
    },
    traits::{AccountManagement, Pagination, ProcessorError},
    EscrowError,
    GateOutcome,
    LedgerError,
    LedgerScope,
    LedgerStore,
    SigningContext,
    WebhookPolicy,
};

fn usd(v: i64) -> MinorUnits {
    MinorUnits::from(v)
}

async fn seeded() -> TestSystem {
    let sys = TestSystem::new().await;
    seed_customer(&sys.db, "alice", "cus_alice").await;
    seed_payee(&sys.db, "bob", "acct_bob").await;
    sys
}

fn job(job_id: &str, amount: i64) -> AuthorizeRequest {
    AuthorizeRequest::new("alice", "bob", usd(amount), job_id, "Fix the kitchen sink")
        .with_job_title("Plumbing")
        .with_deployee_name("Bob Builder")
}

#[tokio::test]
async fn hundred_dollar_job_settles() {
    let sys = seeded().await;
    let auth = sys.escrow.authorize(job("job-100", 10_000)).await.expect("Error authorizing payment");
    let txn = &auth.transaction;
    assert_eq!(txn.status, TransactionStatus::Uncaptured);
    assert_eq!(txn.amount, usd(11_700));
    assert_eq!(txn.recipient.as_deref(), Some("bob"));
    assert_eq!(txn.deployee_revenue, usd(8_300));
    assert_eq!(auth.job.application_fee, usd(3_400));
    assert_eq!(auth.job.deployer_charge, usd(1_700));
    assert_eq!(auth.invoice.total, usd(11_700));
    assert_eq!(auth.invoice.document_url.as_deref(), Some("mock://invoices/INV-job-100"));
    assert_eq!(sys.processor.call_count("create_hold"), 1);

    let capture = CaptureRequest {
        transaction_id: txn.id,
        requested_by: "alice".into(),
        job_id: "job-100".into(),
        amount: None,
        cancelled: false,
    };
    let captured = sys.escrow.capture(capture).await.expect("Error capturing payment");
    assert_eq!(captured.status, TransactionStatus::Pending);
    let calls = sys.processor.calls_to("capture_hold");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, format!("{} 11700 3400", txn.external_id));

    let body = event_body("evt_succeeded", "payment_intent.succeeded", None, intent_object(&txn.external_id, "cus_alice", 11_700, false));
    let outcome = sys.deliver(SigningContext::Platform, &body).await.expect("Error delivering event");
    assert_eq!(outcome, GateOutcome::Processed);

    let settled = sys.db.fetch_transaction(txn.id).await.unwrap().unwrap();
    assert_eq!(settled.status, TransactionStatus::Success);
    let invoice = sys.db.fetch_invoice_for_transaction(txn.id).await.unwrap().unwrap();
    assert_eq!(invoice.job_status, JobStatus::Complete);
    assert_eq!(invoice.amount, usd(10_000));
    assert_eq!(invoice.fees, usd(1_700));
    assert_eq!(invoice.total, usd(11_700));

    sys.settle_hooks().await;
    let tags = sys.notifier.tags();
    assert!(tags.contains(&"paymentauthorize".to_string()));
    assert!(tags.contains(&"paymentcapture".to_string()));
    assert!(tags.contains(&"paymentsuccess".to_string()));
    sys.shutdown().await;
}

#[tokio::test]
async fn render_failure_cancels_the_hold() {
    let sys = seeded().await;
    sys.renderer.fail_with("template missing");
    let err = sys.escrow.authorize(job("job-render", 10_000)).await.expect_err("Authorization should fail");
    assert!(matches!(err, EscrowError::ExternalCall(_)), "{err}");
    assert_eq!(sys.processor.call_count("create_hold"), 1);
    assert_eq!(sys.processor.call_count("cancel_hold"), 1);
    assert!(sys.db.fetch_job_payment("job-render").await.unwrap().is_none());
    let history = sys.db.transaction_history("alice", Pagination::default()).await.unwrap();
    assert!(history.is_empty());
    sys.shutdown().await;
}

#[tokio::test]
async fn duplicate_payer_account_is_refused_without_side_effects() {
    let sys = seeded().await;
    let mut scope = sys.db.begin().await.unwrap();
    sys.db
        .insert_payment_account(&mut scope, NewPaymentAccount::new("alice").with_customer_id("cus_alice_2"))
        .await
        .unwrap();
    scope.commit().await.unwrap();

    let err = sys.escrow.authorize(job("job-dup", 10_000)).await.expect_err("Authorization should fail");
    assert!(matches!(err, EscrowError::ConsistencyViolation(_)), "{err}");
    assert_eq!(sys.processor.call_count("create_hold"), 0);
    assert!(sys.db.fetch_job_payment("job-dup").await.unwrap().is_none());
    sys.shutdown().await;
}

#[tokio::test]
async fn missing_default_method_is_a_validation_error() {
    let sys = TestSystem::new().await;
    let mut scope = sys.db.begin().await.unwrap();
    sys.db.insert_payment_account(&mut scope, NewPaymentAccount::new("alice").with_customer_id("cus_alice")).await.unwrap();
    scope.commit().await.unwrap();
    seed_payee(&sys.db, "bob", "acct_bob").await;
    let err = sys.escrow.authorize(job("job-nomethod", 10_000)).await.expect_err("Authorization should fail");
    assert!(matches!(err, EscrowError::Validation(_)), "{err}");
    sys.shutdown().await;
}

#[tokio::test]
async fn capture_with_a_new_amount_recomputes_fees() {
    let fees = FeeSchedule::default().with_tax_rates(0, HashMap::from([("CA".to_string(), 725)]));
    let config = test_config().with_fees(fees);
    let sys = TestSystem::with_config(config, WebhookPolicy::new(PLATFORM_SECRET, CONNECT_SECRET)).await;
    seed_customer(&sys.db, "alice", "cus_alice").await;
    seed_payee(&sys.db, "bob", "acct_bob").await;

    let auth = sys.escrow.authorize(job("job-ca", 10_000).with_jurisdiction("CA")).await.unwrap();
    assert_eq!(auth.fees.tax, usd(725));
    assert_eq!(auth.transaction.amount, usd(12_425));
    assert_eq!(auth.job.application_fee, usd(4_125));

    let capture = CaptureRequest {
        transaction_id: auth.transaction.id,
        requested_by: "alice".into(),
        job_id: "job-ca".into(),
        amount: Some(usd(8_000)),
        cancelled: true,
    };
    let captured = sys.escrow.capture(capture).await.expect("Error capturing payment");
    assert_eq!(captured.tax, usd(580));
    assert_eq!(captured.amount, usd(10_280));
    assert_eq!(captured.deployee_revenue, usd(10_280 - 3_980));
    assert!(captured.description.starts_with("CANCELLED - "));
    let job = sys.db.fetch_job_payment("job-ca").await.unwrap().unwrap();
    assert_eq!(job.tax, usd(580));
    assert_eq!(job.application_fee, usd(3_980));
    let calls = sys.processor.calls_to("capture_hold");
    assert_eq!(calls[0].args, format!("{} 10280 3980", auth.transaction.external_id));
    sys.shutdown().await;
}

#[tokio::test]
async fn rejected_capture_leaves_the_hold_uncaptured() {
    let sys = seeded().await;
    let auth = sys.escrow.authorize(job("job-reject", 10_000)).await.unwrap();
    sys.processor.fail_on("capture_hold", ProcessorError::Rejected("charge_expired_for_capture".into()));
    let capture = CaptureRequest {
        transaction_id: auth.transaction.id,
        requested_by: "alice".into(),
        job_id: "job-reject".into(),
        amount: Some(usd(9_000)),
        cancelled: false,
    };
    let err = sys.escrow.capture(capture).await.expect_err("Capture should fail");
    assert!(matches!(err, EscrowError::ExternalCall(_)), "{err}");
    let txn = sys.db.fetch_transaction(auth.transaction.id).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Uncaptured);
    assert_eq!(txn.amount, usd(11_700));
    let job = sys.db.fetch_job_payment("job-reject").await.unwrap().unwrap();
    assert_eq!(job.application_fee, usd(3_400));
    sys.shutdown().await;
}

#[tokio::test]
async fn capture_does_not_block_the_ledger_while_the_processor_works() {
    let sys = seeded().await;
    let auth = sys.escrow.authorize(job("job-slowcap", 10_000)).await.unwrap();
    sys.processor.delay_on("capture_hold", Duration::from_millis(300));
    let capture = CaptureRequest {
        transaction_id: auth.transaction.id,
        requested_by: "alice".into(),
        job_id: "job-slowcap".into(),
        amount: None,
        cancelled: false,
    };
    let other_write = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        seed_customer(&sys.db, "carol", "cus_carol").await;
        // The capture is still waiting on the processor
        sys.db.fetch_transaction(auth.transaction.id).await.unwrap().unwrap().status
    };
    let (captured, seen) = tokio::join!(sys.escrow.capture(capture), other_write);
    assert_eq!(seen, TransactionStatus::Uncaptured);
    assert_eq!(captured.expect("Error capturing payment").status, TransactionStatus::Pending);
    sys.shutdown().await;
}

#[tokio::test]
async fn capture_does_not_overwrite_a_hold_canceled_meanwhile() {
    let sys = seeded().await;
    let auth = sys.escrow.authorize(job("job-race", 10_000)).await.unwrap();
    sys.processor.delay_on("capture_hold", Duration::from_millis(300));
    let capture = CaptureRequest {
        transaction_id: auth.transaction.id,
        requested_by: "alice".into(),
        job_id: "job-race".into(),
        amount: Some(usd(9_000)),
        cancelled: false,
    };
    let processor_cancels = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let obj = intent_object(&auth.transaction.external_id, "cus_alice", 11_700, false);
        let body = event_body("evt_race", "payment_intent.canceled", None, obj);
        sys.deliver(SigningContext::Platform, &body).await.unwrap()
    };
    let (captured, outcome) = tokio::join!(sys.escrow.capture(capture), processor_cancels);
    assert_eq!(outcome, GateOutcome::Processed);
    let err = captured.expect_err("The hold was canceled first");
    assert!(matches!(err, EscrowError::Ledger(LedgerError::IllegalStatusTransition { .. })), "{err}");
    let txn = sys.db.fetch_transaction(auth.transaction.id).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
    assert_eq!(txn.amount, usd(11_700));
    let job = sys.db.fetch_job_payment("job-race").await.unwrap().unwrap();
    assert_eq!(job.application_fee, usd(3_400));
    sys.shutdown().await;
}

#[tokio::test]
async fn oversized_amounts_never_reach_the_processor() {
    let sys = seeded().await;
    let err = sys.escrow.authorize(job("job-huge", i64::MAX - 10)).await.expect_err("Amount is out of range");
    assert!(matches!(err, EscrowError::Validation(_)), "{err}");
    assert_eq!(sys.processor.call_count("create_hold"), 0);

    let auth = sys.escrow.authorize(job("job-big", 10_000)).await.unwrap();
    let capture = CaptureRequest {
        transaction_id: auth.transaction.id,
        requested_by: "alice".into(),
        job_id: "job-big".into(),
        amount: Some(usd(100_000_000)),
        cancelled: false,
    };
    let err = sys.escrow.capture(capture).await.expect_err("Capture amount is out of range");
    assert!(matches!(err, EscrowError::Validation(_)), "{err}");
    assert_eq!(sys.processor.call_count("capture_hold"), 0);
    sys.shutdown().await;
}

#[tokio::test]
async fn only_the_payer_can_capture_or_cancel() {
    let sys = seeded().await;
    let auth = sys.escrow.authorize(job("job-owner", 10_000)).await.unwrap();
    let capture = CaptureRequest {
        transaction_id: auth.transaction.id,
        requested_by: "mallory".into(),
        job_id: "job-owner".into(),
        amount: None,
        cancelled: false,
    };
    assert!(matches!(sys.escrow.capture(capture).await, Err(EscrowError::Validation(_))));
    let cancel = CancelRequest { transaction_id: auth.transaction.id, requested_by: "mallory".into() };
    assert!(matches!(sys.escrow.cancel(cancel).await, Err(EscrowError::Validation(_))));
    assert_eq!(sys.processor.call_count("capture_hold"), 0);
    assert_eq!(sys.processor.call_count("cancel_hold"), 0);
    sys.shutdown().await;
}

#[tokio::test]
async fn cancel_releases_the_hold() {
    let sys = seeded().await;
    let auth = sys.escrow.authorize(job("job-cancel", 10_000)).await.unwrap();
    let cancel = CancelRequest { transaction_id: auth.transaction.id, requested_by: "alice".into() };
    let declined = sys.escrow.cancel(cancel.clone()).await.expect("Error cancelling payment");
    assert_eq!(declined.status, TransactionStatus::Declined);
    assert_eq!(sys.processor.calls_to("cancel_hold")[0].args, auth.transaction.external_id);
    // Declined is terminal
    assert!(matches!(sys.escrow.cancel(cancel).await, Err(EscrowError::Validation(_))));

    // The processor confirms the cancellation afterwards. It must not move the transaction again.
    let body = event_body("evt_cxl", "payment_intent.canceled", None, intent_object(&auth.transaction.external_id, "cus_alice", 0, false));
    assert_eq!(sys.deliver(SigningContext::Platform, &body).await.unwrap(), GateOutcome::Processed);
    let txn = sys.db.fetch_transaction(auth.transaction.id).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Declined);
    sys.shutdown().await;
}

#[tokio::test]
async fn hold_timeout_is_an_unknown_outcome() {
    let sys = seeded().await;
    sys.processor.delay_on("create_hold", Duration::from_secs(2));
    let err = sys.escrow.authorize(job("job-slow", 10_000)).await.expect_err("Authorization should time out");
    assert!(matches!(err, EscrowError::UnknownOutcome(_)), "{err}");
    assert!(err.is_retryable());
    assert_eq!(sys.processor.call_count("cancel_hold"), 0);
    assert!(sys.db.fetch_job_payment("job-slow").await.unwrap().is_none());
    sys.shutdown().await;
}

#[tokio::test]
async fn platform_charges_are_pending_application_payments() {
    let sys = seeded().await;
    let req = PlatformChargeRequest {
        payer: "alice".into(),
        amount: usd(2_500),
        currency: "usd".into(),
        description: "Featured listing".into(),
        jurisdiction: None,
    };
    let txn = sys.escrow.charge_platform(req).await.expect("Error charging");
    assert_eq!(txn.status, TransactionStatus::Pending);
    assert!(txn.is_application);
    assert!(txn.recipient.is_none());
    assert_eq!(txn.amount, usd(2_500));
    assert_eq!(sys.processor.call_count("create_charge"), 1);

    let body = event_body("evt_app", "payment_intent.succeeded", None, intent_object(&txn.external_id, "cus_alice", 2_500, true));
    assert_eq!(sys.deliver(SigningContext::Platform, &body).await.unwrap(), GateOutcome::Processed);
    let invoice = sys.db.fetch_invoice_for_transaction(txn.id).await.unwrap().expect("Invoice should exist");
    assert_eq!(invoice.fees, usd(0));
    assert_eq!(invoice.amount, usd(2_500));
    sys.shutdown().await;
}

#[tokio::test]
async fn direct_payments_record_the_job() {
    let sys = seeded().await;
    let charge = sys.escrow.pay_account(job("job-direct", 4_000)).await.expect("Error paying account");
    assert_eq!(charge.transaction.status, TransactionStatus::Pending);
    // 4000 + 250 mobilization + 500 percentage
    assert_eq!(charge.transaction.amount, usd(4_750));
    assert_eq!(charge.job.application_fee, usd(1_500));
    assert_eq!(sys.processor.calls_to("create_transfer_charge")[0].args, "cus_alice acct_bob 4750");
    sys.shutdown().await;
}

#[tokio::test]
async fn history_shows_sent_and_settled_received_payments() {
    let sys = seeded().await;
    let first = sys.escrow.authorize(job("job-h1", 10_000)).await.unwrap();
    let _second = sys.escrow.authorize(job("job-h2", 5_000)).await.unwrap();
    let alice = sys.accounts.transaction_history("alice", Pagination::default()).await.unwrap();
    assert_eq!(alice.len(), 2);
    assert!(alice.iter().all(|e| !e.inbound));
    // Bob only sees payments once they succeed
    assert!(sys.accounts.transaction_history("bob", Pagination::default()).await.unwrap().is_empty());

    let body = event_body("evt_h1", "payment_intent.succeeded", None, intent_object(&first.transaction.external_id, "cus_alice", 11_700, false));
    sys.deliver(SigningContext::Platform, &body).await.unwrap();
    let bob = sys.accounts.transaction_history("bob", Pagination::default()).await.unwrap();
    assert_eq!(bob.len(), 1);
    assert!(bob[0].inbound);
    let page = sys.accounts.transaction_history("alice", Pagination::new(2, 1)).await.unwrap();
    assert_eq!(page.len(), 1);
    assert!(matches!(
        sys.accounts.transaction_history("alice", Pagination::new(0, 10)).await,
        Err(EscrowError::Validation(_))
    ));
    sys.shutdown().await;
}
