//! Ledger seeding helpers and builders for processor event bodies.
use serde_json::{json, Value};

use crate::{
    db_types::{MethodSnapshot, NewPaymentAccount, NewPaymentMethod, NewPayoutAccount, PaymentAccount, PayoutAccount},
    helpers::sign_payload,
    traits::{LedgerScope, LedgerStore},
};

pub const PLATFORM_SECRET: &str = "whsec_platform_test";
pub const CONNECT_SECRET: &str = "whsec_connect_test";

pub fn visa(fingerprint: &str) -> MethodSnapshot {
    MethodSnapshot {
        name: Some("Test Payer".into()),
        fingerprint: Some(fingerprint.into()),
        last4: Some("4242".into()),
        brand: Some("visa".into()),
        exp_month: Some(12),
        exp_year: Some(2030),
        wallet: None,
        method_type: Some("card".into()),
    }
}

/// A paying user with a customer id and a default card (`pm_<user>`, fingerprint `fp_<user>`).
pub async fn seed_customer<B: LedgerStore>(db: &B, user_id: &str, customer_id: &str) -> PaymentAccount {
    let mut scope = db.begin().await.expect("Error opening scope");
    let account = db
        .insert_payment_account(&mut scope, NewPaymentAccount::new(user_id).with_customer_id(customer_id))
        .await
        .expect("Error inserting account");
    let method_id = format!("pm_{user_id}");
    let fingerprint = format!("fp_{user_id}");
    let method = NewPaymentMethod {
        user_id: user_id.to_string(),
        external_id: method_id.clone(),
        fingerprint: fingerprint.clone(),
        country: Some("US".into()),
        details: visa(&fingerprint),
    };
    db.upsert_payment_method(&mut scope, method).await.expect("Error inserting payment method");
    db.mark_default_payment_method(&mut scope, user_id, &method_id).await.expect("Error marking default method");
    scope.commit().await.expect("Error committing seed data");
    account
}

/// A payee with a connected account
pub async fn seed_payee<B: LedgerStore>(db: &B, user_id: &str, connected_account_id: &str) -> PaymentAccount {
    let mut scope = db.begin().await.expect("Error opening scope");
    let account = db
        .insert_payment_account(&mut scope, NewPaymentAccount::new(user_id).with_connected_account_id(connected_account_id))
        .await
        .expect("Error inserting account");
    scope.commit().await.expect("Error committing seed data");
    account
}

pub async fn seed_payout_account<B: LedgerStore>(db: &B, user_id: &str, external_id: &str, active: bool) -> PayoutAccount {
    let mut scope = db.begin().await.expect("Error opening scope");
    let account = NewPayoutAccount {
        user_id: user_id.to_string(),
        external_id: external_id.to_string(),
        is_bank: true,
        bank_name: Some("Test Bank".into()),
        last4: Some("6789".into()),
        currency: Some("usd".into()),
        country: Some("US".into()),
        is_active: active,
        ..Default::default()
    };
    let account = db.upsert_payout_account(&mut scope, account).await.expect("Error inserting payout account");
    scope.commit().await.expect("Error committing seed data");
    account
}

/// Sets the wallet balance that the ledger believes the user has.
pub async fn seed_wallet<B: LedgerStore>(db: &B, user_id: &str, currency: &str, value: i64) {
    let mut scope = db.begin().await.expect("Error opening scope");
    let wallet = db.fetch_or_create_wallet(&mut scope, user_id, currency).await.expect("Error creating wallet");
    db.set_wallet_value(&mut scope, wallet.id, value.into()).await.expect("Error setting wallet value");
    scope.commit().await.expect("Error committing seed data");
}

//------------------------------------------   Event bodies   ---------------------------------------------------------
pub fn event_body(id: &str, event_type: &str, account: Option<&str>, object: Value) -> String {
    let mut envelope = json!({
        "id": id,
        "type": event_type,
        "livemode": false,
        "created": 1_700_000_000,
        "data": { "object": object },
    });
    if let Some(account) = account {
        envelope["account"] = json!(account);
    }
    envelope.to_string()
}

/// A valid signature header for `body`, signed at `timestamp`.
pub fn signature_for(body: &str, secret: &str, timestamp: i64) -> String {
    sign_payload(body.as_bytes(), secret, timestamp)
}

pub fn intent_object(id: &str, customer: &str, amount: i64, is_application: bool) -> Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "customer": customer,
        "amount": amount,
        "amount_capturable": 0,
        "amount_received": amount,
        "currency": "usd",
        "metadata": { "is_application": if is_application { "true" } else { "false" } },
    })
}

pub fn failed_intent_object(id: &str, customer: &str, amount: i64, message: &str) -> Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "customer": customer,
        "amount": amount,
        "currency": "usd",
        "last_payment_error": { "message": message },
    })
}

pub fn payout_object(id: &str, amount: i64, destination: &str) -> Value {
    json!({
        "id": id,
        "object": "payout",
        "amount": amount,
        "currency": "usd",
        "destination": destination,
        "status": "pending",
    })
}

pub fn bank_account_object(id: &str, account: &str, status: &str) -> Value {
    json!({
        "id": id,
        "object": "bank_account",
        "account": account,
        "status": status,
        "bank_name": "Test Bank",
        "last4": "6789",
        "routing_number": "110000000",
        "currency": "usd",
        "country": "US",
        "account_holder_name": "Bob Builder",
    })
}

pub fn card_method_object(id: &str, customer: &str, fingerprint: &str) -> Value {
    json!({
        "id": id,
        "object": "payment_method",
        "customer": customer,
        "type": "card",
        "billing_details": { "name": "Test Payer" },
        "card": {
            "brand": "mastercard",
            "last4": "4444",
            "exp_month": 1,
            "exp_year": 2031,
            "fingerprint": fingerprint,
            "country": "US",
        },
    })
}
