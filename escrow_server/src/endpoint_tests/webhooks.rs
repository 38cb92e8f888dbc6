use actix_web::http::StatusCode;
use escrow_engine::{
    db_types::MinorUnits,
    epp::{Balance, BalanceBucket},
    test_utils::{
        fixtures::{event_body, payout_object, seed_payee, seed_payout_account, seed_wallet},
        prepare_env::tear_down,
    },
    traits::AccountManagement,
};
use serde_json::json;

use super::{
    helpers::{gate_parts, post_signed, post_webhook, sign},
    mocks::MockEpp,
};
use crate::data_objects::JsonResponse;

fn reply(body: &str) -> JsonResponse {
    serde_json::from_str(body).expect("Response was not a JsonResponse")
}

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let (url, parts) = gate_parts(MockEpp::new()).await;
    let req = actix_web::test::TestRequest::get().uri("/health").to_request();
    let app = actix_web::App::new().service(crate::routes::health);
    let service = actix_web::test::init_service(app).await;
    let res = actix_web::test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    tear_down(&url, parts.db).await;
}

#[actix_web::test]
async fn unsigned_webhooks_are_unauthorized() {
    let _ = env_logger::try_init().ok();
    let (url, parts) = gate_parts(MockEpp::new()).await;
    let body = event_body("evt_1", "account.updated", Some("acct_bob"), json!({"id": "acct_bob"}));
    let (status, res) = post_webhook(&parts, "/webhook/connect", &body, None).await.expect("Request failed");
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(res.contains("\"error\""), "{res}");

    // Signed with the platform secret but sent to the connect endpoint
    let sig = sign("/webhook/platform", &body);
    let (status, _) = post_webhook(&parts, "/webhook/connect", &body, Some(sig)).await.expect("Request failed");
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    tear_down(&url, parts.db).await;
}

#[actix_web::test]
async fn malformed_envelopes_are_bad_requests() {
    let _ = env_logger::try_init().ok();
    let (url, parts) = gate_parts(MockEpp::new()).await;
    let (status, _) = post_signed(&parts, "/webhook/platform", "{ \"id\": 12").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    tear_down(&url, parts.db).await;
}

#[actix_web::test]
async fn unsupported_events_are_acknowledged() {
    let _ = env_logger::try_init().ok();
    let (url, parts) = gate_parts(MockEpp::new()).await;
    let body = event_body("evt_2", "charge.refunded", None, json!({"id": "ch_1"}));
    let (status, res) = post_signed(&parts, "/webhook/platform", &body).await;
    assert_eq!(status, StatusCode::OK);
    let res = reply(&res);
    assert!(res.success);
    assert_eq!(res.message, "unsupported");
    tear_down(&url, parts.db).await;
}

#[actix_web::test]
async fn account_updates_are_processed_once() {
    let _ = env_logger::try_init().ok();
    let (url, parts) = gate_parts(MockEpp::new()).await;
    seed_payee(&parts.db, "bob", "acct_bob").await;
    let obj = json!({"id": "acct_bob", "charges_enabled": true, "payouts_enabled": true});
    let body = event_body("evt_3", "account.updated", Some("acct_bob"), obj);

    let (status, res) = post_signed(&parts, "/webhook/connect", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply(&res).message, "processed");
    let account = &parts.db.fetch_payment_accounts("bob").await.unwrap()[0];
    assert!(account.is_onboarded);
    assert!(account.payouts_enabled);

    let (status, res) = post_signed(&parts, "/webhook/connect", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply(&res).message, "duplicate");
    tear_down(&url, parts.db).await;
}

#[actix_web::test]
async fn payouts_to_unknown_destinations_ask_for_redelivery() {
    let _ = env_logger::try_init().ok();
    let (url, parts) = gate_parts(MockEpp::new()).await;
    seed_payee(&parts.db, "bob", "acct_bob").await;
    let body = event_body("evt_4", "payout.created", Some("acct_bob"), payout_object("po_1", 2_000, "ba_unknown"));
    let (status, res) = post_signed(&parts, "/webhook/connect", &body).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert!(res.contains("Retry requested"), "{res}");
    // The claim was released, so the redelivery is processed rather than skipped
    assert!(parts.db.fetch_webhook_event("payout.created", "evt_4").await.unwrap().is_none());
    tear_down(&url, parts.db).await;
}

#[actix_web::test]
async fn paid_payouts_refresh_the_wallet_from_the_processor() {
    let _ = env_logger::try_init().ok();
    let mut epp = MockEpp::new();
    epp.expect_retrieve_balance().times(1).returning(|account| {
        assert_eq!(account, "acct_bob");
        let bucket = BalanceBucket { amount: MinorUnits::from(5_625), currency: "usd".into(), source_types: None };
        Ok(Balance { available: vec![bucket], pending: vec![] })
    });
    let (url, parts) = gate_parts(epp).await;
    seed_payee(&parts.db, "bob", "acct_bob").await;
    seed_payout_account(&parts.db, "bob", "ba_1", true).await;
    seed_wallet(&parts.db, "bob", "usd", 10_000).await;

    let created = event_body("evt_c", "payout.created", Some("acct_bob"), payout_object("po_1", 4_375, "ba_1"));
    let (status, _) = post_signed(&parts, "/webhook/connect", &created).await;
    assert_eq!(status, StatusCode::OK);
    let mut paid_obj = payout_object("po_1", 4_375, "ba_1");
    paid_obj["status"] = json!("paid");
    let paid = event_body("evt_p", "payout.paid", Some("acct_bob"), paid_obj);
    let (status, res) = post_signed(&parts, "/webhook/connect", &paid).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply(&res).message, "processed");

    let wallet = parts.db.fetch_wallet("bob", "usd").await.unwrap().expect("Wallet missing");
    assert_eq!(wallet.pending_payout, MinorUnits::default());
    assert_eq!(wallet.value, MinorUnits::from(5_625));
    tear_down(&url, parts.db).await;
}
