use std::sync::Arc;

use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use chrono::Utc;
use escrow_engine::{
    events::EventProducers,
    test_utils::{
        fixtures::{signature_for, CONNECT_SECRET, PLATFORM_SECRET},
        mock_processor::MockRenderer,
        prepare_env::test_database,
        system::test_config,
    },
    SqliteDatabase,
    WebhookPolicy,
};
use log::debug;

use super::mocks::MockEpp;
use crate::{
    routes::{health, ConnectWebhookRoute, PlatformWebhookRoute, SIGNATURE_HEADER},
    server::GateParts,
};

/// A migrated throwaway database and the gate parts that use it. The caller scripts the processor.
pub async fn gate_parts(processor: MockEpp) -> (String, GateParts) {
    let (url, db) = test_database().await;
    let parts = GateParts {
        db,
        processor: Arc::new(processor),
        renderer: Arc::new(MockRenderer::new()),
        config: test_config(),
        policy: WebhookPolicy::new(PLATFORM_SECRET, CONNECT_SECRET),
        producers: EventProducers::default(),
    };
    (url, parts)
}

pub fn sign(path: &str, body: &str) -> String {
    let secret = if path.ends_with("/connect") { CONNECT_SECRET } else { PLATFORM_SECRET };
    signature_for(body, secret, Utc::now().timestamp())
}

pub async fn post_webhook(
    parts: &GateParts,
    path: &str,
    body: &str,
    signature: Option<String>,
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::post().uri(path).set_payload(body.to_string());
    if let Some(sig) = signature {
        req = req.insert_header((SIGNATURE_HEADER, sig));
    }
    let req = req.to_request();
    let app = App::new()
        .app_data(web::Data::new(parts.build_gate()))
        .service(health)
        .service(PlatformWebhookRoute::<SqliteDatabase>::new())
        .service(ConnectWebhookRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;
    debug!("Posting to {path}");
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = res.into_body().try_into_bytes().map_err(|_| "Could not read response body".to_string())?;
    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}

/// Signs `body` for the endpoint at `path` and posts it
pub async fn post_signed(parts: &GateParts, path: &str, body: &str) -> (StatusCode, String) {
    post_webhook(parts, path, body, Some(sign(path, body))).await.expect("Request failed")
}
