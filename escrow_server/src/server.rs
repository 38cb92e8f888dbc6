use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use epp_tools::EppApi;
use escrow_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    EngineConfig,
    EventReconciler,
    InvoiceRenderer,
    PaymentProcessor,
    SqliteDatabase,
    WebhookGate,
    WebhookPolicy,
};
use log::*;

use crate::{
    adapters::{FileInvoiceRenderer, LogNotifier},
    config::{secrets_configured, ServerConfig},
    errors::ServerError,
    routes::{health, ConnectWebhookRoute, PlatformWebhookRoute},
};

/// Everything a worker needs to build its own [`WebhookGate`].
#[derive(Clone)]
pub struct GateParts {
    pub db: SqliteDatabase,
    pub processor: Arc<dyn PaymentProcessor>,
    pub renderer: Arc<dyn InvoiceRenderer>,
    pub config: EngineConfig,
    pub policy: WebhookPolicy,
    pub producers: EventProducers,
}

impl GateParts {
    pub fn build_gate(&self) -> WebhookGate<SqliteDatabase> {
        let reconciler = EventReconciler::new(
            self.db.clone(),
            Arc::clone(&self.processor),
            Arc::clone(&self.renderer),
            self.config.clone(),
            self.producers.clone(),
        );
        WebhookGate::new(self.db.clone(), reconciler, self.policy.clone())
    }
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::open_and_migrate(&config.database_url, config.db_max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let processor = EppApi::new(config.epp.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let (platform, connect) = secrets_configured(&config.webhooks);
    info!("🪛️ Webhook secrets configured. platform: {platform}, connect: {connect}");

    let mut hooks = EventHooks::default();
    hooks.with_notifier(Arc::new(LogNotifier));
    let handlers = EventHandlers::new(128, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let parts = GateParts {
        db: db.clone(),
        processor: Arc::new(processor),
        renderer: Arc::new(FileInvoiceRenderer::new(&config.invoices)),
        config: config.engine.clone(),
        policy: config.webhooks.clone(),
        producers,
    };
    let srv = create_server_instance(&config, parts)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    db.close().await;
    result
}

pub fn create_server_instance(config: &ServerConfig, parts: GateParts) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let gate = parts.build_gate();
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("epg::access_log"))
            .app_data(web::Data::new(gate))
            .service(health)
            .service(PlatformWebhookRoute::<SqliteDatabase>::new())
            .service(ConnectWebhookRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
