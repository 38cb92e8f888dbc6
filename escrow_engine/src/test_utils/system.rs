use std::{sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
    config::{EngineConfig, SigningContext, WebhookPolicy},
    escrow_api::{
        errors::EscrowError,
        webhook_gate::{GateOutcome, WebhookDelivery},
    },
    events::{EventHandlers, EventHooks},
    helpers::RetryPolicy,
    test_utils::{
        fixtures::{signature_for, CONNECT_SECRET, PLATFORM_SECRET},
        mock_processor::{MockProcessor, MockRenderer, RecordingNotifier},
        prepare_env::{tear_down, test_database},
    },
    AccountApi,
    EscrowApi,
    EventReconciler,
    SqliteDatabase,
    WalletApi,
    WebhookGate,
};

/// A complete engine wired to a fresh database and in-memory collaborators.
pub struct TestSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub processor: MockProcessor,
    pub renderer: MockRenderer,
    pub notifier: RecordingNotifier,
    pub escrow: EscrowApi<SqliteDatabase>,
    pub gate: WebhookGate<SqliteDatabase>,
    pub wallets: WalletApi<SqliteDatabase>,
    pub accounts: AccountApi<SqliteDatabase>,
}

impl std::fmt::Debug for TestSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestSystem({})", self.db_path)
    }
}

pub fn test_config() -> EngineConfig {
    let retry = RetryPolicy { max_attempts: 3, backoff: Duration::from_millis(5), attempt_timeout: Duration::from_secs(5) };
    EngineConfig::default().with_retry(retry).with_epp_timeout(Duration::from_millis(500))
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_config(test_config(), WebhookPolicy::new(PLATFORM_SECRET, CONNECT_SECRET)).await
    }

    pub async fn with_config(config: EngineConfig, policy: WebhookPolicy) -> Self {
        let (db_path, db) = test_database().await;
        let processor = MockProcessor::new();
        let renderer = MockRenderer::new();
        let notifier = RecordingNotifier::new();
        let mut hooks = EventHooks::default();
        hooks.with_notifier(Arc::new(notifier.clone()));
        let handlers = EventHandlers::new(64, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;

        let epp: Arc<dyn crate::traits::PaymentProcessor> = Arc::new(processor.clone());
        let render: Arc<dyn crate::traits::InvoiceRenderer> = Arc::new(renderer.clone());
        let escrow = EscrowApi::new(db.clone(), epp.clone(), render.clone(), config.clone(), producers.clone());
        let reconciler = EventReconciler::new(db.clone(), epp.clone(), render, config.clone(), producers.clone());
        let gate = WebhookGate::new(db.clone(), reconciler, policy);
        let wallets = WalletApi::new(db.clone(), epp.clone(), config.clone(), producers);
        let accounts = AccountApi::new(db.clone(), epp, config);
        Self { db_path, db, processor, renderer, notifier, escrow, gate, wallets, accounts }
    }

    /// Signs `body` with the secret for `context` and pushes it through the webhook gate.
    pub async fn deliver(&self, context: SigningContext, body: &str) -> Result<GateOutcome, EscrowError> {
        let secret = match context {
            SigningContext::Platform => PLATFORM_SECRET,
            SigningContext::Connect => CONNECT_SECRET,
        };
        let signature = signature_for(body, secret, Utc::now().timestamp());
        self.gate.handle(WebhookDelivery::new(body.as_bytes(), Some(&signature), context)).await
    }

    /// Gives the notification hook a moment to run.
    pub async fn settle_hooks(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pub async fn shutdown(self) {
        tear_down(&self.db_path, self.db).await;
    }
}
