use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::db_types::InvoiceDocument;

#[derive(Debug, Clone, Error)]
#[error("Invoice rendering failed. {0}")]
pub struct RenderError(pub String);

/// Produces the customer-facing invoice document and returns where it can be fetched from.
///
/// Whatever the renderer stores is its own business; it is not part of any ledger scope.
#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    async fn render(&self, invoice: &InvoiceDocument) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, Error)]
#[error("Notification delivery failed. {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

/// Push notification delivery. Fire-and-forget: nothing in the engine waits on, or retries, a failed send.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}
