//! Collaborators the server plugs into the engine.
//!
//! [`FileInvoiceRenderer`] writes each invoice as a JSON document to a local directory. [`LogNotifier`] writes
//! notifications to the log. Deployments with a document store or push service replace them.
use std::path::PathBuf;

use async_trait::async_trait;
use escrow_engine::{
    db_types::InvoiceDocument,
    traits::{Notification, NotifyError, RenderError},
    InvoiceRenderer,
    Notifier,
};
use log::*;

use crate::config::InvoiceConfig;

#[derive(Debug, Clone)]
pub struct FileInvoiceRenderer {
    dir: PathBuf,
    base_url: String,
}

impl FileInvoiceRenderer {
    pub fn new(config: &InvoiceConfig) -> Self {
        Self { dir: PathBuf::from(&config.dir), base_url: config.base_url.trim_end_matches('/').to_string() }
    }

    fn file_name(reference: &str) -> String {
        let safe = reference.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' });
        format!("{}.json", safe.collect::<String>())
    }
}

#[async_trait]
impl InvoiceRenderer for FileInvoiceRenderer {
    async fn render(&self, invoice: &InvoiceDocument) -> Result<String, RenderError> {
        let name = Self::file_name(&invoice.reference);
        let contents = serde_json::to_vec_pretty(invoice).map_err(|e| RenderError(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| RenderError(e.to_string()))?;
        let path = self.dir.join(&name);
        tokio::fs::write(&path, contents).await.map_err(|e| RenderError(format!("{}: {e}", path.display())))?;
        debug!("🔄️ Invoice {} written to {}", invoice.reference, path.display());
        Ok(format!("{}/{name}", self.base_url))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if notification.recipients.is_empty() {
            return Err(NotifyError(format!("'{}' has no recipients", notification.title)));
        }
        info!(
            "📬️ To {}: {}. {} {:?}",
            notification.recipients.join(", "),
            notification.title,
            notification.body,
            notification.data
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use escrow_engine::db_types::{JobStatus, MinorUnits};

    use super::*;

    fn invoice(reference: &str) -> InvoiceDocument {
        InvoiceDocument {
            user_id: "alice".into(),
            reference: reference.into(),
            job_status: JobStatus::Pending,
            description: "Fix the roof".into(),
            job_title: Some("Roofing".into()),
            location: None,
            deployee: Some("bob".into()),
            tax: MinorUnits::from(0),
            amount: MinorUnits::from(10_000),
            fees: MinorUnits::from(1_700),
            total: MinorUnits::from(11_700),
            payment_method: "visa 4242".into(),
        }
    }

    #[tokio::test]
    async fn renders_invoices_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = InvoiceConfig {
            dir: dir.path().join("invoices").display().to_string(),
            base_url: "https://invoices.example.com/".into(),
        };
        let renderer = FileInvoiceRenderer::new(&config);
        let url = renderer.render(&invoice("INV/2024-07")).await.expect("Render failed");
        assert_eq!(url, "https://invoices.example.com/INV_2024-07.json");
        let written = std::fs::read_to_string(dir.path().join("invoices/INV_2024-07.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(json["total"], 11_700);
        assert_eq!(json["reference"], "INV/2024-07");
    }

    #[tokio::test]
    async fn notifications_need_recipients() {
        let notifier = LogNotifier;
        let mut notification = Notification {
            recipients: vec![],
            title: "Payment received".into(),
            body: "Job paid".into(),
            data: HashMap::new(),
        };
        assert!(notifier.send(notification.clone()).await.is_err());
        notification.recipients.push("bob".into());
        assert!(notifier.send(notification).await.is_ok());
    }
}
