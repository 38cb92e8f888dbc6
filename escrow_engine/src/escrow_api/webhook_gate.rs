//! The single entry point for processor webhooks.
//!
//! A delivery goes through four gates in order: signature, envelope, policy and idempotency. Only a delivery that
//! passes all of them reaches the [`EventReconciler`]. The returned [`GateOutcome`] tells the transport what to say to
//! the processor; an `Err` means the delivery was rejected or should be retried.
use std::fmt::Display;

use chrono::Utc;
use log::*;
use serde::Serialize;

use crate::{
    config::{SigningContext, WebhookPolicy},
    epp::{EppEvent, ParsedEnvelope},
    escrow_api::{errors::EscrowError, reconciler::EventReconciler},
    helpers::{verify_signature, SignatureError},
    traits::LedgerStore,
};

/// A raw webhook request, exactly as received.
#[derive(Debug, Clone, Copy)]
pub struct WebhookDelivery<'a> {
    pub body: &'a [u8],
    pub signature: Option<&'a str>,
    pub context: SigningContext,
}

impl<'a> WebhookDelivery<'a> {
    pub fn new(body: &'a [u8], signature: Option<&'a str>, context: SigningContext) -> Self {
        Self { body, signature, context }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// The event was applied to the ledger
    Processed,
    /// The event type is not one the gate handles
    Unsupported,
    /// A test-mode event that policy says to ignore
    Dropped,
    /// The event has been seen before. Nothing was changed.
    Duplicate,
    /// The event was accepted but could not be applied. It will not be retried.
    Failed,
}

impl Display for GateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processed => write!(f, "processed"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Dropped => write!(f, "dropped"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

pub struct WebhookGate<B> {
    db: B,
    reconciler: EventReconciler<B>,
    policy: WebhookPolicy,
}

impl<B> WebhookGate<B> {
    pub fn new(db: B, reconciler: EventReconciler<B>, policy: WebhookPolicy) -> Self {
        Self { db, reconciler, policy }
    }

    pub fn policy(&self) -> &WebhookPolicy {
        &self.policy
    }
}

impl<B> WebhookGate<B>
where B: LedgerStore
{
    pub async fn handle(&self, delivery: WebhookDelivery<'_>) -> Result<GateOutcome, EscrowError> {
        self.handle_at(delivery, Utc::now().timestamp()).await
    }

    /// As [`handle`](Self::handle), with the signature timestamp checked against `now` (unix seconds).
    pub async fn handle_at(&self, delivery: WebhookDelivery<'_>, now: i64) -> Result<GateOutcome, EscrowError> {
        self.authenticate(&delivery, now)?;
        let event = match EppEvent::parse(delivery.body)? {
            ParsedEnvelope::Supported(event) => event,
            ParsedEnvelope::Unsupported { id, event_type } => {
                debug!("🪝️ Ignoring {event_type} event {id}");
                return Ok(GateOutcome::Unsupported);
            },
        };
        if !self.policy.accepts(event.event_type) {
            debug!("🪝️ {} events are not accepted. Ignoring {}", event.event_type, event.id);
            return Ok(GateOutcome::Unsupported);
        }
        if self.policy.should_drop(event.livemode, event.account.as_deref()) {
            debug!("🪝️ Dropping test-mode event {} for {:?}", event.id, event.account);
            return Ok(GateOutcome::Dropped);
        }

        let wire_name = event.event_type.wire_name();
        let claim = self.db.claim_webhook_event(wire_name, &event.id).await?;
        if claim.deliveries > 1 {
            info!("🪝️ Event {} ({wire_name}) delivered {} times. Skipping", event.id, claim.deliveries);
            return Ok(GateOutcome::Duplicate);
        }

        match self.reconciler.handle(&event).await {
            Ok(()) => {
                debug!("🪝️ Event {} ({wire_name}) processed", event.id);
                Ok(GateOutcome::Processed)
            },
            Err(e @ EscrowError::RetryRequested(_)) => {
                info!("🪝️ Event {} ({wire_name}) will be retried. {e}", event.id);
                if let Err(release) = self.db.release_webhook_event(wire_name, &event.id).await {
                    error!("🪝️ Could not release event {}. Its redelivery will be skipped. {release}", event.id);
                }
                Err(e)
            },
            Err(e) => {
                error!("🪝️ Event {} ({wire_name}) could not be applied. {e}", event.id);
                Ok(GateOutcome::Failed)
            },
        }
    }

    fn authenticate(&self, delivery: &WebhookDelivery<'_>, now: i64) -> Result<(), EscrowError> {
        let header = delivery.signature.ok_or(SignatureError::MissingSignature)?;
        let secret = self.policy.secret_for(delivery.context);
        verify_signature(delivery.body, header, secret.reveal(), self.policy.tolerance, now).map_err(|e| {
            warn!("🪝️ Rejected {} webhook. {e}", delivery.context);
            EscrowError::from(e)
        })
    }
}
