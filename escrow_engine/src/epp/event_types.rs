use std::{collections::HashMap, fmt::Display, str::FromStr};

use epg_common::MinorUnits;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::objects::{Balance, CardDetails, APPLICATION_METADATA_KEY};

#[derive(Debug, Clone, Error)]
pub enum EnvelopeError {
    #[error("The event body is not a valid event envelope. {0}")]
    MalformedEnvelope(String),
    #[error("The payload of a {event_type} event could not be read. {reason}")]
    MalformedPayload { event_type: EventType, reason: String },
}

//--------------------------------------     EventType       ---------------------------------------------------------
/// Every processor event type the reconciler knows how to handle. Anything else is "unsupported".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    PaymentIntentSucceeded,
    PaymentIntentAmountCapturableUpdated,
    PaymentIntentRequiresAction,
    PaymentIntentPaymentFailed,
    PaymentIntentCanceled,
    AccountUpdated,
    ExternalAccountCreated,
    ExternalAccountUpdated,
    ExternalAccountDeleted,
    ApplicationDeauthorized,
    PayoutCreated,
    PayoutUpdated,
    PayoutPaid,
    PayoutFailed,
    PayoutCanceled,
    BalanceAvailable,
    PaymentMethodAttached,
    PaymentMethodUpdated,
    PaymentMethodAutomaticallyUpdated,
    PaymentMethodDetached,
}

impl EventType {
    pub const ALL: [EventType; 20] = [
        EventType::PaymentIntentSucceeded,
        EventType::PaymentIntentAmountCapturableUpdated,
        EventType::PaymentIntentRequiresAction,
        EventType::PaymentIntentPaymentFailed,
        EventType::PaymentIntentCanceled,
        EventType::AccountUpdated,
        EventType::ExternalAccountCreated,
        EventType::ExternalAccountUpdated,
        EventType::ExternalAccountDeleted,
        EventType::ApplicationDeauthorized,
        EventType::PayoutCreated,
        EventType::PayoutUpdated,
        EventType::PayoutPaid,
        EventType::PayoutFailed,
        EventType::PayoutCanceled,
        EventType::BalanceAvailable,
        EventType::PaymentMethodAttached,
        EventType::PaymentMethodUpdated,
        EventType::PaymentMethodAutomaticallyUpdated,
        EventType::PaymentMethodDetached,
    ];

    /// The name the processor uses for this event type on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::PaymentIntentAmountCapturableUpdated => "payment_intent.amount_capturable_updated",
            Self::PaymentIntentRequiresAction => "payment_intent.requires_action",
            Self::PaymentIntentPaymentFailed => "payment_intent.payment_failed",
            Self::PaymentIntentCanceled => "payment_intent.canceled",
            Self::AccountUpdated => "account.updated",
            Self::ExternalAccountCreated => "account.external_account.created",
            Self::ExternalAccountUpdated => "account.external_account.updated",
            Self::ExternalAccountDeleted => "account.external_account.deleted",
            Self::ApplicationDeauthorized => "account.application.deauthorized",
            Self::PayoutCreated => "payout.created",
            Self::PayoutUpdated => "payout.updated",
            Self::PayoutPaid => "payout.paid",
            Self::PayoutFailed => "payout.failed",
            Self::PayoutCanceled => "payout.canceled",
            Self::BalanceAvailable => "balance.available",
            Self::PaymentMethodAttached => "payment_method.attached",
            Self::PaymentMethodUpdated => "payment_method.updated",
            Self::PaymentMethodAutomaticallyUpdated => "payment_method.automatically_updated",
            Self::PaymentMethodDetached => "payment_method.detached",
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|t| t.wire_name() == s).ok_or_else(|| format!("Unsupported event type: {s}"))
    }
}

//--------------------------------------     Payloads       ----------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentErrorObject {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: MinorUnits,
    #[serde(default)]
    pub amount_capturable: MinorUnits,
    #[serde(default)]
    pub amount_received: MinorUnits,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<PaymentErrorObject>,
}

impl PaymentIntentObject {
    pub fn is_application(&self) -> bool {
        self.metadata.get(APPLICATION_METADATA_KEY).map(|v| v == "true").unwrap_or(false)
    }

    /// The amount that actually settled. Falls back to the intent amount when the processor omits `amount_received`.
    pub fn settled_amount(&self) -> MinorUnits {
        if self.amount_received.is_positive() {
            self.amount_received
        } else {
            self.amount
        }
    }

    pub fn failure_message(&self) -> String {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "Payment Failed".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub currently_due: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccountObject {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub requirements: Option<Requirements>,
}

impl ConnectedAccountObject {
    /// True once the processor has nothing outstanding for this account and will both charge and pay out.
    pub fn is_ready(&self) -> bool {
        let nothing_due = self.requirements.as_ref().map(|r| r.currently_due.is_empty()).unwrap_or(true);
        self.charges_enabled && self.payouts_enabled && nothing_due
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccountObject {
    pub id: String,
    /// `bank_account` or `card`
    pub object: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub routing_number: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, alias = "account_holder_name")]
    pub name: Option<String>,
}

impl ExternalAccountObject {
    pub fn is_bank(&self) -> bool {
        self.object != "card"
    }

    /// Bank accounts are usable only while their status is `new`. Cards are always usable.
    pub fn is_active(&self) -> bool {
        if self.object == "bank_account" {
            self.status.as_deref() == Some("new")
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutObject {
    pub id: String,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default, rename = "type")]
    pub method_type: Option<String>,
    #[serde(default)]
    pub card: Option<CardDetails>,
    #[serde(default)]
    pub billing_details: Option<BillingDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    #[serde(default)]
    pub name: Option<String>,
}

impl PaymentMethodObject {
    pub fn fingerprint(&self) -> Option<&str> {
        self.card.as_ref().and_then(|c| c.fingerprint.as_deref())
    }
}

//--------------------------------------     EppEvent       ----------------------------------------------------------
/// A verified, decoded processor event. One variant per handler; related wire types share a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    PaymentSucceeded(PaymentIntentObject),
    AmountCapturableUpdated(PaymentIntentObject),
    /// `requires_action` and `payment_failed`
    PaymentFailed(PaymentIntentObject),
    PaymentCanceled(PaymentIntentObject),
    AccountUpdated(ConnectedAccountObject),
    ExternalAccountCreated(ExternalAccountObject),
    ExternalAccountUpdated(ExternalAccountObject),
    ExternalAccountDeleted(ExternalAccountObject),
    AccountDeauthorized(ApplicationObject),
    /// `payout.created` and `payout.updated`
    PayoutInFlight(PayoutObject),
    PayoutPaid(PayoutObject),
    /// `payout.failed` and `payout.canceled`
    PayoutFailed(PayoutObject),
    BalanceAvailable(Balance),
    /// `payment_method.attached`, `.updated` and `.automatically_updated`
    PaymentMethodUpserted(PaymentMethodObject),
    PaymentMethodDetached(PaymentMethodObject),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EppEvent {
    pub id: String,
    pub event_type: EventType,
    /// The connected account the event belongs to. `None` for platform events.
    pub account: Option<String>,
    pub livemode: bool,
    pub created: i64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEnvelope {
    Supported(EppEvent),
    Unsupported { id: String, event_type: String },
}

#[derive(Deserialize)]
struct RawEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    livemode: bool,
    #[serde(default)]
    created: i64,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: Value,
}

fn payload<T: DeserializeOwned>(event_type: EventType, object: Value) -> Result<T, EnvelopeError> {
    serde_json::from_value(object)
        .map_err(|e| EnvelopeError::MalformedPayload { event_type, reason: e.to_string() })
}

impl EventKind {
    fn decode(event_type: EventType, object: Value) -> Result<Self, EnvelopeError> {
        use EventType::*;
        let kind = match event_type {
            PaymentIntentSucceeded => Self::PaymentSucceeded(payload(event_type, object)?),
            PaymentIntentAmountCapturableUpdated => Self::AmountCapturableUpdated(payload(event_type, object)?),
            PaymentIntentRequiresAction | PaymentIntentPaymentFailed => {
                Self::PaymentFailed(payload(event_type, object)?)
            },
            PaymentIntentCanceled => Self::PaymentCanceled(payload(event_type, object)?),
            AccountUpdated => Self::AccountUpdated(payload(event_type, object)?),
            ExternalAccountCreated => Self::ExternalAccountCreated(payload(event_type, object)?),
            ExternalAccountUpdated => Self::ExternalAccountUpdated(payload(event_type, object)?),
            ExternalAccountDeleted => Self::ExternalAccountDeleted(payload(event_type, object)?),
            ApplicationDeauthorized => Self::AccountDeauthorized(payload(event_type, object)?),
            PayoutCreated | PayoutUpdated => Self::PayoutInFlight(payload(event_type, object)?),
            PayoutPaid => Self::PayoutPaid(payload(event_type, object)?),
            PayoutFailed | PayoutCanceled => Self::PayoutFailed(payload(event_type, object)?),
            BalanceAvailable => Self::BalanceAvailable(payload(event_type, object)?),
            PaymentMethodAttached | PaymentMethodUpdated | PaymentMethodAutomaticallyUpdated => {
                Self::PaymentMethodUpserted(payload(event_type, object)?)
            },
            PaymentMethodDetached => Self::PaymentMethodDetached(payload(event_type, object)?),
        };
        Ok(kind)
    }
}

impl EppEvent {
    /// Decodes a raw (already authenticated) webhook body.
    pub fn parse(body: &[u8]) -> Result<ParsedEnvelope, EnvelopeError> {
        let raw: RawEnvelope =
            serde_json::from_slice(body).map_err(|e| EnvelopeError::MalformedEnvelope(e.to_string()))?;
        let event_type = match EventType::from_str(&raw.event_type) {
            Ok(t) => t,
            Err(_) => return Ok(ParsedEnvelope::Unsupported { id: raw.id, event_type: raw.event_type }),
        };
        let kind = EventKind::decode(event_type, raw.data.object)?;
        Ok(ParsedEnvelope::Supported(EppEvent {
            id: raw.id,
            event_type,
            account: raw.account,
            livemode: raw.livemode,
            created: raw.created,
            kind,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for t in EventType::ALL {
            assert_eq!(EventType::from_str(t.wire_name()), Ok(t));
        }
        assert!(EventType::from_str("charge.expired").is_err());
    }

    #[test]
    fn parse_payout_paid() {
        let body = br#"{
            "id": "evt_1", "type": "payout.paid", "account": "acct_9", "livemode": false, "created": 1700000000,
            "data": { "object": { "id": "po_1", "amount": 4000, "currency": "usd", "destination": "ba_1" } }
        }"#;
        let ParsedEnvelope::Supported(event) = EppEvent::parse(body).unwrap() else { panic!("Expected a supported event") };
        assert_eq!(event.event_type, EventType::PayoutPaid);
        assert_eq!(event.account.as_deref(), Some("acct_9"));
        match event.kind {
            EventKind::PayoutPaid(p) => {
                assert_eq!(p.amount, MinorUnits::from(4_000));
                assert_eq!(p.destination.as_deref(), Some("ba_1"));
            },
            other => panic!("Unexpected kind {other:?}"),
        }
    }

    #[test]
    fn related_types_share_a_handler() {
        let body = br#"{"id":"evt_2","type":"payment_intent.requires_action","data":{"object":{"id":"pi_1","amount":100}}}"#;
        let ParsedEnvelope::Supported(event) = EppEvent::parse(body).unwrap() else { panic!("Expected a supported event") };
        assert!(matches!(event.kind, EventKind::PaymentFailed(_)));
        assert!(!event.livemode);
    }

    #[test]
    fn unknown_types_are_unsupported() {
        let body = br#"{"id":"evt_3","type":"charge.expired","data":{"object":{}}}"#;
        assert_eq!(
            EppEvent::parse(body).unwrap(),
            ParsedEnvelope::Unsupported { id: "evt_3".into(), event_type: "charge.expired".into() }
        );
    }

    #[test]
    fn malformed_bodies() {
        assert!(matches!(EppEvent::parse(b"not json"), Err(EnvelopeError::MalformedEnvelope(_))));
        let body = br#"{"id":"evt_4","type":"payout.paid","data":{"object":{"id":"po_1"}}}"#;
        assert!(matches!(EppEvent::parse(body), Err(EnvelopeError::MalformedPayload { .. })));
    }

    #[test]
    fn account_readiness() {
        let mut account = ConnectedAccountObject {
            id: "acct_1".into(),
            charges_enabled: true,
            payouts_enabled: true,
            requirements: Some(Requirements { currently_due: vec![] }),
        };
        assert!(account.is_ready());
        account.requirements = Some(Requirements { currently_due: vec!["individual.ssn_last_4".into()] });
        assert!(!account.is_ready());
    }

    #[test]
    fn payment_intent_helpers() {
        let pi: PaymentIntentObject = serde_json::from_str(
            r#"{"id":"pi_1","amount":500,"metadata":{"is_application":"true"},"last_payment_error":{"message":"Card declined"}}"#,
        )
        .unwrap();
        assert!(pi.is_application());
        assert_eq!(pi.settled_amount(), MinorUnits::from(500));
        assert_eq!(pi.failure_message(), "Card declined");
    }
}
