//! Types that describe the external payment processor (EPP): the objects that flow through the
//! [`crate::traits::PaymentProcessor`] capability, and the asynchronous event envelopes it delivers via webhooks.
mod event_types;
mod objects;

pub use event_types::{
    ApplicationObject,
    ConnectedAccountObject,
    EnvelopeError,
    EppEvent,
    EventKind,
    EventType,
    ExternalAccountObject,
    ParsedEnvelope,
    PaymentErrorObject,
    PaymentIntentObject,
    PaymentMethodObject,
    PayoutObject,
    Requirements,
};
pub use objects::{
    Balance,
    BalanceBucket,
    CaptureMethod,
    CardDetails,
    CustomerProfile,
    DebitRequest,
    EppPayout,
    PaymentIntent,
    PaymentIntentRequest,
    PayoutInstruction,
    SourceTypes,
    APPLICATION_METADATA_KEY,
};
