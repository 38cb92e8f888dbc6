use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{db_types::MinorUnits, traits::Notification};

/// What happened to a payment, from the point of view of the people who should hear about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    PaymentAuthorized,
    PaymentCaptured,
    PaymentDeclined,
    PaymentSucceeded,
    PaymentFailed,
    PaymentCanceled,
    PayoutRequested,
}

impl NotificationKind {
    /// The stable tag that push clients switch on
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PaymentAuthorized => "paymentauthorize",
            Self::PaymentCaptured => "paymentcapture",
            Self::PaymentDeclined => "paymentdecline",
            Self::PaymentSucceeded => "paymentsuccess",
            Self::PaymentFailed => "paymentfail",
            Self::PaymentCanceled => "paymentcancel",
            Self::PayoutRequested => "payoutrequest",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::PaymentAuthorized => "Payment authorized",
            Self::PaymentCaptured => "Payment captured",
            Self::PaymentDeclined => "Payment declined",
            Self::PaymentSucceeded => "Payment successful",
            Self::PaymentFailed => "Payment failed",
            Self::PaymentCanceled => "Payment canceled",
            Self::PayoutRequested => "Payout requested",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub recipients: Vec<String>,
    pub transaction_id: Option<i64>,
    pub amount: MinorUnits,
    pub currency: String,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, recipients: Vec<String>, amount: MinorUnits, currency: &str) -> Self {
        Self { kind, recipients, transaction_id: None, amount, currency: currency.to_string() }
    }

    pub fn for_transaction(mut self, transaction_id: i64) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn to_notification(&self) -> Notification {
        let body = match self.kind {
            NotificationKind::PaymentAuthorized => format!("{} {} has been reserved for your job.", self.amount, self.currency),
            NotificationKind::PaymentCaptured => format!("{} {} is being charged.", self.amount, self.currency),
            NotificationKind::PaymentDeclined => "The payment hold was released.".to_string(),
            NotificationKind::PaymentSucceeded => format!("A payment of {} {} went through.", self.amount, self.currency),
            NotificationKind::PaymentFailed => "Your payment could not be completed.".to_string(),
            NotificationKind::PaymentCanceled => "The payment was canceled.".to_string(),
            NotificationKind::PayoutRequested => format!("A payout of {} {} is on its way.", self.amount, self.currency),
        };
        let mut data = HashMap::from([("type".to_string(), self.kind.tag().to_string())]);
        if let Some(id) = self.transaction_id {
            data.insert("transaction_id".to_string(), id.to_string());
        }
        Notification { recipients: self.recipients.clone(), title: self.kind.title().to_string(), body, data }
    }
}
