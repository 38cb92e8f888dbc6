use std::collections::HashMap;

use epg_common::MinorUnits;
use serde::{Deserialize, Serialize};

/// Set on direct platform charges, so that settlement events can tell them apart from job payments.
pub const APPLICATION_METADATA_KEY: &str = "is_application";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    /// Funds are only reserved (a hold) until explicitly captured
    Manual,
    /// Funds are charged immediately
    Automatic,
}

/// A request to move money from a customer. Holds, direct charges and transfer-bearing charges are all expressed with
/// this one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntentRequest {
    pub customer_id: String,
    pub payment_method_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub description: String,
    pub capture_method: CaptureMethod,
    /// The connected account that receives the funds, less the application fee
    pub destination: Option<String>,
    pub application_fee: Option<MinorUnits>,
    pub metadata: HashMap<String, String>,
}

impl PaymentIntentRequest {
    pub fn is_application(&self) -> bool {
        self.metadata.get(APPLICATION_METADATA_KEY).map(|v| v == "true").unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub customer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutInstruction {
    pub connected_account_id: String,
    /// The external account id
    pub destination: String,
    pub amount: MinorUnits,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EppPayout {
    pub id: String,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub status: String,
}

/// A charge against a connected account's balance, used to collect the payout service fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebitRequest {
    pub connected_account_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CustomerProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTypes {
    #[serde(default)]
    pub bank_account: MinorUnits,
    #[serde(default)]
    pub card: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBucket {
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub source_types: Option<SourceTypes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub available: Vec<BalanceBucket>,
    #[serde(default)]
    pub pending: Vec<BalanceBucket>,
}

impl Balance {
    /// Total available funds in `currency`.
    pub fn available_in(&self, currency: &str) -> MinorUnits {
        self.available.iter().filter(|b| b.currency.eq_ignore_ascii_case(currency)).map(|b| b.amount).sum()
    }

    /// Available funds in `currency` that can be paid out to the given kind of destination.
    pub fn available_for_payout(&self, currency: &str, to_bank: bool) -> MinorUnits {
        self.available
            .iter()
            .filter(|b| b.currency.eq_ignore_ascii_case(currency))
            .map(|b| match b.source_types {
                Some(s) if to_bank => s.bank_account,
                Some(s) => s.card,
                None => MinorUnits::default(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub exp_month: Option<i64>,
    #[serde(default)]
    pub exp_year: Option<i64>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub wallet: Option<serde_json::Value>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payout_balance_by_source_type() {
        let balance: Balance = serde_json::from_str(
            r#"{"available":[
                {"amount":5000,"currency":"usd","source_types":{"bank_account":3000,"card":2000}},
                {"amount":900,"currency":"eur","source_types":{"bank_account":900}}
            ],"pending":[]}"#,
        )
        .unwrap();
        assert_eq!(balance.available_in("USD"), MinorUnits::from(5_000));
        assert_eq!(balance.available_for_payout("usd", true), MinorUnits::from(3_000));
        assert_eq!(balance.available_for_payout("usd", false), MinorUnits::from(2_000));
        assert_eq!(balance.available_for_payout("eur", false), MinorUnits::from(0));
        assert_eq!(balance.available_in("gbp"), MinorUnits::from(0));
    }
}
