use epg_common::{DEFAULT_CURRENCY, MAX_AMOUNT};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Invoice, JobPayment, MinorUnits, PaymentTransaction},
    escrow_api::errors::EscrowError,
    fees::FeeBreakdown,
};

/// A payment from a payer to a payee for a marketplace job. Used both for escrow holds and for immediate transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub payer: String,
    pub payee: String,
    /// The job amount, before any fees or tax
    pub amount: MinorUnits,
    pub currency: String,
    pub description: String,
    pub job_id: String,
    pub job_title: Option<String>,
    pub location: Option<String>,
    /// Display name of the payee, printed on the invoice
    pub deployee_name: Option<String>,
    /// Tax jurisdiction, e.g. a state code
    pub jurisdiction: Option<String>,
}

pub type PayAccountRequest = AuthorizeRequest;

impl AuthorizeRequest {
    pub fn new<S: Into<String>>(payer: S, payee: S, amount: MinorUnits, job_id: S, description: S) -> Self {
        Self {
            payer: payer.into(),
            payee: payee.into(),
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            description: description.into(),
            job_id: job_id.into(),
            job_title: None,
            location: None,
            deployee_name: None,
            jurisdiction: None,
        }
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_job_title<S: Into<String>>(mut self, title: S) -> Self {
        self.job_title = Some(title.into());
        self
    }

    pub fn with_location<S: Into<String>>(mut self, location: S) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_deployee_name<S: Into<String>>(mut self, name: S) -> Self {
        self.deployee_name = Some(name.into());
        self
    }

    pub fn with_jurisdiction<S: Into<String>>(mut self, jurisdiction: S) -> Self {
        self.jurisdiction = Some(jurisdiction.into());
        self
    }

    pub fn validate(&self) -> Result<(), EscrowError> {
        validate_amount(self.amount)?;
        if self.description.trim().is_empty() {
            return Err(EscrowError::validation("A description is required"));
        }
        if self.job_id.trim().is_empty() {
            return Err(EscrowError::validation("A job id is required"));
        }
        if self.currency.trim().is_empty() {
            return Err(EscrowError::validation("A currency is required"));
        }
        if self.payer == self.payee {
            return Err(EscrowError::validation("Payer and payee must be different users"));
        }
        Ok(())
    }
}

/// Amounts must be positive and no larger than [`MAX_AMOUNT`].
pub fn validate_amount(amount: MinorUnits) -> Result<(), EscrowError> {
    if !amount.is_positive() {
        return Err(EscrowError::validation(format!("Amount must be positive, not {amount}")));
    }
    if amount > MAX_AMOUNT {
        return Err(EscrowError::validation(format!("Amount {amount} is larger than the maximum of {MAX_AMOUNT}")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub transaction_id: i64,
    pub requested_by: String,
    pub job_id: String,
    /// Capture a different job amount from the one that was authorized
    pub amount: Option<MinorUnits>,
    /// The job was cancelled but the payee is still owed the captured amount
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub transaction_id: i64,
    pub requested_by: String,
}

/// A direct charge that the platform keeps, e.g. a subscription or listing fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformChargeRequest {
    pub payer: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub description: String,
    pub jurisdiction: Option<String>,
}

impl PlatformChargeRequest {
    pub fn validate(&self) -> Result<(), EscrowError> {
        validate_amount(self.amount)?;
        if self.description.trim().is_empty() {
            return Err(EscrowError::validation("A description is required"));
        }
        if self.currency.trim().is_empty() {
            return Err(EscrowError::validation("A currency is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizedPayment {
    pub transaction: PaymentTransaction,
    pub job: JobPayment,
    pub invoice: Invoice,
    pub fees: FeeBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobCharge {
    pub transaction: PaymentTransaction,
    pub job: JobPayment,
    pub fees: FeeBreakdown,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn authorize_validation() {
        let ok = AuthorizeRequest::new("alice", "bob", MinorUnits::from(10_000), "job-1", "Fix the sink");
        assert!(ok.validate().is_ok());
        let mut r = ok.clone();
        r.amount = MinorUnits::from(0);
        assert!(r.validate().is_err());
        let mut r = ok.clone();
        r.job_id = " ".into();
        assert!(r.validate().is_err());
        let mut r = ok.clone();
        r.description = String::new();
        assert!(r.validate().is_err());
        let mut r = ok.clone();
        r.payee = "alice".into();
        assert!(r.validate().is_err());
        let mut r = ok;
        r.amount = MinorUnits::from(i64::MAX - 10);
        assert!(matches!(r.validate(), Err(EscrowError::Validation(_))));
        r.amount = MAX_AMOUNT;
        assert!(r.validate().is_ok());
    }
}
