use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;

use crate::{
    epp::EnvelopeError,
    helpers::SignatureError,
    traits::{LedgerError, ProcessorError, RenderError},
};

#[derive(Debug, Clone, Error)]
pub enum EscrowError {
    #[error("Invalid request. {0}")]
    Validation(String),
    /// The ledger is in a state that should be impossible, e.g. two payment accounts for one user. Nothing is mutated
    /// when this is raised.
    #[error("Ledger consistency violation. {0}")]
    ConsistencyViolation(String),
    #[error("External call failed. {0}")]
    ExternalCall(String),
    /// A call to the processor timed out. It may or may not have taken effect.
    #[error("The outcome of the external call is unknown. {0}")]
    UnknownOutcome(String),
    /// The event cannot be applied yet. The sender should deliver it again later.
    #[error("Retry requested. {0}")]
    RetryRequested(String),
    #[error("Authentication failed. {0}")]
    Authentication(String),
    #[error("Insufficient funds. {0}")]
    InsufficientFunds(String),
    #[error("Ledger error. {0}")]
    Ledger(#[from] LedgerError),
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ValidationError,
    ConsistencyViolation,
    ExternalCallFailure,
    RetryRequested,
    AuthenticationFailure,
    InsufficientFunds,
    LedgerError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::ConsistencyViolation => "consistency_violation",
            Self::ExternalCallFailure => "external_call_failure",
            Self::RetryRequested => "retry_requested",
            Self::AuthenticationFailure => "authentication_failure",
            Self::InsufficientFunds => "insufficient_funds",
            Self::LedgerError => "ledger_error",
        }
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EscrowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::ValidationError,
            Self::ConsistencyViolation(_) => ErrorCategory::ConsistencyViolation,
            Self::ExternalCall(_) | Self::UnknownOutcome(_) => ErrorCategory::ExternalCallFailure,
            Self::RetryRequested(_) => ErrorCategory::RetryRequested,
            Self::Authentication(_) => ErrorCategory::AuthenticationFailure,
            Self::InsufficientFunds(_) => ErrorCategory::InsufficientFunds,
            Self::Ledger(_) => ErrorCategory::LedgerError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UnknownOutcome(_) | Self::RetryRequested(_) => true,
            Self::Ledger(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Wraps a ledger failure in a webhook handler so that the processor delivers the event again.
    pub fn retry_after(e: LedgerError) -> Self {
        Self::RetryRequested(e.to_string())
    }
}

impl From<ProcessorError> for EscrowError {
    fn from(e: ProcessorError) -> Self {
        Self::ExternalCall(e.to_string())
    }
}

impl From<RenderError> for EscrowError {
    fn from(e: RenderError) -> Self {
        Self::ExternalCall(e.to_string())
    }
}

impl From<SignatureError> for EscrowError {
    fn from(e: SignatureError) -> Self {
        Self::Authentication(e.to_string())
    }
}

impl From<EnvelopeError> for EscrowError {
    fn from(e: EnvelopeError) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn categories_and_retryability() {
        let cases = [
            (EscrowError::validation("x"), "validation_error", false),
            (EscrowError::ConsistencyViolation("x".into()), "consistency_violation", false),
            (EscrowError::ExternalCall("x".into()), "external_call_failure", false),
            (EscrowError::UnknownOutcome("x".into()), "external_call_failure", true),
            (EscrowError::RetryRequested("x".into()), "retry_requested", true),
            (EscrowError::Authentication("x".into()), "authentication_failure", false),
            (EscrowError::InsufficientFunds("x".into()), "insufficient_funds", false),
            (EscrowError::Ledger(LedgerError::Conflict("busy".into())), "ledger_error", true),
            (EscrowError::Ledger(LedgerError::DatabaseError("x".into())), "ledger_error", false),
        ];
        for (err, code, retryable) in cases {
            assert_eq!(err.category().as_str(), code);
            assert_eq!(err.is_retryable(), retryable, "{err}");
        }
    }

    #[test]
    fn processor_rejections_are_external_failures() {
        let err: EscrowError = ProcessorError::Rejected("card_declined".into()).into();
        assert_eq!(err.category(), ErrorCategory::ExternalCallFailure);
    }
}
