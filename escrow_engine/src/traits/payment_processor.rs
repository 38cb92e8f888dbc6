use async_trait::async_trait;
use thiserror::Error;

use crate::{
    db_types::MinorUnits,
    epp::{Balance, CustomerProfile, DebitRequest, EppPayout, PaymentIntent, PaymentIntentRequest, PayoutInstruction},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// The processor understood the request and refused it (card declined, insufficient balance, bad parameters ...)
    #[error("The payment processor rejected the request. {0}")]
    Rejected(String),
    #[error("Could not reach the payment processor. {0}")]
    Transport(String),
    #[error("The payment processor sent a response that could not be understood. {0}")]
    InvalidResponse(String),
}

/// The money-moving capabilities the engine needs from the external payment processor.
///
/// Implementations must be cheap to share: the engine holds them as `Arc<dyn PaymentProcessor>` and calls them from
/// compensation tasks as well as request paths.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Reserves funds on the customer's payment method without charging them (manual capture).
    async fn create_hold(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError>;

    /// Charges `amount` from an existing hold. The platform keeps `application_fee`; the rest goes to the hold's
    /// destination account.
    async fn capture_hold(
        &self,
        hold_id: &str,
        amount: MinorUnits,
        application_fee: MinorUnits,
    ) -> Result<PaymentIntent, ProcessorError>;

    async fn cancel_hold(&self, hold_id: &str) -> Result<PaymentIntent, ProcessorError>;

    /// An immediate charge that the platform keeps in full
    async fn create_charge(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError>;

    /// An immediate charge that is transferred to `request.destination`, less the application fee
    async fn create_transfer_charge(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError>;

    /// Debits a connected account's balance in favour of the platform. Returns the processor's id for the debit.
    async fn create_debit(&self, request: DebitRequest) -> Result<String, ProcessorError>;

    async fn create_payout(&self, instruction: PayoutInstruction) -> Result<EppPayout, ProcessorError>;

    async fn cancel_payout(&self, connected_account_id: &str, payout_id: &str) -> Result<(), ProcessorError>;

    /// The live balance of a connected account
    async fn retrieve_balance(&self, connected_account_id: &str) -> Result<Balance, ProcessorError>;

    /// Returns the new customer id
    async fn create_customer(&self, profile: &CustomerProfile) -> Result<String, ProcessorError>;

    async fn delete_customer(&self, customer_id: &str) -> Result<(), ProcessorError>;

    /// Returns the new connected account id
    async fn create_connected_account(&self, profile: &CustomerProfile) -> Result<String, ProcessorError>;

    async fn delete_connected_account(&self, connected_account_id: &str) -> Result<(), ProcessorError>;

    async fn set_default_payment_method(&self, customer_id: &str, method_id: &str) -> Result<(), ProcessorError>;

    async fn detach_payment_method(&self, method_id: &str) -> Result<(), ProcessorError>;
}
