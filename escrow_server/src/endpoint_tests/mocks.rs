use async_trait::async_trait;
use escrow_engine::{
    db_types::MinorUnits,
    epp::{Balance, CustomerProfile, DebitRequest, EppPayout, PaymentIntent, PaymentIntentRequest, PayoutInstruction},
    PaymentProcessor,
    ProcessorError,
};
use mockall::mock;

mock! {
    pub Epp {}
    #[async_trait]
    impl PaymentProcessor for Epp {
        async fn create_hold(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError>;
        async fn capture_hold(&self, hold_id: &str, amount: MinorUnits, application_fee: MinorUnits) -> Result<PaymentIntent, ProcessorError>;
        async fn cancel_hold(&self, hold_id: &str) -> Result<PaymentIntent, ProcessorError>;
        async fn create_charge(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError>;
        async fn create_transfer_charge(&self, request: PaymentIntentRequest) -> Result<PaymentIntent, ProcessorError>;
        async fn create_debit(&self, request: DebitRequest) -> Result<String, ProcessorError>;
        async fn create_payout(&self, instruction: PayoutInstruction) -> Result<EppPayout, ProcessorError>;
        async fn cancel_payout(&self, connected_account_id: &str, payout_id: &str) -> Result<(), ProcessorError>;
        async fn retrieve_balance(&self, connected_account_id: &str) -> Result<Balance, ProcessorError>;
        async fn create_customer(&self, profile: &CustomerProfile) -> Result<String, ProcessorError>;
        async fn delete_customer(&self, customer_id: &str) -> Result<(), ProcessorError>;
        async fn create_connected_account(&self, profile: &CustomerProfile) -> Result<String, ProcessorError>;
        async fn delete_connected_account(&self, connected_account_id: &str) -> Result<(), ProcessorError>;
        async fn set_default_payment_method(&self, customer_id: &str, method_id: &str) -> Result<(), ProcessorError>;
        async fn detach_payment_method(&self, method_id: &str) -> Result<(), ProcessorError>;
    }
}
