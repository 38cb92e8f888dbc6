pub mod retry;
pub mod webhook_signature;

pub use retry::{with_retries, RetryPolicy};
pub use webhook_signature::{sign_payload, verify_signature, SignatureError, SignatureHeader};
