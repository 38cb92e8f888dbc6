//! A REST client for the external payment processor.
//!
//! [`EppApi`] implements the engine's [`escrow_engine::PaymentProcessor`] capability against a Stripe-compatible,
//! form-encoded API. Requests on behalf of a connected account carry the account id in a header.
mod api;
mod config;
mod data_objects;
mod error;
mod helpers;

pub use api::EppApi;
pub use config::EppConfig;
pub use error::EppApiError;
