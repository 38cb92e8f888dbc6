//! # Escrow payment gateway server
//! This crate hosts the HTTP surface of the escrow payment gateway. It is responsible for:
//! Receiving webhook deliveries from the external payment processor.
//! Handing the raw, signed body to the engine's webhook gate, which verifies, de-duplicates and applies it.
//! Translating the gate's verdict into a status code the processor understands.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/platform`: Events about the platform account, signed with `EPG_WEBHOOK_SECRET`.
//! * `/webhook/connect`: Events about connected accounts, signed with `EPG_CONNECT_WEBHOOK_SECRET`.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
