//! # SQLite ledger queries
//!
//! These are plain functions that take a `&mut SqliteConnection`. The caller decides whether that connection is a
//! pooled connection (for reads) or the inside of a transaction (for every write), and passes `&mut *tx` accordingly.
use std::{env, time::Duration};

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod accounts;
pub mod invoices;
pub mod job_payments;
pub mod payment_methods;
pub mod payout_accounts;
pub mod payouts;
pub mod transactions;
pub mod wallets;
pub mod webhook_events;

const SQLITE_DB_URL: &str = "sqlite://data/escrow.db";
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("EPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ EPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(url)
        .await?;
    Ok(pool)
}
