use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{MinorUnits, Wallet},
    traits::LedgerError,
};

/// Returns the wallet for `(user_id, currency)`, creating an empty one if needed. Concurrent callers always end up with
/// the same row.
pub async fn fetch_or_create_wallet(
    user_id: &str,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let currency = currency.to_ascii_lowercase();
    let inserted = sqlx::query("INSERT INTO wallets (user_id, currency) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(user_id)
        .bind(&currency)
        .execute(&mut *conn)
        .await?;
    if inserted.rows_affected() > 0 {
        debug!("🗃️ New {currency} wallet created for user {user_id}");
    }
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1 AND currency = $2")
        .bind(user_id)
        .bind(&currency)
        .fetch_one(conn)
        .await?;
    Ok(wallet)
}

pub async fn fetch_wallet(
    user_id: &str,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, LedgerError> {
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1 AND currency = $2")
        .bind(user_id)
        .bind(currency.to_ascii_lowercase())
        .fetch_optional(conn)
        .await?;
    Ok(wallet)
}

pub async fn wallets_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Wallet>, LedgerError> {
    let wallets =
        sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1 ORDER BY currency").bind(user_id).fetch_all(conn).await?;
    Ok(wallets)
}

async fn update_wallet(sql: &str, wallet_id: i64, value: i64, conn: &mut SqliteConnection) -> Result<Wallet, LedgerError> {
    let wallet = sqlx::query_as(sql).bind(value).bind(wallet_id).fetch_optional(conn).await?;
    wallet.ok_or_else(|| LedgerError::NotFound(format!("Wallet #{wallet_id}")))
}

pub async fn adjust_pending_payout(
    wallet_id: i64,
    delta: MinorUnits,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let sql = r#"
        UPDATE wallets SET pending_payout = pending_payout + $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2
        RETURNING *
    "#;
    let wallet = update_wallet(sql, wallet_id, delta.value(), conn).await?;
    trace!("🗃️ Wallet #{wallet_id} pending payout adjusted by {delta} to {}", wallet.pending_payout);
    Ok(wallet)
}

pub async fn set_value(wallet_id: i64, value: MinorUnits, conn: &mut SqliteConnection) -> Result<Wallet, LedgerError> {
    let sql = "UPDATE wallets SET value = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *";
    update_wallet(sql, wallet_id, value.value(), conn).await
}

pub async fn set_pending_value(
    wallet_id: i64,
    pending_value: MinorUnits,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let sql = "UPDATE wallets SET pending_value = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *";
    update_wallet(sql, wallet_id, pending_value.value(), conn).await
}

pub async fn set_last_payout(wallet_id: i64, payout_id: i64, conn: &mut SqliteConnection) -> Result<Wallet, LedgerError> {
    let sql =
        "UPDATE wallets SET last_payout_transaction_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *";
    update_wallet(sql, wallet_id, payout_id, conn).await
}
