use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentAccount, PaymentAccount},
    traits::LedgerError,
};

pub async fn insert_account(
    account: NewPaymentAccount,
    conn: &mut SqliteConnection,
) -> Result<PaymentAccount, LedgerError> {
    let account: PaymentAccount = sqlx::query_as(
        r#"
        INSERT INTO payment_accounts (user_id, customer_id, connected_account_id)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(account.user_id)
    .bind(account.customer_id)
    .bind(account.connected_account_id)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payment account #{} created for user {}", account.id, account.user_id);
    Ok(account)
}

pub async fn accounts_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<PaymentAccount>, LedgerError> {
    let accounts = sqlx::query_as("SELECT * FROM payment_accounts WHERE user_id = $1 ORDER BY id")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(accounts)
}

pub async fn accounts_for_customer_id(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentAccount>, LedgerError> {
    let accounts = sqlx::query_as("SELECT * FROM payment_accounts WHERE customer_id = $1 ORDER BY id")
        .bind(customer_id)
        .fetch_all(conn)
        .await?;
    Ok(accounts)
}

pub async fn accounts_for_connected_account(
    connected_account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentAccount>, LedgerError> {
    let accounts = sqlx::query_as("SELECT * FROM payment_accounts WHERE connected_account_id = $1 ORDER BY id")
        .bind(connected_account_id)
        .fetch_all(conn)
        .await?;
    Ok(accounts)
}

pub async fn set_customer_id(
    account_id: i64,
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<PaymentAccount, LedgerError> {
    let account = sqlx::query_as(
        "UPDATE payment_accounts SET customer_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(customer_id)
    .bind(account_id)
    .fetch_optional(conn)
    .await?;
    account.ok_or_else(|| LedgerError::NotFound(format!("Payment account #{account_id}")))
}

pub async fn set_connected_account_id(
    account_id: i64,
    connected_account_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<PaymentAccount, LedgerError> {
    let account = sqlx::query_as(
        r#"
        UPDATE payment_accounts SET connected_account_id = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(connected_account_id)
    .bind(account_id)
    .fetch_optional(conn)
    .await?;
    account.ok_or_else(|| LedgerError::NotFound(format!("Payment account #{account_id}")))
}

pub async fn set_onboarding_flags(
    account_id: i64,
    is_onboarded: bool,
    payouts_enabled: bool,
    conn: &mut SqliteConnection,
) -> Result<PaymentAccount, LedgerError> {
    let account = sqlx::query_as(
        r#"
        UPDATE payment_accounts SET is_onboarded = $1, payouts_enabled = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(is_onboarded)
    .bind(payouts_enabled)
    .bind(account_id)
    .fetch_optional(conn)
    .await?;
    account.ok_or_else(|| LedgerError::NotFound(format!("Payment account #{account_id}")))
}
