use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayoutAccount, PayoutAccount},
    traits::LedgerError,
};

pub async fn upsert_payout_account(
    account: NewPayoutAccount,
    conn: &mut SqliteConnection,
) -> Result<PayoutAccount, LedgerError> {
    let account: PayoutAccount = sqlx::query_as(
        r#"
        INSERT INTO payout_accounts (
            user_id, external_id, is_bank, name, bank_name, brand, last4, routing_number, currency, country, is_active
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (external_id) DO UPDATE SET
            user_id = excluded.user_id,
            is_bank = excluded.is_bank,
            name = excluded.name,
            bank_name = excluded.bank_name,
            brand = excluded.brand,
            last4 = excluded.last4,
            routing_number = excluded.routing_number,
            currency = excluded.currency,
            country = excluded.country,
            is_active = excluded.is_active,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(account.user_id)
    .bind(account.external_id)
    .bind(account.is_bank)
    .bind(account.name)
    .bind(account.bank_name)
    .bind(account.brand)
    .bind(account.last4)
    .bind(account.routing_number)
    .bind(account.currency)
    .bind(account.country)
    .bind(account.is_active)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payout account {} saved for user {}", account.external_id, account.user_id);
    Ok(account)
}

pub async fn update_payout_account(
    account: NewPayoutAccount,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutAccount>, LedgerError> {
    let account = sqlx::query_as(
        r#"
        UPDATE payout_accounts SET
            is_bank = $1,
            name = $2,
            bank_name = $3,
            brand = $4,
            last4 = $5,
            routing_number = $6,
            currency = $7,
            country = $8,
            is_active = $9,
            updated_at = CURRENT_TIMESTAMP
        WHERE external_id = $10
        RETURNING *
        "#,
    )
    .bind(account.is_bank)
    .bind(account.name)
    .bind(account.bank_name)
    .bind(account.brand)
    .bind(account.last4)
    .bind(account.routing_number)
    .bind(account.currency)
    .bind(account.country)
    .bind(account.is_active)
    .bind(account.external_id)
    .fetch_optional(conn)
    .await?;
    Ok(account)
}

pub async fn payout_account_by_external_id(
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutAccount>, LedgerError> {
    let account = sqlx::query_as("SELECT * FROM payout_accounts WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

pub async fn payout_accounts_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PayoutAccount>, LedgerError> {
    let accounts =
        sqlx::query_as("SELECT * FROM payout_accounts WHERE user_id = $1 ORDER BY id").bind(user_id).fetch_all(conn).await?;
    Ok(accounts)
}

pub async fn set_active(external_id: &str, active: bool, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result = sqlx::query(
        "UPDATE payout_accounts SET is_active = $1, updated_at = CURRENT_TIMESTAMP WHERE external_id = $2",
    )
    .bind(active)
    .bind(external_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_payout_account(
    user_id: &str,
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<u64, LedgerError> {
    let result = sqlx::query("DELETE FROM payout_accounts WHERE user_id = $1 AND external_id = $2")
        .bind(user_id)
        .bind(external_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result = sqlx::query("DELETE FROM payout_accounts WHERE user_id = $1").bind(user_id).execute(conn).await?;
    Ok(result.rows_affected())
}
