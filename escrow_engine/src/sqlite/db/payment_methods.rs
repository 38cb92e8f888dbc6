use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentMethod, PaymentMethod},
    traits::LedgerError,
};

/// Inserts the method or overwrites the existing one with the same `(user_id, fingerprint)`. The default flag is
/// left untouched on update.
pub async fn upsert_method(method: NewPaymentMethod, conn: &mut SqliteConnection) -> Result<PaymentMethod, LedgerError> {
    let d = method.details;
    let method: PaymentMethod = sqlx::query_as(
        r#"
        INSERT INTO payment_methods (
            user_id, external_id, fingerprint, name, last4, brand, exp_month, exp_year, wallet, method_type, country
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (user_id, fingerprint) DO UPDATE SET
            external_id = excluded.external_id,
            name = excluded.name,
            last4 = excluded.last4,
            brand = excluded.brand,
            exp_month = excluded.exp_month,
            exp_year = excluded.exp_year,
            wallet = excluded.wallet,
            method_type = excluded.method_type,
            country = excluded.country,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(method.user_id)
    .bind(method.external_id)
    .bind(method.fingerprint)
    .bind(d.name)
    .bind(d.last4)
    .bind(d.brand)
    .bind(d.exp_month)
    .bind(d.exp_year)
    .bind(d.wallet)
    .bind(d.method_type)
    .bind(method.country)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payment method {} saved for user {}", method.external_id, method.user_id);
    Ok(method)
}

pub async fn methods_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<PaymentMethod>, LedgerError> {
    let methods = sqlx::query_as("SELECT * FROM payment_methods WHERE user_id = $1 ORDER BY is_default DESC, id")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(methods)
}

pub async fn default_method(user_id: &str, conn: &mut SqliteConnection) -> Result<Option<PaymentMethod>, LedgerError> {
    let method = sqlx::query_as("SELECT * FROM payment_methods WHERE user_id = $1 AND is_default = 1 LIMIT 1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(method)
}

pub async fn method_by_external_id(
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentMethod>, LedgerError> {
    let method = sqlx::query_as("SELECT * FROM payment_methods WHERE external_id = $1 LIMIT 1")
        .bind(external_id)
        .fetch_optional(conn)
        .await?;
    Ok(method)
}

/// Not atomic on its own. Run it inside a transaction.
pub async fn mark_default(
    user_id: &str,
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<PaymentMethod, LedgerError> {
    sqlx::query(
        r#"
        UPDATE payment_methods SET is_default = 0, updated_at = CURRENT_TIMESTAMP
        WHERE user_id = $1 AND external_id <> $2 AND is_default = 1
        "#,
    )
    .bind(user_id)
    .bind(external_id)
    .execute(&mut *conn)
    .await?;
    let method = sqlx::query_as(
        r#"
        UPDATE payment_methods SET is_default = 1, updated_at = CURRENT_TIMESTAMP
        WHERE user_id = $1 AND external_id = $2
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(external_id)
    .fetch_optional(conn)
    .await?;
    method.ok_or_else(|| LedgerError::NotFound(format!("Payment method {external_id} for user {user_id}")))
}

pub async fn delete_method(external_id: &str, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result = sqlx::query("DELETE FROM payment_methods WHERE external_id = $1").bind(external_id).execute(conn).await?;
    Ok(result.rows_affected())
}
