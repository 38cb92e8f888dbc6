use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayoutTransaction, PayoutTransaction, PayoutTransition},
    traits::LedgerError,
};

async fn fetch_payout(
    user_id: &str,
    external_id: &str,
    wallet_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutTransaction>, LedgerError> {
    let payout = sqlx::query_as(
        "SELECT * FROM payout_transactions WHERE user_id = $1 AND external_id = $2 AND wallet_id = $3",
    )
    .bind(user_id)
    .bind(external_id)
    .bind(wallet_id)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

/// Records a payout lifecycle event. Must run inside a transaction: the read and the write below are only consistent
/// because the transaction holds the write lock between them.
pub async fn upsert_payout(
    payout: NewPayoutTransaction,
    conn: &mut SqliteConnection,
) -> Result<(PayoutTransaction, PayoutTransition), LedgerError> {
    let existing = fetch_payout(&payout.user_id, &payout.external_id, payout.wallet_id, &mut *conn).await?;
    match existing {
        None => {
            let row: PayoutTransaction = sqlx::query_as(
                r#"
                INSERT INTO payout_transactions (user_id, external_id, wallet_id, destination, amount, currency, status, description)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(payout.user_id)
            .bind(payout.external_id)
            .bind(payout.wallet_id)
            .bind(payout.destination)
            .bind(payout.amount)
            .bind(payout.currency)
            .bind(payout.status)
            .bind(payout.description)
            .fetch_one(conn)
            .await?;
            debug!("🗃️ Payout {} recorded as {}", row.external_id, row.status);
            let transition = PayoutTransition { id: row.id, previous: None, current: row.status };
            Ok((row, transition))
        },
        Some(row) if row.status.is_terminal() => {
            trace!("🗃️ Payout {} is already {}. Ignoring the move to {}", row.external_id, row.status, payout.status);
            let transition = PayoutTransition { id: row.id, previous: Some(row.status), current: row.status };
            Ok((row, transition))
        },
        Some(row) => {
            let updated: PayoutTransaction = sqlx::query_as(
                r#"
                UPDATE payout_transactions SET
                    status = $1,
                    destination = COALESCE($2, destination),
                    description = COALESCE($3, description),
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $4
                RETURNING *
                "#,
            )
            .bind(payout.status)
            .bind(payout.destination)
            .bind(payout.description)
            .bind(row.id)
            .fetch_one(conn)
            .await?;
            debug!("🗃️ Payout {} moved from {} to {}", row.external_id, row.status, updated.status);
            let transition = PayoutTransition { id: row.id, previous: Some(row.status), current: updated.status };
            Ok((updated, transition))
        },
    }
}

pub async fn payouts_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<PayoutTransaction>, LedgerError> {
    let payouts = sqlx::query_as("SELECT * FROM payout_transactions WHERE user_id = $1 ORDER BY id DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(payouts)
}
