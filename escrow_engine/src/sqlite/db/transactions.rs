use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{CaptureUpdate, MinorUnits, NewPaymentTransaction, PaymentTransaction, TransactionStatus},
    traits::{HistoryEntry, LedgerError, Pagination},
};

pub async fn insert_transaction(
    txn: NewPaymentTransaction,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, LedgerError> {
    let m = txn.method;
    let txn: PaymentTransaction = sqlx::query_as(
        r#"
        INSERT INTO payment_transactions (
            sender, recipient, status, amount, currency, description, country, customer_id, connected_account_id,
            external_id, name, fingerprint, last4, brand, exp_month, exp_year, wallet, method_type,
            service_charge, mobilization_fee, tax, deployee_revenue, is_application
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9,
            $10, $11, $12, $13, $14, $15, $16, $17, $18,
            $19, $20, $21, $22, $23
        )
        RETURNING *
        "#,
    )
    .bind(txn.sender)
    .bind(txn.recipient)
    .bind(txn.status)
    .bind(txn.amount)
    .bind(txn.currency)
    .bind(txn.description)
    .bind(txn.country)
    .bind(txn.customer_id)
    .bind(txn.connected_account_id)
    .bind(txn.external_id)
    .bind(m.name)
    .bind(m.fingerprint)
    .bind(m.last4)
    .bind(m.brand)
    .bind(m.exp_month)
    .bind(m.exp_year)
    .bind(m.wallet)
    .bind(m.method_type)
    .bind(txn.service_charge)
    .bind(txn.mobilization_fee)
    .bind(txn.tax)
    .bind(txn.deployee_revenue)
    .bind(txn.is_application)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Transaction #{} ({}) inserted as {}", txn.id, txn.external_id, txn.status);
    Ok(txn)
}

pub async fn transaction_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentTransaction>, LedgerError> {
    let txn = sqlx::query_as("SELECT * FROM payment_transactions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(txn)
}

pub async fn transaction_by_external_id(
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, LedgerError> {
    let txn = sqlx::query_as("SELECT * FROM payment_transactions WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(conn)
        .await?;
    Ok(txn)
}

async fn illegal_transition(id: i64, to: TransactionStatus, conn: &mut SqliteConnection) -> LedgerError {
    match transaction_by_id(id, conn).await {
        Ok(Some(txn)) => LedgerError::IllegalStatusTransition { id, from: txn.status, to },
        Ok(None) => LedgerError::NotFound(format!("Transaction #{id}")),
        Err(e) => e,
    }
}

pub async fn capture_transaction(
    id: i64,
    update: CaptureUpdate,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, LedgerError> {
    let txn: Option<PaymentTransaction> = sqlx::query_as(
        r#"
        UPDATE payment_transactions SET
            status = 'Pending',
            amount = $1,
            tax = $2,
            deployee_revenue = $3,
            description = $4,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $5 AND status = 'Uncaptured'
        RETURNING *
        "#,
    )
    .bind(update.amount)
    .bind(update.tax)
    .bind(update.deployee_revenue)
    .bind(update.description)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match txn {
        Some(txn) => {
            trace!("🗃️ Transaction #{id} captured for {}", txn.amount);
            Ok(txn)
        },
        None => Err(illegal_transition(id, TransactionStatus::Pending, conn).await),
    }
}

pub async fn update_status(
    id: i64,
    from: &[TransactionStatus],
    to: TransactionStatus,
    description: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, LedgerError> {
    let current = transaction_by_id(id, &mut *conn)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Transaction #{id}")))?;
    if !from.contains(&current.status) {
        return Err(LedgerError::IllegalStatusTransition { id, from: current.status, to });
    }
    let txn: Option<PaymentTransaction> = sqlx::query_as(
        r#"
        UPDATE payment_transactions SET
            status = $1,
            description = COALESCE($2, description),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND status = $4
        RETURNING *
        "#,
    )
    .bind(to)
    .bind(description)
    .bind(id)
    .bind(current.status)
    .fetch_optional(&mut *conn)
    .await?;
    match txn {
        Some(txn) => {
            debug!("🗃️ Transaction #{id} moved from {} to {to}", current.status);
            Ok(txn)
        },
        None => Err(illegal_transition(id, to, conn).await),
    }
}

pub async fn set_capturable_amount(
    id: i64,
    amount: MinorUnits,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, LedgerError> {
    let txn = sqlx::query_as(
        r#"
        UPDATE payment_transactions SET amount = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND status = 'Uncaptured'
        RETURNING *
        "#,
    )
    .bind(amount)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(txn)
}

pub async fn uncaptured_count_for_fingerprint(
    user_id: &str,
    fingerprint: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, LedgerError> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM payment_transactions
        WHERE sender = $1 AND fingerprint = $2 AND status = 'Uncaptured'
        "#,
    )
    .bind(user_id)
    .bind(fingerprint)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub async fn history_for_user(
    user_id: &str,
    page: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<HistoryEntry>, LedgerError> {
    let entries = sqlx::query_as(
        r#"
        SELECT *, (sender <> $1) AS inbound FROM payment_transactions
        WHERE sender = $1 OR (recipient = $1 AND status = 'Success')
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(i64::from(page.limit))
    .bind(page.offset())
    .fetch_all(conn)
    .await?;
    Ok(entries)
}
