use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Invoice, InvoiceDocument},
    traits::{LedgerError, Pagination},
};

/// Writes every field of the invoice. A regenerated invoice replaces the old one in full.
pub async fn upsert_invoice(
    transaction_id: i64,
    doc: &InvoiceDocument,
    document_url: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Invoice, LedgerError> {
    let invoice: Invoice = sqlx::query_as(
        r#"
        INSERT INTO invoices (
            transaction_id, user_id, reference, job_status, description, job_title, location, deployee,
            tax, amount, fees, total, payment_method, document_url
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (transaction_id) DO UPDATE SET
            user_id = excluded.user_id,
            reference = excluded.reference,
            job_status = excluded.job_status,
            description = excluded.description,
            job_title = excluded.job_title,
            location = excluded.location,
            deployee = excluded.deployee,
            tax = excluded.tax,
            amount = excluded.amount,
            fees = excluded.fees,
            total = excluded.total,
            payment_method = excluded.payment_method,
            document_url = excluded.document_url,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(&doc.user_id)
    .bind(&doc.reference)
    .bind(doc.job_status)
    .bind(&doc.description)
    .bind(&doc.job_title)
    .bind(&doc.location)
    .bind(&doc.deployee)
    .bind(doc.tax)
    .bind(doc.amount)
    .bind(doc.fees)
    .bind(doc.total)
    .bind(&doc.payment_method)
    .bind(document_url)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Invoice {} written for transaction #{transaction_id}", invoice.reference);
    Ok(invoice)
}

pub async fn invoice_for_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, LedgerError> {
    let invoice = sqlx::query_as("SELECT * FROM invoices WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(invoice)
}

pub async fn delete_invoice(transaction_id: i64, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result =
        sqlx::query("DELETE FROM invoices WHERE transaction_id = $1").bind(transaction_id).execute(conn).await?;
    Ok(result.rows_affected())
}

pub async fn invoices_for_user(
    user_id: &str,
    page: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<Invoice>, LedgerError> {
    let invoices = sqlx::query_as(
        "SELECT * FROM invoices WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(i64::from(page.limit))
    .bind(page.offset())
    .fetch_all(conn)
    .await?;
    Ok(invoices)
}
