use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{JobPayment, MinorUnits, NewJobPayment},
    traits::LedgerError,
};

/// A job that is re-authorized keeps one metadata row. It is re-pointed at the newest transaction.
pub async fn upsert_job_payment(
    transaction_id: i64,
    job: NewJobPayment,
    conn: &mut SqliteConnection,
) -> Result<JobPayment, LedgerError> {
    let job: JobPayment = sqlx::query_as(
        r#"
        INSERT INTO job_payments (transaction_id, job_id, amount, tax, deployer_charge, application_fee, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (job_id) DO UPDATE SET
            transaction_id = excluded.transaction_id,
            amount = excluded.amount,
            tax = excluded.tax,
            deployer_charge = excluded.deployer_charge,
            application_fee = excluded.application_fee,
            description = excluded.description,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(job.job_id)
    .bind(job.amount)
    .bind(job.tax)
    .bind(job.deployer_charge)
    .bind(job.application_fee)
    .bind(job.description)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Job {} now points at transaction #{transaction_id}", job.job_id);
    Ok(job)
}

pub async fn job_payment_by_job_id(job_id: &str, conn: &mut SqliteConnection) -> Result<Option<JobPayment>, LedgerError> {
    let job =
        sqlx::query_as("SELECT * FROM job_payments WHERE job_id = $1").bind(job_id).fetch_optional(conn).await?;
    Ok(job)
}

pub async fn job_payment_for_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<JobPayment>, LedgerError> {
    let job = sqlx::query_as("SELECT * FROM job_payments WHERE transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await?;
    Ok(job)
}

pub async fn update_fees(
    id: i64,
    tax: MinorUnits,
    application_fee: MinorUnits,
    conn: &mut SqliteConnection,
) -> Result<JobPayment, LedgerError> {
    let job = sqlx::query_as(
        r#"
        UPDATE job_payments SET tax = $1, application_fee = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(tax)
    .bind(application_fee)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    job.ok_or_else(|| LedgerError::NotFound(format!("Job payment #{id}")))
}
