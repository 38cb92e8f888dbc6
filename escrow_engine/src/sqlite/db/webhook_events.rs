use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::WebhookEventLog, traits::LedgerError};

/// Claims the event in a single statement. Exactly one delivery of any `(event_type, event_id)` pair sees
/// `deliveries == 1`, however many arrive concurrently.
pub async fn claim_event(
    event_type: &str,
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<WebhookEventLog, LedgerError> {
    let entry: WebhookEventLog = sqlx::query_as(
        r#"
        INSERT INTO webhook_events (event_type, event_id) VALUES ($1, $2)
        ON CONFLICT (event_type, event_id) DO UPDATE SET
            deliveries = deliveries + 1,
            last_seen_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(event_type)
    .bind(event_id)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Event {event_type}/{event_id} delivery #{}", entry.deliveries);
    Ok(entry)
}

pub async fn release_event(event_type: &str, event_id: &str, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query("DELETE FROM webhook_events WHERE event_type = $1 AND event_id = $2")
        .bind(event_type)
        .bind(event_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_event(
    event_type: &str,
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEventLog>, LedgerError> {
    let entry = sqlx::query_as("SELECT * FROM webhook_events WHERE event_type = $1 AND event_id = $2")
        .bind(event_type)
        .bind(event_id)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}
