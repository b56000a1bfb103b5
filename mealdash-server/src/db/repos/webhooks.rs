//! Inbound webhook dedup

use sqlx::PgConnection;

use crate::db::DbError;

/// Remember a provider event id. Returns `false` if it was seen before.
pub async fn record_event(conn: &mut PgConnection, source: &str, event_id: &str) -> Result<bool, DbError> {
    let inserted = sqlx::query(
        "INSERT INTO webhook_events (id, source) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
    )
    .bind(event_id)
    .bind(source)
    .execute(conn)
    .await?;
    Ok(inserted.rows_affected() == 1)
}
