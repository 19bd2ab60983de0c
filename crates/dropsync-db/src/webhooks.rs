//! Database operations for `webhook_events`.
//!
//! Deduplication is enforced by the `(supplier_id, message_id)` UNIQUE
//! constraint: [`insert_event_if_new`] is the single entry point, and a
//! duplicate delivery never produces a second row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `webhook_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookEventRow {
    pub id: i64,
    pub supplier_id: String,
    pub event_type: String,
    pub message_id: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

const EVENT_COLUMNS: &str = "id, supplier_id, event_type, message_id, payload, processed, \
                             error, received_at, processed_at";

/// Records an incoming delivery. Returns `None` when the `(supplier_id,
/// message_id)` pair was already seen.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_event_if_new(
    pool: &PgPool,
    supplier_id: &str,
    event_type: &str,
    message_id: &str,
    payload: &serde_json::Value,
) -> Result<Option<WebhookEventRow>, DbError> {
    let row = sqlx::query_as::<_, WebhookEventRow>(&format!(
        "INSERT INTO webhook_events (supplier_id, event_type, message_id, payload) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (supplier_id, message_id) DO NOTHING \
         RETURNING {EVENT_COLUMNS}",
    ))
    .bind(supplier_id)
    .bind(event_type)
    .bind(message_id)
    .bind(payload)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches an event by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_webhook_event(pool: &PgPool, id: i64) -> Result<WebhookEventRow, DbError> {
    sqlx::query_as::<_, WebhookEventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Marks an event as processed and clears any prior error.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn mark_event_processed(pool: &PgPool, id: i64) -> Result<WebhookEventRow, DbError> {
    sqlx::query_as::<_, WebhookEventRow>(&format!(
        "UPDATE webhook_events SET processed = TRUE, error = NULL, processed_at = NOW() \
         WHERE id = $1 RETURNING {EVENT_COLUMNS}",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Records a processing failure. The row stays unprocessed so it can be
/// replayed later.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn mark_event_failed(
    pool: &PgPool,
    id: i64,
    error: &str,
) -> Result<WebhookEventRow, DbError> {
    sqlx::query_as::<_, WebhookEventRow>(&format!(
        "UPDATE webhook_events SET processed = FALSE, error = $2 \
         WHERE id = $1 RETURNING {EVENT_COLUMNS}",
    ))
    .bind(id)
    .bind(error)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists events that failed processing, oldest first, for replay.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_failed_events(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<WebhookEventRow>, DbError> {
    let rows = sqlx::query_as::<_, WebhookEventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM webhook_events \
         WHERE NOT processed AND error IS NOT NULL \
         ORDER BY received_at ASC, id ASC LIMIT $1",
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
