//! Database operations for `sync_runs`.
//!
//! A run moves `queued -> running -> succeeded | failed`. Transitions are
//! guarded on the current status; a guard that matches no row surfaces as
//! [`DbError::InvalidSyncRunTransition`] rather than silently rewriting
//! history.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `sync_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub supplier_id: String,
    pub trigger_source: String,
    pub status: String,
    pub added: i32,
    pub updated: i32,
    pub skipped: i32,
    pub errors: serde_json::Value,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, public_id, supplier_id, trigger_source, status, added, updated, \
                           skipped, errors, started_at, completed_at, created_at";

/// Creates a queued run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_sync_run(
    pool: &PgPool,
    supplier_id: &str,
    trigger_source: &str,
) -> Result<SyncRunRow, DbError> {
    let row = sqlx::query_as::<_, SyncRunRow>(&format!(
        "INSERT INTO sync_runs (public_id, supplier_id, trigger_source) \
         VALUES ($1, $2, $3) RETURNING {RUN_COLUMNS}",
    ))
    .bind(Uuid::new_v4())
    .bind(supplier_id)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Advances `queued -> running` and stamps `started_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not queued.
pub async fn start_sync_run(pool: &PgPool, id: i64) -> Result<SyncRunRow, DbError> {
    sqlx::query_as::<_, SyncRunRow>(&format!(
        "UPDATE sync_runs SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued' RETURNING {RUN_COLUMNS}",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::InvalidSyncRunTransition {
        id,
        expected_status: "queued",
    })
}

/// Advances `running -> succeeded` with final counters and per-item errors.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not running.
pub async fn complete_sync_run(
    pool: &PgPool,
    id: i64,
    added: i32,
    updated: i32,
    skipped: i32,
    errors: &serde_json::Value,
) -> Result<SyncRunRow, DbError> {
    sqlx::query_as::<_, SyncRunRow>(&format!(
        "UPDATE sync_runs SET \
             status = 'succeeded', added = $2, updated = $3, skipped = $4, \
             errors = $5, completed_at = NOW() \
         WHERE id = $1 AND status = 'running' RETURNING {RUN_COLUMNS}",
    ))
    .bind(id)
    .bind(added)
    .bind(updated)
    .bind(skipped)
    .bind(errors)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::InvalidSyncRunTransition {
        id,
        expected_status: "running",
    })
}

/// Marks a queued or running run as failed, recording the fatal error.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run already finished.
pub async fn fail_sync_run(pool: &PgPool, id: i64, error: &str) -> Result<SyncRunRow, DbError> {
    sqlx::query_as::<_, SyncRunRow>(&format!(
        "UPDATE sync_runs SET \
             status = 'failed', \
             errors = errors || jsonb_build_array($2::text), \
             completed_at = NOW() \
         WHERE id = $1 AND status IN ('queued', 'running') RETURNING {RUN_COLUMNS}",
    ))
    .bind(id)
    .bind(error)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::InvalidSyncRunTransition {
        id,
        expected_status: "queued or running",
    })
}

/// Fetches a run by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_sync_run(pool: &PgPool, id: i64) -> Result<SyncRunRow, DbError> {
    sqlx::query_as::<_, SyncRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM sync_runs WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists recent runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_runs(pool: &PgPool, limit: i64) -> Result<Vec<SyncRunRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM sync_runs ORDER BY created_at DESC, id DESC LIMIT $1",
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
