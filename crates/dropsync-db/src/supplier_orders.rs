//! Database operations for `supplier_order_mappings`.
//!
//! The `order_id` UNIQUE constraint is the idempotence barrier for order
//! forwarding: exactly one mapping row ever exists per order, no matter how
//! many times the forward operation is retried concurrently.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `supplier_order_mappings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SupplierOrderMappingRow {
    pub id: i64,
    pub order_id: i64,
    pub supplier_id: String,
    pub external_order_id: Option<String>,
    pub status: String,
    pub tracking_number: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const MAPPING_COLUMNS: &str = "id, order_id, supplier_id, external_order_id, status, \
                               tracking_number, last_synced_at, created_at, updated_at";

/// Inserts a pending mapping for an order unless one already exists. Returns
/// `(row, inserted)` — on conflict the existing row is fetched and returned
/// with `inserted = false`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, or [`DbError::NotFound`] if
/// the conflicting row vanished before the re-fetch.
pub async fn insert_mapping_if_absent(
    pool: &PgPool,
    order_id: i64,
    supplier_id: &str,
) -> Result<(SupplierOrderMappingRow, bool), DbError> {
    let row = sqlx::query_as::<_, SupplierOrderMappingRow>(&format!(
        "INSERT INTO supplier_order_mappings (order_id, supplier_id, status) \
         VALUES ($1, $2, 'pending') \
         ON CONFLICT (order_id) DO NOTHING \
         RETURNING {MAPPING_COLUMNS}",
    ))
    .bind(order_id)
    .bind(supplier_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok((row, true)),
        None => {
            let existing = get_mapping_by_order(pool, order_id)
                .await?
                .ok_or(DbError::NotFound)?;
            Ok((existing, false))
        }
    }
}

/// Fetches the mapping for an order, if one exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_mapping_by_order(
    pool: &PgPool,
    order_id: i64,
) -> Result<Option<SupplierOrderMappingRow>, DbError> {
    let row = sqlx::query_as::<_, SupplierOrderMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM supplier_order_mappings WHERE order_id = $1",
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches the mapping for a supplier-side order id. Used by order webhooks,
/// which identify the order by the supplier's id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_mapping_by_external(
    pool: &PgPool,
    supplier_id: &str,
    external_order_id: &str,
) -> Result<Option<SupplierOrderMappingRow>, DbError> {
    let row = sqlx::query_as::<_, SupplierOrderMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM supplier_order_mappings \
         WHERE supplier_id = $1 AND external_order_id = $2",
    ))
    .bind(supplier_id)
    .bind(external_order_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Records the supplier's order id and advances `pending -> created`. Guarded
/// on the current status so a stale retry cannot regress a shipped order.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the mapping is missing or no longer
/// pending.
pub async fn set_mapping_created(
    pool: &PgPool,
    mapping_id: i64,
    external_order_id: &str,
) -> Result<SupplierOrderMappingRow, DbError> {
    sqlx::query_as::<_, SupplierOrderMappingRow>(&format!(
        "UPDATE supplier_order_mappings SET \
             external_order_id = $2, status = 'created', \
             last_synced_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {MAPPING_COLUMNS}",
    ))
    .bind(mapping_id)
    .bind(external_order_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Marks a pending mapping as permanently failed.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the mapping is missing or no longer
/// pending.
pub async fn set_mapping_failed(
    pool: &PgPool,
    mapping_id: i64,
) -> Result<SupplierOrderMappingRow, DbError> {
    sqlx::query_as::<_, SupplierOrderMappingRow>(&format!(
        "UPDATE supplier_order_mappings SET status = 'failed', updated_at = NOW() \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {MAPPING_COLUMNS}",
    ))
    .bind(mapping_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Writes a new status and optional tracking number. The caller is expected
/// to have validated the transition as forward-only; the `expected_status`
/// guard makes the write race-safe on top of that.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the mapping is missing or its status
/// changed underneath the caller.
pub async fn update_mapping_status(
    pool: &PgPool,
    mapping_id: i64,
    expected_status: &str,
    new_status: &str,
    tracking_number: Option<&str>,
) -> Result<SupplierOrderMappingRow, DbError> {
    sqlx::query_as::<_, SupplierOrderMappingRow>(&format!(
        "UPDATE supplier_order_mappings SET \
             status = $3, \
             tracking_number = COALESCE($4, tracking_number), \
             last_synced_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = $2 \
         RETURNING {MAPPING_COLUMNS}",
    ))
    .bind(mapping_id)
    .bind(expected_status)
    .bind(new_status)
    .bind(tracking_number)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists mappings in a non-terminal supplier-side state, oldest sync first.
/// These are the rows the status poller refreshes.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pollable_mappings(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<SupplierOrderMappingRow>, DbError> {
    let rows = sqlx::query_as::<_, SupplierOrderMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM supplier_order_mappings \
         WHERE status IN ('created', 'shipped') AND external_order_id IS NOT NULL \
         ORDER BY last_synced_at ASC NULLS FIRST LIMIT $1",
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
