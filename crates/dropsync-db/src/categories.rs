//! Database operations for `categories` and `category_mappings`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// A row from the `category_mappings` table.
///
/// At most one row exists per `(supplier_id, external_category)`; manual
/// rows carry `confidence = 1.0` and are never touched by automated
/// re-mapping.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryMappingRow {
    pub id: i64,
    pub supplier_id: String,
    pub external_category: String,
    pub internal_category_id: i64,
    pub confidence: Decimal,
    pub manually_mapped: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const MAPPING_COLUMNS: &str = "id, supplier_id, external_category, internal_category_id, \
                               confidence, manually_mapped, status, created_at, updated_at";

// ---------------------------------------------------------------------------
// categories operations
// ---------------------------------------------------------------------------

/// Inserts a category, returning the full row. Conflicting slugs return the
/// existing row unchanged.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_category(
    pool: &PgPool,
    name: &str,
    slug: &str,
    is_default: bool,
) -> Result<CategoryRow, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "INSERT INTO categories (name, slug, is_default) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (slug) DO UPDATE SET name = categories.name \
         RETURNING id, name, slug, is_default, created_at",
    )
    .bind(name)
    .bind(slug)
    .bind(is_default)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Lists all categories, default bucket first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, slug, is_default, created_at \
         FROM categories ORDER BY is_default DESC, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the default ("uncategorized") category.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when reference data has not been seeded.
pub async fn get_default_category(pool: &PgPool) -> Result<CategoryRow, DbError> {
    sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, slug, is_default, created_at FROM categories WHERE is_default LIMIT 1",
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

// ---------------------------------------------------------------------------
// category_mappings operations
// ---------------------------------------------------------------------------

/// Fetches the active mapping for a supplier category, if one exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_active_mapping(
    pool: &PgPool,
    supplier_id: &str,
    external_category: &str,
) -> Result<Option<CategoryMappingRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM category_mappings \
         WHERE supplier_id = $1 AND external_category = $2 AND status = 'active'",
    ))
    .bind(supplier_id)
    .bind(external_category)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches a mapping by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_mapping(pool: &PgPool, id: i64) -> Result<CategoryMappingRow, DbError> {
    sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM category_mappings WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Upserts an automated mapping.
///
/// The conflict clause carries `WHERE manually_mapped = FALSE`, so a manual
/// mapping is never overwritten: in that case the existing manual row is
/// fetched and returned instead.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails, or [`DbError::NotFound`]
/// if the row vanished between upsert and re-fetch.
pub async fn upsert_auto_mapping(
    pool: &PgPool,
    supplier_id: &str,
    external_category: &str,
    internal_category_id: i64,
    confidence: Decimal,
) -> Result<CategoryMappingRow, DbError> {
    let row = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "INSERT INTO category_mappings \
             (supplier_id, external_category, internal_category_id, confidence, \
              manually_mapped, status) \
         VALUES ($1, $2, $3, $4, FALSE, 'active') \
         ON CONFLICT (supplier_id, external_category) DO UPDATE SET \
             internal_category_id = EXCLUDED.internal_category_id, \
             confidence           = EXCLUDED.confidence, \
             updated_at           = NOW() \
         WHERE category_mappings.manually_mapped = FALSE \
         RETURNING {MAPPING_COLUMNS}",
    ))
    .bind(supplier_id)
    .bind(external_category)
    .bind(internal_category_id)
    .bind(confidence)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row),
        // Conflict with a manual mapping: the guarded update matched no row.
        None => get_active_mapping(pool, supplier_id, external_category)
            .await?
            .ok_or(DbError::NotFound),
    }
}

/// Upserts a manual mapping with confidence 1.0. Manual always wins.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn set_manual_mapping(
    pool: &PgPool,
    supplier_id: &str,
    external_category: &str,
    internal_category_id: i64,
) -> Result<CategoryMappingRow, DbError> {
    let row = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "INSERT INTO category_mappings \
             (supplier_id, external_category, internal_category_id, confidence, \
              manually_mapped, status) \
         VALUES ($1, $2, $3, 1.0, TRUE, 'active') \
         ON CONFLICT (supplier_id, external_category) DO UPDATE SET \
             internal_category_id = EXCLUDED.internal_category_id, \
             confidence           = 1.0, \
             manually_mapped      = TRUE, \
             status               = 'active', \
             updated_at           = NOW() \
         RETURNING {MAPPING_COLUMNS}",
    ))
    .bind(supplier_id)
    .bind(external_category)
    .bind(internal_category_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Flips an existing mapping to manual by id (the `PUT /categories/mappings`
/// correction path).
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn set_manual_mapping_by_id(
    pool: &PgPool,
    id: i64,
    internal_category_id: i64,
) -> Result<CategoryMappingRow, DbError> {
    sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "UPDATE category_mappings SET \
             internal_category_id = $2, \
             confidence           = 1.0, \
             manually_mapped      = TRUE, \
             status               = 'active', \
             updated_at           = NOW() \
         WHERE id = $1 \
         RETURNING {MAPPING_COLUMNS}",
    ))
    .bind(id)
    .bind(internal_category_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists mappings, most recently updated first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_mappings(pool: &PgPool, limit: i64) -> Result<Vec<CategoryMappingRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM category_mappings \
         ORDER BY updated_at DESC, id DESC LIMIT $1",
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists automated mappings whose confidence is below `threshold` — the
/// manual-review queue. Manual mappings never appear here.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_low_confidence_mappings(
    pool: &PgPool,
    threshold: Decimal,
    limit: i64,
) -> Result<Vec<CategoryMappingRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryMappingRow>(&format!(
        "SELECT {MAPPING_COLUMNS} FROM category_mappings \
         WHERE manually_mapped = FALSE AND confidence < $1 \
         ORDER BY confidence ASC, id LIMIT $2",
    ))
    .bind(threshold)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
