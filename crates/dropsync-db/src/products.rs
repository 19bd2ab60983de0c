//! Database operations for `products` and `product_variants`.
//!
//! Supplier sync writes through [`upsert_supplier_product`], which preserves
//! any field an operator has edited by hand (`edited_fields`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub public_id: Uuid,
    pub supplier_id: Option<String>,
    pub external_product_id: Option<String>,
    pub external_category: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub currency: String,
    pub images: Vec<String>,
    pub category_id: Option<i64>,
    pub status: String,
    pub needs_review: bool,
    pub edited_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `product_variants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantRow {
    pub id: i64,
    pub product_id: i64,
    pub external_variant_id: Option<String>,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`upsert_supplier_product`].
#[derive(Debug, Clone)]
pub struct NewSupplierProduct {
    pub supplier_id: String,
    pub external_product_id: String,
    pub external_category: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub images: Vec<String>,
    pub category_id: Option<i64>,
    pub needs_review: bool,
}

/// Input for [`upsert_variant`].
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub external_variant_id: String,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub stock: i32,
}

const PRODUCT_COLUMNS: &str =
    "id, public_id, supplier_id, external_product_id, external_category, name, description, \
     price, currency, images, category_id, status, needs_review, edited_fields, created_at, \
     updated_at";

const VARIANT_COLUMNS: &str =
    "id, product_id, external_variant_id, sku, price, stock, is_active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UpsertedProduct {
    #[sqlx(flatten)]
    row: ProductRow,
    inserted: bool,
}

// ---------------------------------------------------------------------------
// products operations
// ---------------------------------------------------------------------------

/// Fetches a product by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_product(pool: &PgPool, id: i64) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches a product by its supplier identity, if imported.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_external(
    pool: &PgPool,
    supplier_id: &str,
    external_product_id: &str,
) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE supplier_id = $1 AND external_product_id = $2",
    ))
    .bind(supplier_id)
    .bind(external_product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Upserts a supplier product keyed on `(supplier_id, external_product_id)`.
///
/// Any column named in `edited_fields` keeps its stored value on update;
/// editing `category` also pins `needs_review` and `category_id`. Status is
/// never touched on update, so published products stay published.
///
/// Returns the row and whether it was freshly inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_supplier_product(
    pool: &PgPool,
    new: &NewSupplierProduct,
) -> Result<(ProductRow, bool), DbError> {
    let upserted = sqlx::query_as::<_, UpsertedProduct>(&format!(
        "INSERT INTO products \
             (public_id, supplier_id, external_product_id, external_category, name, \
              description, price, images, category_id, needs_review) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (supplier_id, external_product_id) DO UPDATE SET \
             external_category = EXCLUDED.external_category, \
             name = CASE WHEN 'name' = ANY(products.edited_fields) \
                         THEN products.name ELSE EXCLUDED.name END, \
             description = CASE WHEN 'description' = ANY(products.edited_fields) \
                                THEN products.description ELSE EXCLUDED.description END, \
             price = CASE WHEN 'price' = ANY(products.edited_fields) \
                          THEN products.price ELSE EXCLUDED.price END, \
             images = CASE WHEN 'images' = ANY(products.edited_fields) \
                           THEN products.images ELSE EXCLUDED.images END, \
             category_id = CASE WHEN 'category' = ANY(products.edited_fields) \
                                THEN products.category_id ELSE EXCLUDED.category_id END, \
             needs_review = CASE WHEN 'category' = ANY(products.edited_fields) \
                                 THEN products.needs_review ELSE EXCLUDED.needs_review END, \
             updated_at = NOW() \
         RETURNING {PRODUCT_COLUMNS}, (xmax = 0) AS inserted",
    ))
    .bind(Uuid::new_v4())
    .bind(&new.supplier_id)
    .bind(&new.external_product_id)
    .bind(new.external_category.as_deref())
    .bind(&new.name)
    .bind(new.description.as_deref())
    .bind(new.price)
    .bind(&new.images)
    .bind(new.category_id)
    .bind(new.needs_review)
    .fetch_one(pool)
    .await?;

    Ok((upserted.row, upserted.inserted))
}

/// Assigns a product to a category and clears its review flag.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `product_id`.
pub async fn set_product_category(
    pool: &PgPool,
    product_id: i64,
    category_id: i64,
) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products SET category_id = $2, needs_review = FALSE, updated_at = NOW() \
         WHERE id = $1 RETURNING {PRODUCT_COLUMNS}",
    ))
    .bind(product_id)
    .bind(category_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Records that an operator has hand-edited `field`, so future syncs leave it
/// alone. Appending twice is a no-op.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `product_id`.
pub async fn mark_field_edited(
    pool: &PgPool,
    product_id: i64,
    field: &str,
) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products SET \
             edited_fields = CASE WHEN $2 = ANY(edited_fields) \
                                  THEN edited_fields \
                                  ELSE array_append(edited_fields, $2) END, \
             updated_at = NOW() \
         WHERE id = $1 RETURNING {PRODUCT_COLUMNS}",
    ))
    .bind(product_id)
    .bind(field)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Sets a product's lifecycle status (`draft` or `active`).
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `product_id`.
pub async fn set_product_status(
    pool: &PgPool,
    product_id: i64,
    status: &str,
) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products SET status = $2, updated_at = NOW() \
         WHERE id = $1 RETURNING {PRODUCT_COLUMNS}",
    ))
    .bind(product_id)
    .bind(status)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists supplier products eligible for automated re-categorization: those
/// with a known supplier category whose category the operator has not pinned.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recategorizable_products(
    pool: &PgPool,
    supplier_id: &str,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE supplier_id = $1 \
           AND external_category IS NOT NULL \
           AND NOT ('category' = ANY(edited_fields)) \
         ORDER BY id",
    ))
    .bind(supplier_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// product_variants operations
// ---------------------------------------------------------------------------

/// Lists a product's variants in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_variants(pool: &PgPool, product_id: i64) -> Result<Vec<VariantRow>, DbError> {
    let rows = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE product_id = $1 ORDER BY id",
    ))
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Upserts a variant keyed on `(product_id, external_variant_id)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_variant(
    pool: &PgPool,
    product_id: i64,
    new: &NewVariant,
) -> Result<VariantRow, DbError> {
    let row = sqlx::query_as::<_, VariantRow>(&format!(
        "INSERT INTO product_variants (product_id, external_variant_id, sku, price, stock) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (product_id, external_variant_id) DO UPDATE SET \
             sku        = EXCLUDED.sku, \
             price      = EXCLUDED.price, \
             stock      = EXCLUDED.stock, \
             is_active  = TRUE, \
             updated_at = NOW() \
         RETURNING {VARIANT_COLUMNS}",
    ))
    .bind(product_id)
    .bind(&new.external_variant_id)
    .bind(new.sku.as_deref())
    .bind(new.price)
    .bind(new.stock)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Looks up a variant by supplier variant id within one supplier's catalog.
/// Used by stock webhooks, which carry only the supplier's `vid`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_variant_by_external_id(
    pool: &PgPool,
    supplier_id: &str,
    external_variant_id: &str,
) -> Result<Option<VariantRow>, DbError> {
    let row = sqlx::query_as::<_, VariantRow>(
        "SELECT v.id, v.product_id, v.external_variant_id, v.sku, v.price, v.stock, \
                v.is_active, v.created_at, v.updated_at \
         FROM product_variants v \
         JOIN products p ON p.id = v.product_id \
         WHERE p.supplier_id = $1 AND v.external_variant_id = $2",
    )
    .bind(supplier_id)
    .bind(external_variant_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the first active variant of a product, used as the fallback line
/// when an order item carries no variant.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_default_external_variant(
    pool: &PgPool,
    product_id: i64,
) -> Result<Option<VariantRow>, DbError> {
    let row = sqlx::query_as::<_, VariantRow>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants \
         WHERE product_id = $1 AND is_active AND external_variant_id IS NOT NULL \
         ORDER BY id LIMIT 1",
    ))
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Overwrites a variant's stock level.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `variant_id`.
pub async fn update_variant_stock(
    pool: &PgPool,
    variant_id: i64,
    stock: i32,
) -> Result<VariantRow, DbError> {
    sqlx::query_as::<_, VariantRow>(&format!(
        "UPDATE product_variants SET stock = $2, updated_at = NOW() \
         WHERE id = $1 RETURNING {VARIANT_COLUMNS}",
    ))
    .bind(variant_id)
    .bind(stock)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
