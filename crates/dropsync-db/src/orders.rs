//! Database operations for `orders` and `order_items`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `orders` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub public_id: Uuid,
    pub user_ref: String,
    pub status: String,
    pub ship_name: Option<String>,
    pub ship_street: Option<String>,
    pub ship_city: Option<String>,
    pub ship_zip: Option<String>,
    pub ship_country: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `order_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// One order line joined with the supplier identities needed to forward the
/// order: the product's and variant's external ids.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderLineDetail {
    pub item_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    pub supplier_id: Option<String>,
    pub external_product_id: Option<String>,
    pub external_variant_id: Option<String>,
    pub variant_is_active: Option<bool>,
}

/// Input for [`create_order`].
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_ref: String,
    pub ship_name: Option<String>,
    pub ship_street: Option<String>,
    pub ship_city: Option<String>,
    pub ship_zip: Option<String>,
    pub ship_country: Option<String>,
}

/// Input line for [`create_order`].
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

const ORDER_COLUMNS: &str = "id, public_id, user_ref, status, ship_name, ship_street, \
                             ship_city, ship_zip, ship_country, created_at";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Inserts an order and its items in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; nothing is written in that
/// case.
pub async fn create_order(
    pool: &PgPool,
    order: &NewOrder,
    items: &[NewOrderItem],
) -> Result<OrderRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "INSERT INTO orders (public_id, user_ref, ship_name, ship_street, ship_city, \
                             ship_zip, ship_country) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {ORDER_COLUMNS}",
    ))
    .bind(Uuid::new_v4())
    .bind(&order.user_ref)
    .bind(order.ship_name.as_deref())
    .bind(order.ship_street.as_deref())
    .bind(order.ship_city.as_deref())
    .bind(order.ship_zip.as_deref())
    .bind(order.ship_country.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    for item in items {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, variant_id, quantity, unit_price) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(row.id)
        .bind(item.product_id)
        .bind(item.variant_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Fetches an order by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_order(pool: &PgPool, id: i64) -> Result<OrderRow, DbError> {
    sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Fetches an order by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `public_id`.
pub async fn get_order_by_public_id(pool: &PgPool, public_id: Uuid) -> Result<OrderRow, DbError> {
    sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE public_id = $1",
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists an order's items.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_order_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItemRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
        "SELECT id, order_id, product_id, variant_id, quantity, unit_price \
         FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists an order's lines joined with the external identities needed to build
/// a supplier order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_order_lines(pool: &PgPool, order_id: i64) -> Result<Vec<OrderLineDetail>, DbError> {
    let rows = sqlx::query_as::<_, OrderLineDetail>(
        "SELECT i.id AS item_id, i.product_id, i.variant_id, i.quantity, \
                p.supplier_id, p.external_product_id, \
                v.external_variant_id, v.is_active AS variant_is_active \
         FROM order_items i \
         JOIN products p ON p.id = i.product_id \
         LEFT JOIN product_variants v ON v.id = i.variant_id \
         WHERE i.order_id = $1 ORDER BY i.id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
