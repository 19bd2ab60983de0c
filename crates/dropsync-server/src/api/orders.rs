use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dropsync_db::{NewOrder, NewOrderItem};

use crate::middleware::RequestId;

use super::{map_db_error, map_engine_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct CreateOrderBody {
    pub user_ref: String,
    pub ship_name: Option<String>,
    pub ship_street: Option<String>,
    pub ship_city: Option<String>,
    pub ship_zip: Option<String>,
    pub ship_country: Option<String>,
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateOrderItem {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderItemData {
    id: i64,
    product_id: i64,
    variant_id: Option<i64>,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct MappingData {
    status: String,
    external_order_id: Option<String>,
    tracking_number: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderData {
    id: i64,
    order_id: Uuid,
    user_ref: String,
    status: String,
    ship_name: Option<String>,
    ship_street: Option<String>,
    ship_city: Option<String>,
    ship_zip: Option<String>,
    ship_country: Option<String>,
    created_at: DateTime<Utc>,
    items: Vec<OrderItemData>,
    supplier_order: Option<MappingData>,
}

fn to_order_data(
    row: dropsync_db::OrderRow,
    items: Vec<dropsync_db::OrderItemRow>,
    mapping: Option<dropsync_db::SupplierOrderMappingRow>,
) -> OrderData {
    OrderData {
        id: row.id,
        order_id: row.public_id,
        user_ref: row.user_ref,
        status: row.status,
        ship_name: row.ship_name,
        ship_street: row.ship_street,
        ship_city: row.ship_city,
        ship_zip: row.ship_zip,
        ship_country: row.ship_country,
        created_at: row.created_at,
        items: items
            .into_iter()
            .map(|i| OrderItemData {
                id: i.id,
                product_id: i.product_id,
                variant_id: i.variant_id,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect(),
        supplier_order: mapping.map(|m| MappingData {
            status: m.status,
            external_order_id: m.external_order_id,
            tracking_number: m.tracking_number,
            last_synced_at: m.last_synced_at,
        }),
    }
}

fn validate_order(body: &CreateOrderBody) -> Result<(), &'static str> {
    if body.user_ref.trim().is_empty() {
        return Err("user_ref is required");
    }
    if body.items.is_empty() {
        return Err("at least one order item is required");
    }
    if body.items.iter().any(|i| i.quantity <= 0) {
        return Err("item quantity must be positive");
    }
    if body.items.iter().any(|i| i.unit_price < Decimal::ZERO) {
        return Err("item unit_price must not be negative");
    }
    Ok(())
}

pub(super) async fn create_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateOrderBody>,
) -> Result<Json<ApiResponse<OrderData>>, ApiError> {
    if let Err(message) = validate_order(&body) {
        return Err(ApiError::new(req_id.0, "validation_error", message));
    }

    let order = NewOrder {
        user_ref: body.user_ref,
        ship_name: body.ship_name,
        ship_street: body.ship_street,
        ship_city: body.ship_city,
        ship_zip: body.ship_zip,
        ship_country: body.ship_country,
    };
    let items: Vec<NewOrderItem> = body
        .items
        .into_iter()
        .map(|i| NewOrderItem {
            product_id: i.product_id,
            variant_id: i.variant_id,
            quantity: i.quantity,
            unit_price: i.unit_price,
        })
        .collect();

    let row = dropsync_db::create_order(&state.pool, &order, &items)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let items = dropsync_db::list_order_items(&state.pool, row.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    // Placing an order fires the bridge immediately. The order itself is
    // already committed, so a bridge failure never fails the request: a
    // transient fault leaves the mapping pending for retry, an order with no
    // supplier-sourced lines simply has no mapping.
    let mapping = match dropsync_engine::ensure_supplier_order(
        &state.pool,
        &state.client,
        &state.locks,
        row.id,
    )
    .await
    {
        Ok(mapping) => Some(mapping),
        Err(e) => {
            tracing::warn!(order_id = row.id, error = %e, "order bridge deferred at creation");
            dropsync_db::get_mapping_by_order(&state.pool, row.id)
                .await
                .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        }
    };

    Ok(Json(ApiResponse {
        data: to_order_data(row, items, mapping),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<OrderData>>, ApiError> {
    let row = dropsync_db::get_order(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let items = dropsync_db::list_order_items(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let mapping = dropsync_db::get_mapping_by_order(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: to_order_data(row, items, mapping),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Places (or re-attempts) the supplier order for an order. Safe to call
/// repeatedly: once a supplier order exists the stored mapping is returned.
pub(super) async fn forward_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<MappingData>>, ApiError> {
    let mapping =
        dropsync_engine::ensure_supplier_order(&state.pool, &state.client, &state.locks, id)
            .await
            .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: MappingData {
            status: mapping.status,
            external_order_id: mapping.external_order_id,
            tracking_number: mapping.tracking_number,
            last_synced_at: mapping.last_synced_at,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct PollQuery {
    pub limit: Option<i64>,
}

pub(super) async fn poll_statuses(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PollQuery>,
) -> Result<Json<ApiResponse<dropsync_engine::StatusSyncReport>>, ApiError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let report = dropsync_engine::sync_order_statuses(&state.pool, &state.client, limit)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: report,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_body() -> CreateOrderBody {
        CreateOrderBody {
            user_ref: "user-42".to_string(),
            ship_name: Some("Jo Doe".to_string()),
            ship_street: Some("1 Main St".to_string()),
            ship_city: Some("Springfield".to_string()),
            ship_zip: Some("12345".to_string()),
            ship_country: Some("US".to_string()),
            items: vec![CreateOrderItem {
                product_id: 1,
                variant_id: None,
                quantity: 2,
                unit_price: Decimal::new(999, 2),
            }],
        }
    }

    #[test]
    fn validate_order_accepts_complete_body() {
        assert!(validate_order(&valid_body()).is_ok());
    }

    #[test]
    fn validate_order_rejects_empty_items() {
        let mut body = valid_body();
        body.items.clear();
        assert!(validate_order(&body).is_err());
    }

    #[test]
    fn validate_order_rejects_non_positive_quantity() {
        let mut body = valid_body();
        body.items[0].quantity = 0;
        assert!(validate_order(&body).is_err());
    }

    #[test]
    fn validate_order_rejects_blank_user_ref() {
        let mut body = valid_body();
        body.user_ref = "  ".to_string();
        assert!(validate_order(&body).is_err());
    }
}
