use axum::{
    extract::{Path, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, map_engine_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct VariantItem {
    id: i64,
    external_variant_id: Option<String>,
    sku: Option<String>,
    price: Option<Decimal>,
    stock: i32,
    is_active: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductDetail {
    id: i64,
    product_id: Uuid,
    supplier_id: Option<String>,
    external_product_id: Option<String>,
    name: String,
    description: Option<String>,
    price: Option<Decimal>,
    currency: String,
    images: Vec<String>,
    category_id: Option<i64>,
    status: String,
    needs_review: bool,
    edited_fields: Vec<String>,
    variants: Vec<VariantItem>,
}

fn to_detail(row: dropsync_db::ProductRow, variants: Vec<dropsync_db::VariantRow>) -> ProductDetail {
    ProductDetail {
        id: row.id,
        product_id: row.public_id,
        supplier_id: row.supplier_id,
        external_product_id: row.external_product_id,
        name: row.name,
        description: row.description,
        price: row.price,
        currency: row.currency,
        images: row.images,
        category_id: row.category_id,
        status: row.status,
        needs_review: row.needs_review,
        edited_fields: row.edited_fields,
        variants: variants
            .into_iter()
            .map(|v| VariantItem {
                id: v.id,
                external_variant_id: v.external_variant_id,
                sku: v.sku,
                price: v.price,
                stock: v.stock,
                is_active: v.is_active,
            })
            .collect(),
    }
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let row = dropsync_db::get_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let variants = dropsync_db::list_variants(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: to_detail(row, variants),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct SetCategoryBody {
    pub category_id: i64,
}

/// Operator category correction. The assignment is pinned against future
/// syncs and recorded as a manual mapping for the product's supplier path.
pub(super) async fn set_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<SetCategoryBody>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let row = dropsync_engine::correct_product(&state.pool, id, body.category_id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    let variants = dropsync_db::list_variants(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: to_detail(row, variants),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn publish(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let row = dropsync_engine::publish_product(&state.pool, id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    let variants = dropsync_db::list_variants(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: to_detail(row, variants),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_detail_is_serializable() {
        let detail = ProductDetail {
            id: 1,
            product_id: Uuid::new_v4(),
            supplier_id: Some("cj".to_string()),
            external_product_id: Some("P1".to_string()),
            name: "Leather Wallet".to_string(),
            description: None,
            price: Some(Decimal::new(1250, 2)),
            currency: "USD".to_string(),
            images: vec![],
            category_id: Some(4),
            status: "draft".to_string(),
            needs_review: false,
            edited_fields: vec!["name".to_string()],
            variants: vec![VariantItem {
                id: 10,
                external_variant_id: Some("V1".to_string()),
                sku: None,
                price: Some(Decimal::new(1250, 2)),
                stock: 3,
                is_active: true,
            }],
        };
        let json = serde_json::to_string(&detail).expect("serialize product detail");
        assert!(json.contains("\"status\":\"draft\""));
        assert!(json.contains("\"edited_fields\":[\"name\"]"));
    }
}
