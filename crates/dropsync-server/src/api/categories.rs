use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    map_db_error, map_engine_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta,
};

#[derive(Debug, Serialize)]
pub(super) struct CategoryItem {
    id: i64,
    name: String,
    slug: String,
    is_default: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateCategoryBody {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct MappingsQuery {
    pub limit: Option<i64>,
    /// With `below` set, only automated mappings under this confidence are
    /// returned — the manual-review queue.
    pub below: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(super) struct MappingItem {
    id: i64,
    supplier_id: String,
    external_category: String,
    internal_category_id: i64,
    confidence: Decimal,
    manually_mapped: bool,
    updated_at: DateTime<Utc>,
}

impl From<dropsync_db::CategoryMappingRow> for MappingItem {
    fn from(row: dropsync_db::CategoryMappingRow) -> Self {
        Self {
            id: row.id,
            supplier_id: row.supplier_id,
            external_category: row.external_category,
            internal_category_id: row.internal_category_id,
            confidence: row.confidence,
            manually_mapped: row.manually_mapped,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateMappingBody {
    pub supplier_id: String,
    pub external_category: String,
    pub category_id: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct CorrectMappingBody {
    pub category_id: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct CorrectedMappingData {
    mapping: MappingItem,
    products_moved: u32,
}

pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<CategoryItem>>>, ApiError> {
    let rows = dropsync_db::list_categories(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| CategoryItem {
            id: row.id,
            name: row.name,
            slug: row.slug,
            is_default: row.is_default,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn create_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateCategoryBody>,
) -> Result<Json<ApiResponse<CategoryItem>>, ApiError> {
    if body.name.trim().is_empty() || body.slug.trim().is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "name and slug are required",
        ));
    }

    let row = dropsync_db::create_category(&state.pool, &body.name, &body.slug, false)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: CategoryItem {
            id: row.id,
            name: row.name,
            slug: row.slug,
            is_default: row.is_default,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_mappings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<MappingsQuery>,
) -> Result<Json<ApiResponse<Vec<MappingItem>>>, ApiError> {
    let limit = normalize_limit(query.limit);
    let rows = match query.below {
        Some(threshold) => {
            let threshold = Decimal::from_f64_retain(threshold)
                .ok_or_else(|| {
                    ApiError::new(req_id.0.clone(), "validation_error", "invalid threshold")
                })?
                .round_dp(3);
            dropsync_db::list_low_confidence_mappings(&state.pool, threshold, limit).await
        }
        None => dropsync_db::list_mappings(&state.pool, limit).await,
    }
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(MappingItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Pre-declares a manual mapping for a supplier category path, so the next
/// sync lands matching products directly on the chosen category.
pub(super) async fn create_mapping(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateMappingBody>,
) -> Result<Json<ApiResponse<MappingItem>>, ApiError> {
    if body.supplier_id.trim().is_empty() || body.external_category.trim().is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "supplier_id and external_category are required",
        ));
    }

    let row = dropsync_db::set_manual_mapping(
        &state.pool,
        &body.supplier_id,
        &body.external_category,
        body.category_id,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: MappingItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Operator correction: pin the mapping to a category and pull every product
/// that still follows it automatically onto the new category.
pub(super) async fn correct_mapping(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<CorrectMappingBody>,
) -> Result<Json<ApiResponse<CorrectedMappingData>>, ApiError> {
    let (mapping, products_moved) =
        dropsync_engine::correct_mapping(&state.pool, id, body.category_id)
            .await
            .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: CorrectedMappingData {
            mapping: MappingItem::from(mapping),
            products_moved,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn recategorize(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(supplier_id): Path<String>,
) -> Result<Json<ApiResponse<dropsync_engine::RecategorizeReport>>, ApiError> {
    let report = dropsync_engine::recategorize_all(
        &state.pool,
        &supplier_id,
        state.config.review_threshold,
    )
    .await
    .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: report,
        meta: ResponseMeta::new(req_id.0),
    }))
}
