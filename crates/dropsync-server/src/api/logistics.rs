use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

use dropsync_core::logistics::{estimate_cost, options_for, LogisticsOption, Quote};

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct OptionsQuery {
    pub country: String,
    #[serde(default)]
    pub sensitive: bool,
}

pub(super) async fn list_options(
    State(_state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<OptionsQuery>,
) -> Result<Json<ApiResponse<Vec<&'static LogisticsOption>>>, ApiError> {
    if query.country.trim().is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "country is required",
        ));
    }

    Ok(Json(ApiResponse {
        data: options_for(&query.country, query.sensitive),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct QuoteQuery {
    pub logistics_id: i64,
    pub weight_grams: u32,
    pub country: String,
}

pub(super) async fn quote(
    State(_state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<ApiResponse<Quote>>, ApiError> {
    let quote = estimate_cost(query.logistics_id, query.weight_grams, &query.country)
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    Ok(Json(ApiResponse {
        data: quote,
        meta: ResponseMeta::new(req_id.0),
    }))
}
