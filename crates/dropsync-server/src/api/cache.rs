use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use dropsync_cache::{CacheStats, Namespace};

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState, ResponseMeta};

pub(super) async fn stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<CacheStats>> {
    Json(ApiResponse {
        data: state.cache.stats().await,
        meta: ResponseMeta::new(req_id.0),
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct ClearQuery {
    /// Restricts the clear to one namespace; omitted clears everything.
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ClearData {
    cleared: usize,
    namespace: Option<&'static str>,
}

fn parse_namespace(raw: &str) -> Option<Namespace> {
    match raw {
        "search" => Some(Namespace::Search),
        "product_detail" => Some(Namespace::ProductDetail),
        "stock" => Some(Namespace::Stock),
        "logistics" => Some(Namespace::Logistics),
        _ => None,
    }
}

pub(super) async fn clear(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<ApiResponse<ClearData>>, ApiError> {
    let ns = match query.namespace.as_deref() {
        Some(raw) => Some(parse_namespace(raw).ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "validation_error",
                format!("unknown cache namespace: {raw}"),
            )
        })?),
        None => None,
    };

    let cleared = state.cache.clear(ns).await;
    tracing::info!(cleared, namespace = ns.map(Namespace::as_str), "cache cleared");

    Ok(Json(ApiResponse {
        data: ClearData {
            cleared,
            namespace: ns.map(Namespace::as_str),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_namespace_accepts_known_names() {
        assert_eq!(parse_namespace("stock"), Some(Namespace::Stock));
        assert_eq!(
            parse_namespace("product_detail"),
            Some(Namespace::ProductDetail)
        );
        assert_eq!(parse_namespace("everything"), None);
    }
}
