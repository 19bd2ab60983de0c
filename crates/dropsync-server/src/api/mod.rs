mod cache;
mod categories;
mod logistics;
mod orders;
mod products;
mod sync;
mod webhooks;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use dropsync_cache::ApiCache;
use dropsync_engine::{EngineError, KeyedLocks};
use dropsync_supplier::{SupplierClient, SupplierError};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub client: Arc<SupplierClient>,
    pub cache: Arc<ApiCache>,
    pub locks: Arc<KeyedLocks>,
    pub config: Arc<dropsync_core::AppConfig>,
    /// Declared supplier profiles; empty when no profile file is deployed,
    /// which leaves supplier ids unrestricted.
    pub suppliers: Arc<Vec<dropsync_core::SupplierProfile>>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

/// Rejects supplier ids not declared (or disabled) in the profile file.
/// Deployments without a profile file accept any id.
pub(super) fn require_known_supplier(
    state: &AppState,
    request_id: String,
    supplier_id: &str,
) -> Result<(), ApiError> {
    if state.suppliers.is_empty()
        || state
            .suppliers
            .iter()
            .any(|s| s.id == supplier_id && s.enabled)
    {
        Ok(())
    } else {
        Err(ApiError::new(
            request_id,
            "validation_error",
            format!("unknown or disabled supplier: {supplier_id}"),
        ))
    }
}

pub(super) fn map_db_error(request_id: String, error: &dropsync_db::DbError) -> ApiError {
    match error {
        dropsync_db::DbError::NotFound => {
            ApiError::new(request_id, "not_found", "record not found")
        }
        dropsync_db::DbError::InvalidSyncRunTransition { .. } => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        _ => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(super) fn map_engine_error(request_id: String, error: &EngineError) -> ApiError {
    match error {
        EngineError::Db(db) => map_db_error(request_id, db),
        EngineError::Supplier(SupplierError::Business { code, message }) => ApiError::new(
            request_id,
            "upstream_error",
            format!("supplier rejected the request ({code}): {message}"),
        ),
        EngineError::Supplier(e) => {
            tracing::error!(error = %e, "supplier call failed");
            ApiError::new(request_id, "upstream_error", "supplier unavailable")
        }
        EngineError::IncompleteAddress(_)
        | EngineError::NoForwardableLines(_)
        | EngineError::NotPublishable { .. } => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        _ => {
            tracing::error!(error = %error, "engine operation failed");
            ApiError::new(request_id, "internal_error", "operation failed")
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/sync/{supplier_id}", post(sync::trigger_sync))
        .route("/api/v1/sync/runs", get(sync::list_runs))
        .route("/api/v1/sync/runs/{id}", get(sync::get_run))
        .route(
            "/api/v1/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/api/v1/categories/mappings",
            get(categories::list_mappings).post(categories::create_mapping),
        )
        .route(
            "/api/v1/categories/mappings/{id}",
            put(categories::correct_mapping),
        )
        .route(
            "/api/v1/categories/recategorize/{supplier_id}",
            post(categories::recategorize),
        )
        .route("/api/v1/products/{id}", get(products::get_product))
        .route(
            "/api/v1/products/{id}/category",
            put(products::set_category),
        )
        .route("/api/v1/products/{id}/publish", post(products::publish))
        .route("/api/v1/orders", post(orders::create_order))
        .route("/api/v1/orders/{id}", get(orders::get_order))
        .route(
            "/api/v1/orders/{id}/create-supplier-order",
            post(orders::forward_order),
        )
        .route("/api/v1/orders/poll-status", post(orders::poll_statuses))
        .route("/api/v1/webhooks/failed", get(webhooks::list_failed))
        .route("/api/v1/webhooks/replay", post(webhooks::replay))
        .route("/api/v1/cache/stats", get(cache::stats))
        .route("/api/v1/cache", delete(cache::clear))
        .route("/api/v1/logistics/options", get(logistics::list_options))
        .route("/api/v1/logistics/quote", get(logistics::quote))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    // The webhook route authenticates by signature, not bearer token: the
    // supplier's delivery infrastructure is not a bearer-token client.
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/webhooks/{supplier_id}",
            post(webhooks::receive_webhook),
        );

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match dropsync_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}
