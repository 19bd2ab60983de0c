use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dropsync_engine::SyncDeps;

use crate::middleware::RequestId;

use super::{
    map_db_error, normalize_limit, require_known_supplier, ApiError, ApiResponse, AppState,
    ResponseMeta,
};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncRunItem {
    sync_run_id: Uuid,
    supplier_id: String,
    trigger_source: String,
    status: String,
    added: i32,
    updated: i32,
    skipped: i32,
    errors: serde_json::Value,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<dropsync_db::SyncRunRow> for SyncRunItem {
    fn from(row: dropsync_db::SyncRunRow) -> Self {
        Self {
            sync_run_id: row.public_id,
            supplier_id: row.supplier_id,
            trigger_source: row.trigger_source,
            status: row.status,
            added: row.added,
            updated: row.updated,
            skipped: row.skipped,
            errors: row.errors,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct TriggerData {
    supplier_id: String,
    status: &'static str,
}

/// Kicks off a catalog sync in the background and acks immediately; progress
/// is visible through the run listing.
pub(super) async fn trigger_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(supplier_id): Path<String>,
) -> Result<Json<ApiResponse<TriggerData>>, ApiError> {
    require_known_supplier(&state, req_id.0.clone(), &supplier_id)?;

    let deps = SyncDeps {
        pool: state.pool.clone(),
        client: state.client.clone(),
        locks: state.locks.clone(),
        review_threshold: state.config.review_threshold,
        page_size: state.config.sync_page_size,
        max_pages: state.config.sync_max_pages,
        max_concurrent_items: state.config.sync_max_concurrent_items,
    };
    let spawned_supplier = supplier_id.clone();
    tokio::spawn(async move {
        if let Err(e) =
            dropsync_engine::sync_from_supplier(&deps, &spawned_supplier, "api").await
        {
            tracing::error!(supplier_id = %spawned_supplier, error = %e, "background sync failed");
        }
    });

    Ok(Json(ApiResponse {
        data: TriggerData {
            supplier_id,
            status: "accepted",
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunItem>>>, ApiError> {
    let rows = dropsync_db::list_sync_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(SyncRunItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SyncRunItem>>, ApiError> {
    let row = dropsync_db::get_sync_run(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: SyncRunItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}
