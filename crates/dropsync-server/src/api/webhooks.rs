use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use dropsync_engine::{IngestOutcome, WebhookDeps};

use crate::middleware::RequestId;

use super::{
    map_db_error, map_engine_error, normalize_limit, require_known_supplier, ApiError,
    ApiResponse, AppState, ResponseMeta,
};

const SIGNATURE_HEADER: &str = "x-supplier-signature";

/// Hex SHA-256 over `secret + raw body`. Compared in constant time against
/// the delivery's signature header.
fn expected_signature(secret: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let expected = expected_signature(secret, body);
    expected
        .as_bytes()
        .ct_eq(provided.trim().to_ascii_lowercase().as_bytes())
        .into()
}

fn webhook_deps(state: &AppState) -> WebhookDeps {
    WebhookDeps {
        pool: state.pool.clone(),
        cache: state.cache.clone(),
        client: state.client.clone(),
        locks: state.locks.clone(),
        review_threshold: state.config.review_threshold,
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(alias = "event_type")]
    r#type: String,
    #[serde(rename = "messageId", alias = "message_id")]
    message_id: String,
    #[serde(alias = "data", default)]
    payload: serde_json::Value,
}

/// Supplier-facing delivery endpoint. Authenticated by signature when a
/// webhook secret is configured, never by bearer token.
pub(super) async fn receive_webhook(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(supplier_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<IngestOutcome>>, ApiError> {
    if let Some(secret) = state.config.webhook_secret.as_deref() {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, provided) {
            tracing::warn!(supplier_id = %supplier_id, "webhook signature mismatch");
            return Err(ApiError::new(
                req_id.0,
                "unauthorized",
                "invalid webhook signature",
            ));
        }
    }

    require_known_supplier(&state, req_id.0.clone(), &supplier_id)?;

    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|e| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            format!("malformed webhook body: {e}"),
        )
    })?;

    let outcome = dropsync_engine::ingest_webhook(
        &webhook_deps(&state),
        &supplier_id,
        &envelope.r#type,
        &envelope.message_id,
        &envelope.payload,
    )
    .await
    .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: outcome,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct FailedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct FailedEventItem {
    id: i64,
    supplier_id: String,
    event_type: String,
    message_id: String,
    error: Option<String>,
    received_at: DateTime<Utc>,
}

pub(super) async fn list_failed(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<FailedQuery>,
) -> Result<Json<ApiResponse<Vec<FailedEventItem>>>, ApiError> {
    let rows = dropsync_db::list_failed_events(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| FailedEventItem {
            id: row.id,
            supplier_id: row.supplier_id,
            event_type: row.event_type,
            message_id: row.message_id,
            error: row.error,
            received_at: row.received_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct ReplayBody {
    pub limit: Option<i64>,
}

pub(super) async fn replay(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Option<Json<ReplayBody>>,
) -> Result<Json<ApiResponse<dropsync_engine::ReplayReport>>, ApiError> {
    let limit = normalize_limit(body.and_then(|Json(b)| b.limit));
    let report = dropsync_engine::replay_failed_events(&webhook_deps(&state), limit)
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

    #[test]
    fn signature_round_trips() {
        let body = br#"{"type":"STOCK","messageId":"m1","payload":{}}"#;
        let sig = expected_signature("topsecret", body);
        assert!(verify_signature("topsecret", body, &sig));
        assert!(verify_signature("topsecret", body, &sig.to_uppercase()));
    }

    #[test]
    fn signature_rejects_wrong_secret_or_body() {
        let body = br#"{"type":"STOCK"}"#;
        let sig = expected_signature("topsecret", body);
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("topsecret", br#"{"type":"ORDER"}"#, &sig));
        assert!(!verify_signature("topsecret", body, "deadbeef"));
    }

    #[test]
    fn envelope_accepts_both_field_spellings() {
        let native: WebhookEnvelope = serde_json::from_str(
            r#"{"type":"STOCK","messageId":"m1","payload":{"vid":"V1","stock":4}}"#,
        )
        .expect("native shape");
        assert_eq!(native.r#type, "STOCK");
        assert_eq!(native.message_id, "m1");

        let alias: WebhookEnvelope = serde_json::from_str(
            r#"{"event_type":"ORDER","message_id":"m2","data":{"orderId":"O1"}}"#,
        )
        .expect("aliased shape");
        assert_eq!(alias.r#type, "ORDER");
        assert_eq!(alias.payload["orderId"], "O1");
    }
}
