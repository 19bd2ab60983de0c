//! Webhook ingestion and dispatch.
//!
//! Every delivery is persisted before it is interpreted; the
//! `(supplier_id, message_id)` UNIQUE key makes redelivery a no-op. Dispatch
//! failures keep the stored event unprocessed with its error so it can be
//! replayed once the cause is fixed.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;

use dropsync_cache::{ApiCache, Namespace};
use dropsync_db::{
    find_variant_by_external_id, get_mapping_by_external, get_product_by_external,
    insert_event_if_new, list_failed_events, mark_event_failed, mark_event_processed,
    update_variant_stock, WebhookEventRow,
};
use dropsync_supplier::SupplierClient;

use crate::locks::KeyedLocks;
use crate::orders::{advance_mapping, SupplierOrderStatus};
use crate::sync::import_product;
use crate::EngineError;

/// Handles the dispatch paths need: the pool and cache for every event type,
/// the client and upsert locks for targeted product refreshes.
#[derive(Clone)]
pub struct WebhookDeps {
    pub pool: PgPool,
    pub cache: Arc<ApiCache>,
    pub client: Arc<SupplierClient>,
    pub locks: Arc<KeyedLocks>,
    /// Confidence below this flags a refreshed product for manual review.
    pub review_threshold: f64,
}

/// Result of ingesting one delivery.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Processed { event_id: i64 },
    /// The `(supplier_id, message_id)` pair was already recorded.
    Duplicate,
    /// Stored but not processed; replayable.
    Failed { event_id: i64, error: String },
}

/// Counts from one replay pass over stored failed events.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ReplayReport {
    pub replayed: u32,
    pub succeeded: u32,
    pub still_failing: u32,
}

/// Records and dispatches one webhook delivery.
///
/// # Errors
///
/// Returns [`EngineError::Db`] only when the event cannot be recorded at
/// all. Dispatch failures are captured in the returned
/// [`IngestOutcome::Failed`] instead.
pub async fn ingest_webhook(
    deps: &WebhookDeps,
    supplier_id: &str,
    event_type: &str,
    message_id: &str,
    payload: &serde_json::Value,
) -> Result<IngestOutcome, EngineError> {
    let Some(event) =
        insert_event_if_new(&deps.pool, supplier_id, event_type, message_id, payload).await?
    else {
        tracing::debug!(supplier_id, message_id, "duplicate webhook delivery ignored");
        return Ok(IngestOutcome::Duplicate);
    };

    match dispatch(deps, &event).await {
        Ok(()) => {
            mark_event_processed(&deps.pool, event.id).await?;
            Ok(IngestOutcome::Processed { event_id: event.id })
        }
        Err(e) => {
            let error = e.to_string();
            tracing::warn!(
                event_id = event.id,
                event_type,
                error = %error,
                "webhook dispatch failed; stored for replay"
            );
            mark_event_failed(&deps.pool, event.id, &error).await?;
            Ok(IngestOutcome::Failed {
                event_id: event.id,
                error,
            })
        }
    }
}

/// Re-runs dispatch for stored failed events, oldest first.
///
/// # Errors
///
/// Returns [`EngineError::Db`] when the failed set cannot be listed or an
/// event's bookkeeping write fails.
pub async fn replay_failed_events(
    deps: &WebhookDeps,
    limit: i64,
) -> Result<ReplayReport, EngineError> {
    let mut report = ReplayReport::default();

    for event in list_failed_events(&deps.pool, limit).await? {
        report.replayed += 1;
        match dispatch(deps, &event).await {
            Ok(()) => {
                mark_event_processed(&deps.pool, event.id).await?;
                report.succeeded += 1;
            }
            Err(e) => {
                mark_event_failed(&deps.pool, event.id, &e.to_string()).await?;
                report.still_failing += 1;
            }
        }
    }

    tracing::info!(
        replayed = report.replayed,
        succeeded = report.succeeded,
        still_failing = report.still_failing,
        "webhook replay pass complete"
    );
    Ok(report)
}

async fn dispatch(deps: &WebhookDeps, event: &WebhookEventRow) -> Result<(), EngineError> {
    match event.event_type.as_str() {
        "STOCK" => dispatch_stock(deps, event).await,
        "PRODUCT" => dispatch_product(deps, event).await,
        "ORDER" => dispatch_order(&deps.pool, event).await,
        "LOGISTICS" => {
            let removed = deps.cache.clear(Some(Namespace::Logistics)).await;
            tracing::debug!(removed, "logistics cache cleared by webhook");
            Ok(())
        }
        other => Err(EngineError::UnknownEventType(other.to_owned())),
    }
}

fn payload_str<'a>(
    payload: &'a serde_json::Value,
    field: &'static str,
) -> Result<&'a str, EngineError> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or(EngineError::MalformedPayload(field))
}

/// Stock push: overwrite the variant's level and drop the cached stock entry
/// so the next read reflects the push immediately.
async fn dispatch_stock(deps: &WebhookDeps, event: &WebhookEventRow) -> Result<(), EngineError> {
    let vid = payload_str(&event.payload, "vid")?;
    let stock = event
        .payload
        .get("stock")
        .and_then(serde_json::Value::as_i64)
        .ok_or(EngineError::MalformedPayload("stock"))?;

    let variant = find_variant_by_external_id(&deps.pool, &event.supplier_id, vid)
        .await?
        .ok_or_else(|| EngineError::UnknownVariant(vid.to_owned()))?;

    update_variant_stock(&deps.pool, variant.id, i32::try_from(stock).unwrap_or(0)).await?;
    deps.cache.invalidate(Namespace::Stock, vid).await;
    Ok(())
}

/// Product change push: drop the cached detail, then re-import the product
/// through the same locked path the sync pipeline uses. A push for a product
/// we never imported is only a cache signal.
async fn dispatch_product(deps: &WebhookDeps, event: &WebhookEventRow) -> Result<(), EngineError> {
    let pid = payload_str(&event.payload, "pid")?;
    deps.cache.invalidate(Namespace::ProductDetail, pid).await;

    if get_product_by_external(&deps.pool, &event.supplier_id, pid)
        .await?
        .is_some()
    {
        import_product(
            &deps.pool,
            &deps.client,
            &deps.locks,
            deps.review_threshold,
            &event.supplier_id,
            pid,
        )
        .await?;
    }
    Ok(())
}

/// Order status push: advance the mapped order along the forward-only
/// ladder. A regression or unknown status is ignored, not an error.
async fn dispatch_order(pool: &PgPool, event: &WebhookEventRow) -> Result<(), EngineError> {
    let external_order_id = payload_str(&event.payload, "orderId")?;
    let raw_status = payload_str(&event.payload, "orderStatus")?;
    let tracking_number = event
        .payload
        .get("trackingNumber")
        .and_then(serde_json::Value::as_str);

    let mapping = get_mapping_by_external(pool, &event.supplier_id, external_order_id)
        .await?
        .ok_or_else(|| EngineError::UnknownSupplierOrder(external_order_id.to_owned()))?;

    let Some(reported) = SupplierOrderStatus::from_supplier(raw_status) else {
        tracing::warn!(
            external_order_id,
            raw_status,
            "unrecognized supplier status in webhook ignored"
        );
        return Ok(());
    };

    advance_mapping(pool, &mapping, reported, tracking_number).await?;
    Ok(())
}
