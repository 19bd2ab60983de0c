//! Catalog synchronization: pages the supplier catalog into the local
//! product tables, resolving categories as it goes.
//!
//! Every run is bracketed by a `sync_runs` row. Item failures are isolated —
//! one bad payload is recorded in the run's error list and the rest of the
//! page continues; only a page-level supplier failure aborts the run.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use dropsync_db::{
    complete_sync_run, create_sync_run, fail_sync_run, get_product, set_product_status,
    start_sync_run, upsert_supplier_product, upsert_variant, NewSupplierProduct, NewVariant,
    ProductRow,
};
use dropsync_supplier::SupplierClient;

use crate::catmap;
use crate::locks::KeyedLocks;
use crate::EngineError;

/// Handles and tunables for a sync run.
#[derive(Clone)]
pub struct SyncDeps {
    pub pool: PgPool,
    pub client: Arc<SupplierClient>,
    /// Serializes upserts per (supplier, external product id); shared with
    /// the webhook ingestor so both paths take the same lock.
    pub locks: Arc<KeyedLocks>,
    /// Confidence below this flags the product for manual review.
    pub review_threshold: f64,
    pub page_size: u32,
    pub max_pages: u32,
    pub max_concurrent_items: usize,
}

/// One item that failed during a run; stored on the `sync_runs` row.
#[derive(Debug, Clone, Serialize)]
pub struct SyncItemError {
    pub pid: String,
    pub error: String,
}

/// Outcome of one sync run.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub run_id: i64,
    pub added: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: Vec<SyncItemError>,
}

/// Runs a full catalog sync for one supplier, bracketed by a `sync_runs` row.
///
/// # Errors
///
/// Returns the underlying [`EngineError`] when a page fetch or the run
/// bookkeeping fails; the run row is marked failed first. Item-level errors
/// do not fail the run.
pub async fn sync_from_supplier(
    deps: &SyncDeps,
    supplier_id: &str,
    trigger_source: &str,
) -> Result<SyncReport, EngineError> {
    let run = create_sync_run(&deps.pool, supplier_id, trigger_source).await?;
    start_sync_run(&deps.pool, run.id).await?;
    tracing::info!(supplier_id, run_id = run.id, trigger_source, "sync run started");

    match run_pages(deps, supplier_id).await {
        Ok(mut report) => {
            report.run_id = run.id;
            let errors =
                serde_json::to_value(&report.errors).unwrap_or_else(|_| serde_json::json!([]));
            complete_sync_run(
                &deps.pool,
                run.id,
                i32::try_from(report.added).unwrap_or(i32::MAX),
                i32::try_from(report.updated).unwrap_or(i32::MAX),
                i32::try_from(report.skipped).unwrap_or(i32::MAX),
                &errors,
            )
            .await?;
            tracing::info!(
                run_id = run.id,
                added = report.added,
                updated = report.updated,
                skipped = report.skipped,
                "sync run succeeded"
            );
            Ok(report)
        }
        Err(e) => {
            tracing::error!(run_id = run.id, error = %e, "sync run failed");
            fail_sync_run(&deps.pool, run.id, &e.to_string()).await?;
            Err(e)
        }
    }
}

async fn run_pages(deps: &SyncDeps, supplier_id: &str) -> Result<SyncReport, EngineError> {
    let mut report = SyncReport::default();
    let mut seen_pids = HashSet::new();

    for page_num in 1..=deps.max_pages {
        let page = deps
            .client
            .list_products(page_num, deps.page_size, None)
            .await?;
        let item_count = page.list.len();

        // Suppliers occasionally repeat an item across page boundaries;
        // process each external product id once per run.
        let fresh: Vec<_> = page
            .list
            .into_iter()
            .filter(|summary| seen_pids.insert(summary.pid.clone()))
            .collect();

        let outcomes: Vec<Result<bool, SyncItemError>> = stream::iter(fresh)
            .map(|summary| {
                let pid = summary.pid;
                async move {
                    sync_one(deps, supplier_id, &pid)
                        .await
                        .map_err(|e| SyncItemError {
                            pid,
                            error: e.to_string(),
                        })
                }
            })
            .buffer_unordered(deps.max_concurrent_items.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(true) => report.added += 1,
                Ok(false) => report.updated += 1,
                Err(item_error) => {
                    tracing::warn!(
                        supplier_id,
                        pid = %item_error.pid,
                        error = %item_error.error,
                        "sync item failed"
                    );
                    report.skipped += 1;
                    report.errors.push(item_error);
                }
            }
        }

        let seen = u64::from(page_num) * u64::from(deps.page_size);
        if item_count < deps.page_size as usize || seen >= page.total {
            break;
        }
    }

    Ok(report)
}

async fn sync_one(deps: &SyncDeps, supplier_id: &str, pid: &str) -> Result<bool, EngineError> {
    import_product(
        &deps.pool,
        &deps.client,
        &deps.locks,
        deps.review_threshold,
        supplier_id,
        pid,
    )
    .await
}

/// Imports or refreshes one supplier product: detail fetch, category
/// resolution, product upsert, variant upserts — the upserts serialized per
/// (supplier, external product id). Returns whether the product row was
/// freshly inserted. Shared with the webhook ingestor's targeted refresh.
pub(crate) async fn import_product(
    pool: &PgPool,
    client: &SupplierClient,
    locks: &KeyedLocks,
    review_threshold: f64,
    supplier_id: &str,
    pid: &str,
) -> Result<bool, EngineError> {
    let detail = client.get_product(pid).await?;
    let _guard = locks
        .acquire(&format!("product:{supplier_id}:{pid}"))
        .await;

    let (category_id, needs_review) = match detail.category_name.as_deref() {
        Some(external_category) => {
            let resolution =
                catmap::resolve(pool, supplier_id, external_category, review_threshold).await?;
            (Some(resolution.category_id), resolution.needs_review)
        }
        // No supplier category at all: park uncategorized for review.
        None => (None, true),
    };

    let (product, inserted) = upsert_supplier_product(
        pool,
        &NewSupplierProduct {
            supplier_id: supplier_id.to_owned(),
            external_product_id: detail.pid.clone(),
            external_category: detail.category_name.clone(),
            name: detail.product_name.clone(),
            description: detail.description.clone(),
            price: Some(detail.sell_price),
            images: detail.product_images.clone(),
            category_id,
            needs_review,
        },
    )
    .await?;

    for variant in &detail.variants {
        upsert_variant(
            pool,
            product.id,
            &NewVariant {
                external_variant_id: variant.vid.clone(),
                sku: variant.variant_sku.clone(),
                price: Some(variant.variant_sell_price),
                stock: variant.variant_stock,
            },
        )
        .await?;
    }

    Ok(inserted)
}

/// Publishes a draft product after checking it is sellable: named, priced,
/// and categorized. Products without variants are publishable; ordering
/// falls back to the product-level external id for them.
///
/// # Errors
///
/// Returns [`EngineError::NotPublishable`] naming the first failed check, or
/// [`EngineError::Db`] for a missing product.
pub async fn publish_product(pool: &PgPool, product_id: i64) -> Result<ProductRow, EngineError> {
    let product = get_product(pool, product_id).await?;

    let reason = if product.name.trim().is_empty() {
        Some("empty name")
    } else if product.price.filter(|p| *p > Decimal::ZERO).is_none() {
        Some("missing or non-positive price")
    } else if product.category_id.is_none() {
        Some("no category assigned")
    } else {
        None
    };

    if let Some(reason) = reason {
        return Err(EngineError::NotPublishable {
            id: product_id,
            reason: reason.to_owned(),
        });
    }

    Ok(set_product_status(pool, product_id, "active").await?)
}
