//! Category resolution: maps supplier category paths onto internal
//! categories, persisting the decision as a `category_mappings` row.
//!
//! Resolution is mapping-first: an existing active row always wins, so the
//! same supplier path resolves identically across sync runs. New paths are
//! scored against the internal category names and low scores land the
//! product in the review queue instead of silently miscategorizing it.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;

use dropsync_core::scoring;
use dropsync_db::{
    get_default_category, get_product, list_categories, list_recategorizable_products,
    set_manual_mapping, set_manual_mapping_by_id, set_product_category, upsert_auto_mapping,
    CategoryMappingRow, ProductRow,
};

use crate::EngineError;

/// Outcome of resolving one supplier category path.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub category_id: i64,
    pub confidence: f64,
    pub needs_review: bool,
}

/// Counts from a bulk re-categorization pass.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct RecategorizeReport {
    pub examined: u32,
    pub reassigned: u32,
    pub flagged_for_review: u32,
}

fn to_stored_confidence(score: f64) -> Decimal {
    Decimal::from_f64_retain(score)
        .unwrap_or_default()
        .round_dp(3)
}

/// Resolves `external_category` for `supplier_id` to an internal category.
///
/// An existing active mapping is reused as-is. Otherwise the path is scored
/// against every non-default category; the best match is persisted as an
/// automated mapping. A path that matches nothing falls back to the default
/// category with confidence zero, which always needs review.
///
/// # Errors
///
/// Returns [`EngineError::Db`] if any read or write fails.
pub async fn resolve(
    pool: &PgPool,
    supplier_id: &str,
    external_category: &str,
    review_threshold: f64,
) -> Result<Resolution, EngineError> {
    resolve_inner(pool, supplier_id, external_category, review_threshold, false).await
}

async fn resolve_inner(
    pool: &PgPool,
    supplier_id: &str,
    external_category: &str,
    review_threshold: f64,
    rescore: bool,
) -> Result<Resolution, EngineError> {
    if let Some(mapping) =
        dropsync_db::get_active_mapping(pool, supplier_id, external_category).await?
    {
        // Manual mappings are always authoritative; automated ones are reused
        // unless the caller asked for a fresh scoring pass.
        if mapping.manually_mapped || !rescore {
            let confidence = mapping.confidence.to_f64().unwrap_or(0.0);
            return Ok(Resolution {
                category_id: mapping.internal_category_id,
                confidence,
                needs_review: !mapping.manually_mapped && confidence < review_threshold,
            });
        }
    }

    let candidates: Vec<(i64, String)> = list_categories(pool)
        .await?
        .into_iter()
        .filter(|c| !c.is_default)
        .map(|c| (c.id, c.name))
        .collect();

    let (category_id, score) = match scoring::best_match(external_category, &candidates) {
        Some((id, score)) if score > 0.0 => (id, score),
        _ => {
            let default = get_default_category(pool).await?;
            (default.id, 0.0)
        }
    };

    let mapping = upsert_auto_mapping(
        pool,
        supplier_id,
        external_category,
        category_id,
        to_stored_confidence(score),
    )
    .await?;

    // A concurrent resolver or an operator may have written the row first;
    // the stored mapping is authoritative either way.
    let confidence = mapping.confidence.to_f64().unwrap_or(0.0);
    Ok(Resolution {
        category_id: mapping.internal_category_id,
        confidence,
        needs_review: !mapping.manually_mapped && confidence < review_threshold,
    })
}

/// Applies an operator correction to a mapping and reassigns every product
/// that still follows it automatically. Returns the corrected row and the
/// number of products moved.
///
/// # Errors
///
/// Returns [`EngineError::Db`] if the mapping does not exist or a write
/// fails.
pub async fn correct_mapping(
    pool: &PgPool,
    mapping_id: i64,
    category_id: i64,
) -> Result<(CategoryMappingRow, u32), EngineError> {
    let mapping = set_manual_mapping_by_id(pool, mapping_id, category_id).await?;

    let mut moved = 0u32;
    for product in list_recategorizable_products(pool, &mapping.supplier_id).await? {
        if product.external_category.as_deref() == Some(mapping.external_category.as_str())
            && product.category_id != Some(category_id)
        {
            set_product_category(pool, product.id, category_id).await?;
            moved += 1;
        }
    }

    tracing::info!(
        mapping_id,
        category_id,
        products_moved = moved,
        "category mapping corrected"
    );
    Ok((mapping, moved))
}

/// Applies an operator correction to a single product: assigns the category,
/// pins it against future syncs, and records the decision as a manual mapping
/// so sibling products resolve the same way.
///
/// # Errors
///
/// Returns [`EngineError::Db`] if the product does not exist or a write
/// fails.
pub async fn correct_product(
    pool: &PgPool,
    product_id: i64,
    category_id: i64,
) -> Result<ProductRow, EngineError> {
    let product = get_product(pool, product_id).await?;
    set_product_category(pool, product_id, category_id).await?;
    let product_after = dropsync_db::mark_field_edited(pool, product_id, "category").await?;

    if let (Some(supplier_id), Some(external_category)) =
        (&product.supplier_id, &product.external_category)
    {
        set_manual_mapping(pool, supplier_id, external_category, category_id).await?;
    }

    Ok(product_after)
}

/// Re-scores every supplier product whose category the operator has not
/// pinned, applying the current mapping table and category list.
///
/// # Errors
///
/// Returns [`EngineError::Db`] if any read or write fails.
pub async fn recategorize_all(
    pool: &PgPool,
    supplier_id: &str,
    review_threshold: f64,
) -> Result<RecategorizeReport, EngineError> {
    let mut report = RecategorizeReport::default();

    for product in list_recategorizable_products(pool, supplier_id).await? {
        let Some(external_category) = product.external_category.as_deref() else {
            continue;
        };
        report.examined += 1;

        let resolution =
            resolve_inner(pool, supplier_id, external_category, review_threshold, true).await?;
        if product.category_id != Some(resolution.category_id) {
            set_product_category(pool, product.id, resolution.category_id).await?;
            report.reassigned += 1;
        }
        if resolution.needs_review {
            report.flagged_for_review += 1;
        }
    }

    tracing::info!(
        supplier_id,
        examined = report.examined,
        reassigned = report.reassigned,
        flagged = report.flagged_for_review,
        "re-categorization pass complete"
    );
    Ok(report)
}
