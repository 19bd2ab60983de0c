//! Order forwarding and supplier-side status tracking.
//!
//! Forwarding is idempotent per order: the mapping row's UNIQUE order_id is
//! the database-level barrier, and [`KeyedLocks`] keeps concurrent requests
//! for the same order from both reaching the supplier. Status is a
//! forward-only ladder — a late or duplicate webhook can never move an order
//! backwards.

use std::str::FromStr;

use serde::Serialize;
use sqlx::PgPool;

use dropsync_db::{
    get_mapping_by_order, get_order, insert_mapping_if_absent, list_order_lines,
    list_pollable_mappings, set_mapping_created, set_mapping_failed, update_mapping_status,
    OrderRow, SupplierOrderMappingRow,
};
use dropsync_supplier::types::{CreateSupplierOrder, OrderLine};
use dropsync_supplier::SupplierClient;

use crate::locks::KeyedLocks;
use crate::EngineError;

/// Supplier-order lifecycle. Ordered by rank; transitions only go up, except
/// `Pending -> Failed` for permanently rejected orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplierOrderStatus {
    Pending,
    Created,
    Shipped,
    Delivered,
    Failed,
}

impl SupplierOrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SupplierOrderStatus::Pending => "pending",
            SupplierOrderStatus::Created => "created",
            SupplierOrderStatus::Shipped => "shipped",
            SupplierOrderStatus::Delivered => "delivered",
            SupplierOrderStatus::Failed => "failed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            SupplierOrderStatus::Pending => 0,
            SupplierOrderStatus::Created => 1,
            SupplierOrderStatus::Shipped => 2,
            SupplierOrderStatus::Delivered => 3,
            // Terminal, but not part of the forward ladder.
            SupplierOrderStatus::Failed => 4,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SupplierOrderStatus::Delivered | SupplierOrderStatus::Failed
        )
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    #[must_use]
    pub fn can_advance_to(self, next: SupplierOrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == SupplierOrderStatus::Failed {
            return self == SupplierOrderStatus::Pending;
        }
        next.rank() > self.rank()
    }

    /// Maps the supplier's raw status string onto the local ladder.
    #[must_use]
    pub fn from_supplier(raw: &str) -> Option<Self> {
        match raw.to_uppercase().as_str() {
            "CREATED" | "UNPAID" | "UNSHIPPED" | "PROCESSING" => Some(SupplierOrderStatus::Created),
            "SHIPPED" | "IN_TRANSIT" => Some(SupplierOrderStatus::Shipped),
            "DELIVERED" | "COMPLETED" => Some(SupplierOrderStatus::Delivered),
            "CANCELLED" | "FAILED" => Some(SupplierOrderStatus::Failed),
            _ => None,
        }
    }
}

impl FromStr for SupplierOrderStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SupplierOrderStatus::Pending),
            "created" => Ok(SupplierOrderStatus::Created),
            "shipped" => Ok(SupplierOrderStatus::Shipped),
            "delivered" => Ok(SupplierOrderStatus::Delivered),
            "failed" => Ok(SupplierOrderStatus::Failed),
            other => Err(EngineError::UnknownSupplierStatus(other.to_owned())),
        }
    }
}

/// Counts from one status polling pass.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusSyncReport {
    pub checked: u32,
    pub advanced: u32,
}

fn require_address(order: &OrderRow) -> Result<(), EngineError> {
    let complete = order.ship_name.is_some()
        && order.ship_street.is_some()
        && order.ship_city.is_some()
        && order.ship_zip.is_some()
        && order.ship_country.is_some();
    if complete {
        Ok(())
    } else {
        Err(EngineError::IncompleteAddress(order.id))
    }
}

/// Forwards an order to the supplier exactly once.
///
/// Safe to call repeatedly and concurrently: callers racing on the same
/// order serialize on a per-order lock, and an order that already has a
/// non-pending mapping is returned as-is. A transient supplier fault leaves
/// the mapping pending for a later retry; a business rejection marks it
/// failed.
///
/// # Errors
///
/// [`EngineError::IncompleteAddress`] before anything is sent,
/// [`EngineError::NoForwardableLines`] when no line carries a supplier
/// identity, or the underlying supplier/database error.
pub async fn ensure_supplier_order(
    pool: &PgPool,
    client: &SupplierClient,
    locks: &KeyedLocks,
    order_id: i64,
) -> Result<SupplierOrderMappingRow, EngineError> {
    let _guard = locks.acquire(&format!("order:{order_id}")).await;

    // A previous call may have finished while we waited on the lock.
    if let Some(mapping) = get_mapping_by_order(pool, order_id).await? {
        if mapping.status != "pending" {
            return Ok(mapping);
        }
    }

    let order = get_order(pool, order_id).await?;
    require_address(&order)?;

    let lines = list_order_lines(pool, order_id).await?;
    let supplier_id = lines
        .iter()
        .find_map(|l| l.supplier_id.clone())
        .ok_or(EngineError::NoForwardableLines(order_id))?;

    let mut products = Vec::new();
    for line in &lines {
        if line.supplier_id.as_deref() != Some(supplier_id.as_str()) {
            tracing::warn!(
                order_id,
                item_id = line.item_id,
                "order line from another supplier skipped"
            );
            continue;
        }
        let vid = line
            .external_variant_id
            .clone()
            .filter(|_| line.variant_is_active.unwrap_or(false));
        let vid = match vid {
            Some(vid) => Some(vid),
            None => default_variant_vid(pool, line.product_id).await?,
        };
        match (vid, line.external_product_id.clone()) {
            (Some(vid), _) => products.push(OrderLine {
                vid: Some(vid),
                pid: None,
                quantity: line.quantity,
            }),
            (None, Some(pid)) => {
                // Degraded: the supplier picks the variant.
                tracing::warn!(order_id, pid = %pid, "no variant id; falling back to product-level line");
                products.push(OrderLine {
                    vid: None,
                    pid: Some(pid),
                    quantity: line.quantity,
                });
            }
            (None, None) => {
                tracing::warn!(order_id, item_id = line.item_id, "line has no supplier identity");
            }
        }
    }
    if products.is_empty() {
        return Err(EngineError::NoForwardableLines(order_id));
    }

    let (mapping, _) = insert_mapping_if_absent(pool, order_id, &supplier_id).await?;
    if mapping.status != "pending" {
        return Ok(mapping);
    }

    let request = CreateSupplierOrder {
        order_number: order.public_id.to_string(),
        consignee: order.ship_name.unwrap_or_default(),
        address: order.ship_street.unwrap_or_default(),
        city: order.ship_city.unwrap_or_default(),
        zip: order.ship_zip.unwrap_or_default(),
        country_code: order.ship_country.unwrap_or_default(),
        products,
    };

    match client.create_order(&request).await {
        Ok(created) => {
            let mapping = set_mapping_created(pool, mapping.id, &created.order_id).await?;
            tracing::info!(
                order_id,
                external_order_id = %created.order_id,
                "supplier order created"
            );
            Ok(mapping)
        }
        Err(e) => {
            let engine_error = EngineError::from(e);
            if engine_error.is_transient() {
                // Mapping stays pending; the caller may retry.
                tracing::warn!(order_id, error = %engine_error, "supplier order deferred");
            } else {
                tracing::error!(order_id, error = %engine_error, "supplier order rejected");
                set_mapping_failed(pool, mapping.id).await?;
            }
            Err(engine_error)
        }
    }
}

async fn default_variant_vid(pool: &PgPool, product_id: i64) -> Result<Option<String>, EngineError> {
    Ok(dropsync_db::get_default_external_variant(pool, product_id)
        .await?
        .and_then(|v| v.external_variant_id))
}

/// Advances one mapping toward the supplier-reported status, if that is a
/// legal forward move. Returns `true` when the row changed.
///
/// # Errors
///
/// Returns [`EngineError::UnknownSupplierStatus`] for an unparseable stored
/// status, or [`EngineError::Db`] on write failure. A lost status-guard race
/// is not an error; the row simply does not advance.
pub async fn advance_mapping(
    pool: &PgPool,
    mapping: &SupplierOrderMappingRow,
    reported: SupplierOrderStatus,
    tracking_number: Option<&str>,
) -> Result<bool, EngineError> {
    let current = SupplierOrderStatus::from_str(&mapping.status)?;
    if !current.can_advance_to(reported) {
        return Ok(false);
    }

    match update_mapping_status(
        pool,
        mapping.id,
        current.as_str(),
        reported.as_str(),
        tracking_number,
    )
    .await
    {
        Ok(_) => Ok(true),
        // Someone else advanced the row first.
        Err(dropsync_db::DbError::NotFound) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Polls the supplier for every order still in flight and advances local
/// state. One unreachable order does not stop the pass.
///
/// # Errors
///
/// Returns [`EngineError::Db`] only when listing the pollable set fails.
pub async fn sync_order_statuses(
    pool: &PgPool,
    client: &SupplierClient,
    limit: i64,
) -> Result<StatusSyncReport, EngineError> {
    let mut report = StatusSyncReport::default();

    for mapping in list_pollable_mappings(pool, limit).await? {
        let Some(external_order_id) = mapping.external_order_id.as_deref() else {
            continue;
        };
        report.checked += 1;

        let detail = match client.get_order_status(external_order_id).await {
            Ok(detail) => detail,
            Err(e) => {
                tracing::warn!(
                    mapping_id = mapping.id,
                    external_order_id,
                    error = %e,
                    "status poll failed; will retry next pass"
                );
                continue;
            }
        };

        let Some(reported) = SupplierOrderStatus::from_supplier(&detail.order_status) else {
            tracing::warn!(
                mapping_id = mapping.id,
                raw_status = %detail.order_status,
                "unrecognized supplier status ignored"
            );
            continue;
        };

        if advance_mapping(pool, &mapping, reported, detail.tracking_number.as_deref()).await? {
            report.advanced += 1;
        }
    }

    tracing::info!(
        checked = report.checked,
        advanced = report.advanced,
        "order status pass complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_forward_only() {
        use SupplierOrderStatus::{Created, Delivered, Failed, Pending, Shipped};

        assert!(Pending.can_advance_to(Created));
        assert!(Created.can_advance_to(Shipped));
        assert!(Created.can_advance_to(Delivered), "skipping shipped is legal");
        assert!(Shipped.can_advance_to(Delivered));

        assert!(!Shipped.can_advance_to(Created), "no regression");
        assert!(!Delivered.can_advance_to(Shipped), "terminal");
        assert!(!Failed.can_advance_to(Created), "terminal");
    }

    #[test]
    fn failed_is_only_reachable_from_pending() {
        use SupplierOrderStatus::{Created, Failed, Pending, Shipped};

        assert!(Pending.can_advance_to(Failed));
        assert!(!Created.can_advance_to(Failed));
        assert!(!Shipped.can_advance_to(Failed));
    }

    #[test]
    fn supplier_statuses_map_onto_the_ladder() {
        assert_eq!(
            SupplierOrderStatus::from_supplier("SHIPPED"),
            Some(SupplierOrderStatus::Shipped)
        );
        assert_eq!(
            SupplierOrderStatus::from_supplier("in_transit"),
            Some(SupplierOrderStatus::Shipped)
        );
        assert_eq!(
            SupplierOrderStatus::from_supplier("DELIVERED"),
            Some(SupplierOrderStatus::Delivered)
        );
        assert_eq!(SupplierOrderStatus::from_supplier("WEIRD"), None);
    }

    #[test]
    fn stored_status_round_trips() {
        for status in [
            SupplierOrderStatus::Pending,
            SupplierOrderStatus::Created,
            SupplierOrderStatus::Shipped,
            SupplierOrderStatus::Delivered,
            SupplierOrderStatus::Failed,
        ] {
            assert_eq!(
                SupplierOrderStatus::from_str(status.as_str()).expect("parse"),
                status
            );
        }
    }
}
