//! Business logic tying the supplier client to the database: catalog sync,
//! category auto-mapping, order forwarding and status polling, and webhook
//! dispatch.

use thiserror::Error;

use dropsync_db::DbError;
use dropsync_supplier::SupplierError;

pub mod catmap;
pub mod locks;
pub mod orders;
pub mod sync;
pub mod webhook;

pub use catmap::{
    correct_mapping, correct_product, recategorize_all, resolve, RecategorizeReport, Resolution,
};
pub use locks::KeyedLocks;
pub use orders::{
    advance_mapping, ensure_supplier_order, sync_order_statuses, StatusSyncReport,
    SupplierOrderStatus,
};
pub use sync::{publish_product, sync_from_supplier, SyncDeps, SyncItemError, SyncReport};
pub use webhook::{ingest_webhook, replay_failed_events, IngestOutcome, ReplayReport, WebhookDeps};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("supplier call failed: {0}")]
    Supplier(#[from] SupplierError),
    #[error("order {0} has an incomplete shipping address")]
    IncompleteAddress(i64),
    #[error("order {0} has no lines with a supplier identity")]
    NoForwardableLines(i64),
    #[error("product {id} cannot be published: {reason}")]
    NotPublishable { id: i64, reason: String },
    #[error("unrecognized supplier order status: {0}")]
    UnknownSupplierStatus(String),
    #[error("unrecognized webhook event type: {0}")]
    UnknownEventType(String),
    #[error("webhook payload missing field: {0}")]
    MalformedPayload(&'static str),
    #[error("unknown supplier variant: {0}")]
    UnknownVariant(String),
    #[error("no order mapping for supplier order: {0}")]
    UnknownSupplierOrder(String),
}

impl EngineError {
    /// Whether a failed order forward should leave the mapping pending for a
    /// later retry rather than marking it failed. Transient supplier faults
    /// are retriable; business rejections are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Supplier(e) => !matches!(e, SupplierError::Business { .. }),
            EngineError::Db(_) => true,
            _ => false,
        }
    }
}
