//! Typed client for the external dropshipping supplier API.
//!
//! Handles token acquisition and single-flighted refresh, bounded retries
//! with exponential back-off, the supplier's error taxonomy, and routes
//! cacheable endpoints through [`dropsync_cache::ApiCache`].

mod auth;
mod client;
mod error;
mod retry;
pub mod types;

pub use client::{Credentials, SupplierClient};
pub use error::SupplierError;
