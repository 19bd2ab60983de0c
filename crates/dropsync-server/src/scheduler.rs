//! Background job scheduler.
//!
//! Registers the recurring maintenance jobs at server startup: a supplier
//! order-status poll every ten minutes and an hourly sweep of expired cache
//! entries.

use std::sync::Arc;

use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use dropsync_cache::ApiCache;
use dropsync_supplier::SupplierClient;

const STATUS_POLL_LIMIT: i64 = 200;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised or
/// started.
pub async fn build_scheduler(
    pool: PgPool,
    client: Arc<SupplierClient>,
    cache: Arc<ApiCache>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let poll_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 */10 * * * *", move |_id, _sched| {
            let pool = poll_pool.clone();
            let client = Arc::clone(&client);
            Box::pin(async move {
                match dropsync_engine::sync_order_statuses(&pool, &client, STATUS_POLL_LIMIT).await
                {
                    Ok(report) => tracing::info!(
                        checked = report.checked,
                        advanced = report.advanced,
                        "order status poll finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "order status poll failed"),
                }
            })
        })?)
        .await?;

    scheduler
        .add(Job::new_async("0 0 * * * *", move |_id, _sched| {
            let cache = Arc::clone(&cache);
            Box::pin(async move {
                let removed = cache.sweep_expired().await;
                tracing::debug!(removed, "cache sweep finished");
            })
        })?)
        .await?;

    scheduler.start().await?;
    Ok(scheduler)
}
