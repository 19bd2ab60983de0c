use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use dropsync_cache::ApiCache;
use dropsync_engine::{KeyedLocks, SyncDeps, WebhookDeps};
use dropsync_supplier::{Credentials, SupplierClient};

#[derive(Debug, Parser)]
#[command(name = "dropsync-cli")]
#[command(about = "Supplier sync operations from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a full catalog sync for one supplier.
    Sync {
        supplier_id: String,
    },
    /// Re-score automated category mappings for one supplier's products.
    Recategorize {
        supplier_id: String,
    },
    /// Re-dispatch stored webhook events that failed processing.
    ReplayWebhooks {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Poll the supplier for order status changes.
    PollOrders {
        #[arg(long, default_value_t = 200)]
        limit: i64,
    },
    /// Insert the default category and logistics channel table.
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = dropsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = dropsync_db::PoolConfig::from_app_config(&config);
    let pool = dropsync_db::connect_pool(&config.database_url, pool_config).await?;
    dropsync_db::run_migrations(&pool).await?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Sync { supplier_id } => {
            require_known_supplier(&config, &supplier_id)?;
            let cache = Arc::new(ApiCache::new());
            let deps = SyncDeps {
                pool: pool.clone(),
                client: Arc::new(build_client(&config, cache)?),
                locks: Arc::new(KeyedLocks::new()),
                review_threshold: config.review_threshold,
                page_size: config.sync_page_size,
                max_pages: config.sync_max_pages,
                max_concurrent_items: config.sync_max_concurrent_items,
            };
            let report = dropsync_engine::sync_from_supplier(&deps, &supplier_id, "cli").await?;
            println!(
                "sync finished: {} added, {} updated, {} skipped, {} errors",
                report.added,
                report.updated,
                report.skipped,
                report.errors.len()
            );
        }
        Commands::Recategorize { supplier_id } => {
            let report = dropsync_engine::recategorize_all(
                &pool,
                &supplier_id,
                config.review_threshold,
            )
            .await?;
            println!(
                "recategorize finished: {} examined, {} reassigned, {} flagged for review",
                report.examined, report.reassigned, report.flagged_for_review
            );
        }
        Commands::ReplayWebhooks { limit } => {
            let cache = Arc::new(ApiCache::new());
            let deps = WebhookDeps {
                pool: pool.clone(),
                cache: cache.clone(),
                client: Arc::new(build_client(&config, cache)?),
                locks: Arc::new(KeyedLocks::new()),
                review_threshold: config.review_threshold,
            };
            let report = dropsync_engine::replay_failed_events(&deps, limit).await?;
            println!(
                "replay finished: {} replayed, {} succeeded, {} still failing",
                report.replayed, report.succeeded, report.still_failing
            );
        }
        Commands::PollOrders { limit } => {
            let cache = Arc::new(ApiCache::new());
            let client = build_client(&config, cache)?;
            let report = dropsync_engine::sync_order_statuses(&pool, &client, limit).await?;
            println!(
                "poll finished: {} checked, {} advanced",
                report.checked, report.advanced
            );
        }
        Commands::Seed => {
            seed(&pool).await?;
            println!("reference data seeded");
        }
    }

    Ok(())
}

/// Checks the id against the deployed profile file. Without a profile file
/// any supplier id is accepted.
fn require_known_supplier(
    config: &dropsync_core::AppConfig,
    supplier_id: &str,
) -> anyhow::Result<()> {
    if !config.suppliers_path.exists() {
        return Ok(());
    }
    let profiles = dropsync_core::load_supplier_profiles(&config.suppliers_path)?;
    if profiles.iter().any(|p| p.id == supplier_id && p.enabled) {
        Ok(())
    } else {
        anyhow::bail!(
            "unknown or disabled supplier '{supplier_id}' (declared in {})",
            config.suppliers_path.display()
        )
    }
}

fn build_client(
    config: &dropsync_core::AppConfig,
    cache: Arc<ApiCache>,
) -> anyhow::Result<SupplierClient> {
    let (Some(email), Some(api_key)) = (
        config.supplier_email.clone(),
        config.supplier_api_key.clone(),
    ) else {
        anyhow::bail!("DROPSYNC_SUPPLIER_EMAIL and DROPSYNC_SUPPLIER_API_KEY must be set");
    };

    let client = SupplierClient::with_base_url(
        Credentials { email, api_key },
        config.supplier_request_timeout_secs,
        &config.supplier_base_url,
        cache,
    )?
    .with_retry_policy(
        config.supplier_max_retries,
        config.supplier_retry_backoff_base_ms,
    );

    Ok(client)
}

async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    dropsync_db::seed_reference_data(pool).await?;
    Ok(())
}
