mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use dropsync_cache::ApiCache;
use dropsync_engine::KeyedLocks;
use dropsync_supplier::{Credentials, SupplierClient};

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(dropsync_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = dropsync_db::PoolConfig::from_app_config(&config);
    let pool = dropsync_db::connect_pool(&config.database_url, pool_config).await?;
    dropsync_db::run_migrations(&pool).await?;
    dropsync_db::seed_reference_data(&pool).await?;

    let suppliers = Arc::new(load_suppliers(&config)?);

    let cache = Arc::new(ApiCache::new());
    let client = Arc::new(build_supplier_client(&config, Arc::clone(&cache))?);
    let locks = Arc::new(KeyedLocks::new());

    let _scheduler = scheduler::build_scheduler(
        pool.clone(),
        Arc::clone(&client),
        Arc::clone(&cache),
    )
    .await?;

    let is_development = matches!(config.env, dropsync_core::Environment::Development);
    let auth = AuthState::from_env(is_development)?;
    let state = AppState {
        pool,
        client,
        cache,
        locks,
        config: Arc::clone(&config),
        suppliers,
    };
    let app = build_app(state, auth, default_rate_limit_state());

    tracing::info!(addr = %config.bind_addr, env = %config.env, "server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn load_suppliers(
    config: &dropsync_core::AppConfig,
) -> anyhow::Result<Vec<dropsync_core::SupplierProfile>> {
    if !config.suppliers_path.exists() {
        tracing::info!(
            path = %config.suppliers_path.display(),
            "no supplier profile file; accepting any supplier id"
        );
        return Ok(Vec::new());
    }
    let profiles = dropsync_core::load_supplier_profiles(&config.suppliers_path)?;
    tracing::info!(
        count = profiles.len(),
        enabled = profiles.iter().filter(|p| p.enabled).count(),
        "supplier profiles loaded"
    );
    Ok(profiles)
}

fn build_supplier_client(
    config: &dropsync_core::AppConfig,
    cache: Arc<ApiCache>,
) -> anyhow::Result<SupplierClient> {
    let credentials = match (
        config.supplier_email.clone(),
        config.supplier_api_key.clone(),
    ) {
        (Some(email), Some(api_key)) => Credentials { email, api_key },
        _ if matches!(config.env, dropsync_core::Environment::Development) => {
            tracing::warn!(
                "supplier credentials not set; supplier calls will fail until configured"
            );
            Credentials {
                email: String::new(),
                api_key: String::new(),
            }
        }
        _ => anyhow::bail!(
            "DROPSYNC_SUPPLIER_EMAIL and DROPSYNC_SUPPLIER_API_KEY are required outside development"
        ),
    };

    let client = SupplierClient::with_base_url(
        credentials,
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

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
