use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub suppliers_path: PathBuf,
    pub supplier_base_url: String,
    pub supplier_email: Option<String>,
    pub supplier_api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub review_threshold: f64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub supplier_request_timeout_secs: u64,
    pub supplier_max_retries: u32,
    pub supplier_retry_backoff_base_ms: u64,
    pub sync_page_size: u32,
    pub sync_max_pages: u32,
    pub sync_max_concurrent_items: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("suppliers_path", &self.suppliers_path)
            .field("database_url", &"[redacted]")
            .field("supplier_base_url", &self.supplier_base_url)
            .field("supplier_email", &self.supplier_email)
            .field(
                "supplier_api_key",
                &self.supplier_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("review_threshold", &self.review_threshold)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "supplier_request_timeout_secs",
                &self.supplier_request_timeout_secs,
            )
            .field("supplier_max_retries", &self.supplier_max_retries)
            .field(
                "supplier_retry_backoff_base_ms",
                &self.supplier_retry_backoff_base_ms,
            )
            .field("sync_page_size", &self.sync_page_size)
            .field("sync_max_pages", &self.sync_max_pages)
            .field(
                "sync_max_concurrent_items",
                &self.sync_max_concurrent_items,
            )
            .finish()
    }
}
