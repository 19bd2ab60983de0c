use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod logistics;
pub mod scoring;
pub mod suppliers;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use logistics::{estimate_cost, options_for, LogisticsError, LogisticsOption, Quote};
pub use scoring::{best_match, confidence};
pub use suppliers::{load_supplier_profiles, SupplierProfile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("failed to read supplier profiles from {path}: {reason}")]
    SupplierProfiles { path: String, reason: String },
}
