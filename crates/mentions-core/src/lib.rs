pub mod app_config;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod crawl;
pub mod post;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use catalog::{BrandCatalog, BrandRecord, CatalogError};
pub use channel::{normalize_channel_link, Channel, ContentCategory, TrackedChannel};
pub use config::{load_app_config, load_app_config_from_env};
pub use crawl::CrawlResult;
pub use post::{engagement_rate, EngagementMetrics, Post, PostKey};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid content category: {0}")]
    InvalidCategory(String),
}
