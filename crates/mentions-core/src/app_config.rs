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
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
    pub scraper_max_retries: u32,
    pub scraper_retry_delay_secs: u64,
    pub redirect_timeout_secs: u64,
    pub redirect_max_hops: usize,
    pub directory_base_url: String,
    pub catalog_url: String,
    pub preview_base_url: String,
    pub bridge_url: String,
    pub bridge_token: Option<String>,
    /// Messaging sessions available to live workers, in the order they are assigned.
    pub session_ids: Vec<i32>,
    pub sessions_dir: PathBuf,
    pub live_lookback_hours: u32,
    /// `None` scans the full directory history back to the prior cursor.
    pub directory_lookback_days: Option<u32>,
    pub preview_discovered: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field("scraper_retry_delay_secs", &self.scraper_retry_delay_secs)
            .field("redirect_timeout_secs", &self.redirect_timeout_secs)
            .field("redirect_max_hops", &self.redirect_max_hops)
            .field("directory_base_url", &self.directory_base_url)
            .field("catalog_url", &self.catalog_url)
            .field("preview_base_url", &self.preview_base_url)
            .field("bridge_url", &self.bridge_url)
            .field(
                "bridge_token",
                &self.bridge_token.as_ref().map(|_| "[redacted]"),
            )
            .field("session_ids", &self.session_ids)
            .field("sessions_dir", &self.sessions_dir)
            .field("live_lookback_hours", &self.live_lookback_hours)
            .field("directory_lookback_days", &self.directory_lookback_days)
            .field("preview_discovered", &self.preview_discovered)
            .finish()
    }
}
