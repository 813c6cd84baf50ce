use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_1) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/39.0.2171.95 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match lookup(var) {
            Err(_) => Ok(default),
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(invalid(var, format!("expected a boolean, got {other:?}"))),
            },
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("MENTIONS_ENV", "development"))?;
    let log_level = or_default("MENTIONS_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("MENTIONS_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("MENTIONS_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("MENTIONS_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scraper_request_timeout_secs = parse_u64("MENTIONS_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_user_agent = or_default("MENTIONS_SCRAPER_USER_AGENT", DEFAULT_USER_AGENT);
    let scraper_max_retries = parse_u32("MENTIONS_SCRAPER_MAX_RETRIES", "10")?;
    let scraper_retry_delay_secs = parse_u64("MENTIONS_SCRAPER_RETRY_DELAY_SECS", "15")?;
    let redirect_timeout_secs = parse_u64("MENTIONS_REDIRECT_TIMEOUT_SECS", "15")?;
    let redirect_max_hops = parse_usize("MENTIONS_REDIRECT_MAX_HOPS", "10")?;

    let directory_base_url = or_default("MENTIONS_DIRECTORY_BASE_URL", "https://tgstat.ru");
    let catalog_url = or_default("MENTIONS_CATALOG_URL", "https://card.wb.ru/cards/detail");
    let preview_base_url = or_default("MENTIONS_PREVIEW_BASE_URL", "https://t.me");
    let bridge_url = or_default("MENTIONS_BRIDGE_URL", "http://127.0.0.1:8081");
    let bridge_token = lookup("MENTIONS_BRIDGE_TOKEN").ok();

    let session_ids = parse_session_ids(&or_default("MENTIONS_SESSION_IDS", ""))?;
    let sessions_dir = PathBuf::from(or_default("MENTIONS_SESSIONS_DIR", "./sessions"));

    let live_lookback_hours = parse_u32("MENTIONS_LIVE_LOOKBACK_HOURS", "24")?;
    let directory_lookback_days = match lookup("MENTIONS_DIRECTORY_LOOKBACK_DAYS") {
        Ok(raw) if !raw.trim().is_empty() => Some(
            raw.trim()
                .parse::<u32>()
                .map_err(|e| invalid("MENTIONS_DIRECTORY_LOOKBACK_DAYS", e.to_string()))?,
        ),
        _ => None,
    };
    let preview_discovered = parse_bool("MENTIONS_PREVIEW_DISCOVERED", false)?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_retries,
        scraper_retry_delay_secs,
        redirect_timeout_secs,
        redirect_max_hops,
        directory_base_url,
        catalog_url,
        preview_base_url,
        bridge_url,
        bridge_token,
        session_ids,
        sessions_dir,
        live_lookback_hours,
        directory_lookback_days,
        preview_discovered,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "MENTIONS_ENV".to_string(),
            reason: format!("unknown environment {other:?}"),
        }),
    }
}

/// Parse a comma-separated list of session ids. Duplicates are rejected so a
/// session is never driven by two workers at once.
fn parse_session_ids(raw: &str) -> Result<Vec<i32>, ConfigError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part
            .parse::<i32>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: "MENTIONS_SESSION_IDS".to_string(),
                reason: format!("{part:?}: {e}"),
            })?;
        if ids.contains(&id) {
            return Err(ConfigError::InvalidEnvVar {
                var: "MENTIONS_SESSION_IDS".to_string(),
                reason: format!("duplicate session id {id}"),
            });
        }
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
