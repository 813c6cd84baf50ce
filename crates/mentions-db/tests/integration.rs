//! Offline tests for mentions-db configuration and row conversions.
//! These tests do not require a live database connection.

use chrono::Utc;
use mentions_core::{AppConfig, ContentCategory, Environment};
use mentions_db::{ChannelRow, CrawlKind, DbError, PoolConfig};

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        scraper_request_timeout_secs: 30,
        scraper_user_agent: "ua".to_string(),
        scraper_max_retries: 3,
        scraper_retry_delay_secs: 1,
        redirect_timeout_secs: 15,
        redirect_max_hops: 10,
        directory_base_url: "https://directory.example".to_string(),
        catalog_url: "https://catalog.example/cards/detail".to_string(),
        preview_base_url: "https://t.me".to_string(),
        bridge_url: "http://127.0.0.1:8081".to_string(),
        bridge_token: None,
        session_ids: vec![1, 2],
        sessions_dir: "./sessions".into(),
        live_lookback_hours: 24,
        directory_lookback_days: None,
        preview_discovered: false,
    }
}

fn channel_row(category: &str) -> ChannelRow {
    ChannelRow {
        id: 5,
        remote_id: Some(123),
        link: "t.me/deals".to_string(),
        title: Some("Deals".to_string()),
        follower_count: Some(900),
        category: category.to_string(),
        last_scanned_post_cursor: Some(40),
        session_id: Some(2),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn channel_row_converts_into_channel() {
    let channel = channel_row("channel_ads").into_channel().unwrap();
    assert_eq!(channel.id, Some(5));
    assert_eq!(channel.remote_id, Some(123));
    assert_eq!(channel.category, ContentCategory::ChannelAds);
    assert_eq!(channel.last_scanned_post_cursor, Some(40));
    assert_eq!(channel.session_id, Some(2));
}

#[test]
fn channel_row_with_unknown_category_is_rejected() {
    let err = channel_row("wb_items_ads").into_channel().unwrap_err();
    assert!(matches!(err, DbError::InvalidCategory { id: 5, ref value } if value == "wb_items_ads"));
}

#[test]
fn crawl_kinds_match_schema_values() {
    assert_eq!(CrawlKind::Live.as_str(), "live");
    assert_eq!(CrawlKind::Directory.as_str(), "directory");
    assert_eq!(CrawlKind::Category.as_str(), "category");
}
