//! Crawl command handlers.
//!
//! Both crawls split their worklist across workers, one per proxy (and, for
//! live crawls, per messaging session), and record themselves in the
//! `crawl_runs` ledger. A worker that fails loses its own results only; the
//! run fails when every worker does.

mod directory;
mod live;
mod partition;

use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use mentions_core::{AppConfig, ContentCategory};
use mentions_scraper::directory::DirectoryClientOptions;
use mentions_scraper::{CatalogClient, DirectoryClient, MentionResolver, RedirectResolver};

pub(crate) use directory::run_directory_crawl;
pub(crate) use live::run_live_crawl;

/// Sub-commands available under `crawl`.
#[derive(Debug, Subcommand)]
pub enum CrawlCommands {
    /// Read tracked channels through the messaging sessions
    Live {
        /// Channel category to crawl (product_ads, channel_ads, ad_review)
        #[arg(long, default_value = "product_ads")]
        category: ContentCategory,
        /// Show the worker assignment without crawling
        #[arg(long)]
        dry_run: bool,
    },
    /// Read product-ad channels from the directory site
    Directory {
        /// Crawl a single stored channel (e.g. t.me/deals)
        #[arg(long)]
        channel: Option<String>,
        /// Show the worker assignment without crawling
        #[arg(long)]
        dry_run: bool,
    },
}

/// # Errors
///
/// Returns an error if the selected crawl fails as a whole.
pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: CrawlCommands,
) -> anyhow::Result<()> {
    match command {
        CrawlCommands::Live { category, dry_run } => {
            run_live_crawl(pool, config, category, dry_run).await
        }
        CrawlCommands::Directory { channel, dry_run } => {
            run_directory_crawl(pool, config, channel.as_deref(), dry_run).await
        }
    }
}

pub(crate) fn build_resolver(config: &AppConfig) -> anyhow::Result<MentionResolver> {
    let redirects = RedirectResolver::new(
        config.redirect_timeout_secs,
        &config.scraper_user_agent,
        config.redirect_max_hops,
    )
    .context("failed to build redirect resolver")?;
    Ok(MentionResolver::new(Arc::new(redirects)))
}

pub(crate) fn build_catalog(config: &AppConfig) -> anyhow::Result<CatalogClient> {
    CatalogClient::new(
        &config.catalog_url,
        config.scraper_request_timeout_secs,
        &config.scraper_user_agent,
        config.scraper_max_retries,
        config.scraper_retry_delay_secs,
    )
    .context("failed to build catalog client")
}

pub(crate) fn directory_options(
    config: &AppConfig,
    proxy_url: Option<String>,
) -> DirectoryClientOptions {
    DirectoryClientOptions {
        base_url: config.directory_base_url.clone(),
        timeout_secs: config.scraper_request_timeout_secs,
        user_agent: config.scraper_user_agent.clone(),
        proxy_url,
        max_retries: config.scraper_max_retries,
        retry_delay_secs: config.scraper_retry_delay_secs,
    }
}

pub(crate) async fn open_directory_session(
    options: &DirectoryClientOptions,
) -> anyhow::Result<DirectoryClient> {
    DirectoryClient::connect(options)
        .await
        .with_context(|| format!("failed to open directory session at {}", options.base_url))
}

/// `records_processed` value for the run ledger.
pub(crate) fn ledger_count(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use mentions_scraper::ScraperError;

    use super::*;

    #[tokio::test]
    async fn failed_session_keeps_the_scraper_error_in_the_chain() {
        let options = DirectoryClientOptions {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 1,
            user_agent: "mentions-test/0.1".to_string(),
            proxy_url: None,
            max_retries: 0,
            retry_delay_secs: 0,
        };

        let err = open_directory_session(&options).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed to open directory session at http://127.0.0.1:1"
        );
        assert!(matches!(
            err.downcast_ref::<ScraperError>(),
            Some(ScraperError::Http(_))
        ));
        assert!(err.chain().count() >= 2);
    }
}
