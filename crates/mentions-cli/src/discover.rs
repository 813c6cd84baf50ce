use clap::Subcommand;
use mentions_core::{AppConfig, CrawlResult};
use mentions_db::CrawlKind;
use mentions_scraper::directory::discover_category;

use crate::crawl::{build_catalog, directory_options, ledger_count, open_directory_session};
use crate::fail_run_best_effort;

/// Sub-commands available under `discover`.
#[derive(Debug, Subcommand)]
pub enum DiscoverCommands {
    /// Collect channels listed on a directory category page
    Category {
        /// Category page URL (e.g. https://tgstat.ru/beauty)
        url: String,
        /// Maximum number of channels to collect
        #[arg(long, default_value = "100")]
        limit: usize,
        /// Print the channels without storing them
        #[arg(long)]
        dry_run: bool,
    },
}

/// # Errors
///
/// Returns an error if the category cannot be read or the channels cannot
/// be stored.
pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: DiscoverCommands,
) -> anyhow::Result<()> {
    let DiscoverCommands::Category {
        url,
        limit,
        dry_run,
    } = command;

    let client = open_directory_session(&directory_options(config, None)).await?;

    if dry_run {
        let channels = discover_category(&client, &url, limit).await?;
        println!("{} channels listed under {url}", channels.len());
        for channel in &channels {
            println!(
                "  {} ({})",
                channel.link,
                channel.title.as_deref().unwrap_or("untitled")
            );
        }
        return Ok(());
    }

    let run = mentions_db::create_crawl_run(pool, CrawlKind::Category, "cli").await?;
    if let Err(e) = mentions_db::start_crawl_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, CrawlKind::Category, format!("{e:#}")).await;
        return Err(e.into());
    }

    let upload = async {
        let channels = discover_category(&client, &url, limit).await?;
        let catalog = build_catalog(config)?;
        let mut result = CrawlResult::new();
        for channel in channels {
            result.add_discovered(channel);
        }
        let summary = mentions_db::upload_crawl_result(pool, &catalog, result).await?;
        Ok::<_, anyhow::Error>(summary)
    };

    match upload.await {
        Ok(summary) => {
            mentions_db::complete_crawl_run(pool, run.id, ledger_count(summary.new_channel_count))
                .await?;
            println!(
                "discovered {} new channels under {url}",
                summary.new_channel_count
            );
            Ok(())
        }
        Err(e) => {
            fail_run_best_effort(pool, run.id, CrawlKind::Category, format!("{e:#}")).await;
            Err(e)
        }
    }
}
