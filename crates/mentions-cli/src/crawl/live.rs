use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use mentions_core::{AppConfig, ContentCategory, CrawlResult};
use mentions_db::CrawlKind;
use mentions_scraper::live::{BridgeConnector, ChannelPreviewer};
use mentions_scraper::{ClientConnector, ExtractionMode, LiveAdapter};
use tokio::task::JoinSet;
use tracing::Instrument;

use super::partition::{partition_live, LiveAssignment};
use super::{build_catalog, build_resolver, ledger_count};
use crate::fail_run_best_effort;

fn print_assignments(assignments: &[LiveAssignment]) {
    println!("{} live workers", assignments.len());
    for assignment in assignments {
        println!(
            "  session {} via {}: {} channels",
            assignment.session_id,
            assignment.proxy_url,
            assignment.channels.len()
        );
        for channel in &assignment.channels {
            println!("    {}", channel.link);
        }
    }
}

/// Reads every tracked channel of `category` through the configured
/// messaging sessions and uploads the merged result.
///
/// # Errors
///
/// Returns an error if the worklist cannot be loaded, no worker can be
/// formed, every worker fails, or the upload fails.
pub(crate) async fn run_live_crawl(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    category: ContentCategory,
    dry_run: bool,
) -> anyhow::Result<()> {
    let channels = mentions_db::list_channels_by_category(pool, category).await?;
    let proxy_urls: Vec<String> = mentions_db::list_active_proxies(pool)
        .await?
        .iter()
        .map(|p| p.socks5_url().unwrap_or_else(|| p.http_url()))
        .collect();

    let assignments = partition_live(channels, &config.session_ids, &proxy_urls);

    if dry_run {
        print_assignments(&assignments);
        return Ok(());
    }
    if assignments.is_empty() {
        anyhow::bail!(
            "no live workers: {} sessions, {} active proxies, or no {category} channels",
            config.session_ids.len(),
            proxy_urls.len()
        );
    }

    let connector = Arc::new(
        BridgeConnector::new(
            &config.bridge_url,
            config.bridge_token.clone(),
            config.sessions_dir.clone(),
            config.scraper_request_timeout_secs,
        )
        .context("failed to build session connector")?,
    );
    let resolver = build_resolver(config)?;
    let previewer = if config.preview_discovered {
        Some(
            ChannelPreviewer::new(
                &config.preview_base_url,
                config.scraper_request_timeout_secs,
                &config.scraper_user_agent,
            )
            .context("failed to build channel previewer")?,
        )
    } else {
        None
    };
    let catalog = build_catalog(config)?;
    let mode = ExtractionMode::for_category(category);
    let cutoff = Utc::now() - Duration::hours(i64::from(config.live_lookback_hours));

    let run = mentions_db::create_crawl_run(pool, CrawlKind::Live, "cli").await?;
    if let Err(e) = mentions_db::start_crawl_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, CrawlKind::Live, format!("{e:#}")).await;
        return Err(e.into());
    }

    let worker_count = assignments.len();
    let mut workers = JoinSet::new();
    for assignment in assignments {
        let connector = Arc::clone(&connector);
        let resolver = resolver.clone();
        let previewer = previewer.clone();
        let session = assignment.session_id;

        workers.spawn(
            async move {
                let client = connector
                    .connect(assignment.session_id, Some(assignment.proxy_url.as_str()))
                    .await?;
                let mut adapter =
                    LiveAdapter::new(client, assignment.session_id, resolver, mode, cutoff);
                if let Some(previewer) = previewer {
                    adapter = adapter.with_previewer(previewer);
                }
                adapter.run(assignment.channels).await
            }
            .instrument(tracing::info_span!("worker", session)),
        );
    }

    let mut results = Vec::with_capacity(worker_count);
    let mut failed = 0usize;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(e)) => {
                failed += 1;
                tracing::error!(error = %e, "live worker failed; its results are dropped");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(error = %e, "live worker panicked; its results are dropped");
            }
        }
    }

    if failed == worker_count {
        let message = format!("all {worker_count} live workers failed");
        fail_run_best_effort(pool, run.id, CrawlKind::Live, message.clone()).await;
        anyhow::bail!(message);
    }

    let merged: CrawlResult = results.into_iter().collect();
    let scanned = merged.scanned_count;

    let summary = match mentions_db::upload_crawl_result(pool, &catalog, merged).await {
        Ok(summary) => summary,
        Err(e) => {
            fail_run_best_effort(pool, run.id, CrawlKind::Live, format!("{e:#}")).await;
            return Err(e.into());
        }
    };

    mentions_db::complete_crawl_run(pool, run.id, ledger_count(summary.new_mention_count)).await?;

    println!(
        "live crawl complete: {scanned} messages scanned, {} failed workers, \
         {} new posts, {} new mentions, {} new channels, {} channels updated, \
         {} skus discarded",
        failed,
        summary.new_post_count,
        summary.new_mention_count,
        summary.new_channel_count,
        summary.updated_channel_count,
        summary.discarded_sku_count
    );
    Ok(())
}
