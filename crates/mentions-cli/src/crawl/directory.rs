use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mentions_core::{
    normalize_channel_link, AppConfig, Channel, ContentCategory, Post, TrackedChannel,
};
use mentions_db::{ChannelWrite, CrawlKind, DbError, UploadSummary};
use mentions_scraper::directory::ScanError;
use mentions_scraper::{CatalogClient, DirectoryAdapter, PageKind, PageSink};
use sqlx::PgConnection;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::partition::partition_directory;
use super::{
    build_catalog, build_resolver, directory_options, ledger_count, open_directory_session,
};
use crate::fail_run_best_effort;

/// Writes each finished page straight to the store, so a worker that dies
/// mid-channel keeps everything up to its last page.
struct DbPageSink<'a> {
    conn: &'a mut PgConnection,
    catalog: &'a CatalogClient,
    summary: UploadSummary,
}

#[async_trait]
impl PageSink for DbPageSink<'_> {
    type Error = DbError;

    async fn page_completed(
        &mut self,
        channel: &mut TrackedChannel,
        posts: &[Post],
        kind: PageKind,
    ) -> Result<(), DbError> {
        let write = match kind {
            PageKind::First => ChannelWrite::Snapshot,
            PageKind::Continuation => ChannelWrite::CursorOnly,
        };
        let page =
            mentions_db::persist_page(&mut *self.conn, self.catalog, channel, posts, write).await?;
        self.summary.absorb(page);
        Ok(())
    }
}

/// Per-worker tallies.
#[derive(Debug, Default)]
struct WorkerOutcome {
    channels: usize,
    skipped: usize,
    scanned: u64,
    summary: UploadSummary,
}

async fn run_worker(
    pool: sqlx::PgPool,
    adapter: DirectoryAdapter,
    catalog: Arc<CatalogClient>,
    channels: Vec<Channel>,
) -> anyhow::Result<WorkerOutcome> {
    let mut conn = pool.acquire().await?;
    let mut sink = DbPageSink {
        conn: &mut *conn,
        catalog: catalog.as_ref(),
        summary: UploadSummary::default(),
    };

    let total = channels.len();
    let mut outcome = WorkerOutcome::default();
    for (index, channel) in channels.into_iter().enumerate() {
        let mut tracked = TrackedChannel::new(channel);
        match adapter.scan_channel(&mut tracked, &mut sink).await {
            Ok(result) => {
                outcome.channels += 1;
                outcome.scanned += result.scanned_count;
            }
            Err(ScanError::Scraper(e)) => {
                outcome.skipped += 1;
                tracing::warn!(channel = %tracked.channel.link, error = %e, "channel page failed, skipping");
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(done = index + 1, total, "directory progress");
    }

    outcome.summary = sink.summary;
    Ok(outcome)
}

async fn worklist(pool: &sqlx::PgPool, channel: Option<&str>) -> anyhow::Result<Vec<Channel>> {
    let Some(raw) = channel else {
        return Ok(mentions_db::list_channels_by_category(pool, ContentCategory::ProductAds).await?);
    };
    let link = normalize_channel_link(raw).unwrap_or_else(|| raw.to_string());
    match mentions_db::get_channel_by_link(pool, &link).await? {
        Some(found) => Ok(vec![found]),
        None => anyhow::bail!("channel {link} is not stored"),
    }
}

/// Scans product-ad channels (or the single `channel`) on the directory
/// site, persisting each page as it is read.
///
/// # Errors
///
/// Returns an error if the worklist cannot be loaded, or if every worker
/// fails.
pub(crate) async fn run_directory_crawl(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    channel: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let channels = worklist(pool, channel).await?;

    let mut proxy_urls: Vec<Option<String>> = mentions_db::list_active_proxies(pool)
        .await?
        .iter()
        .map(|p| Some(p.http_url()))
        .collect();
    if proxy_urls.is_empty() {
        proxy_urls.push(None);
    }

    let chunks = partition_directory(channels, proxy_urls.len());

    if dry_run {
        println!("{} directory workers", chunks.len());
        for (chunk, proxy) in chunks.iter().zip(&proxy_urls) {
            println!(
                "  via {}: {} channels",
                proxy.as_deref().unwrap_or("direct"),
                chunk.len()
            );
            for channel in chunk {
                println!("    {}", channel.link);
            }
        }
        return Ok(());
    }
    if chunks.is_empty() {
        println!("no channels to crawl");
        return Ok(());
    }

    let resolver = build_resolver(config)?;
    let catalog = Arc::new(build_catalog(config)?);
    let cutoff = config
        .directory_lookback_days
        .map_or(DateTime::<Utc>::MIN_UTC, |days| {
            Utc::now() - Duration::days(i64::from(days))
        });

    let run = mentions_db::create_crawl_run(pool, CrawlKind::Directory, "cli").await?;
    if let Err(e) = mentions_db::start_crawl_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, CrawlKind::Directory, format!("{e:#}")).await;
        return Err(e.into());
    }

    let worker_count = chunks.len();
    let mut workers = JoinSet::new();
    for (worker, (chunk, proxy_url)) in chunks.into_iter().zip(proxy_urls).enumerate() {
        let options = directory_options(config, proxy_url);
        let pool = pool.clone();
        let resolver = resolver.clone();
        let catalog = Arc::clone(&catalog);

        workers.spawn(
            async move {
                let client = open_directory_session(&options).await?;
                let adapter = DirectoryAdapter::new(client, resolver, cutoff);
                run_worker(pool, adapter, catalog, chunk).await
            }
            .instrument(tracing::info_span!("worker", worker)),
        );
    }

    let mut total = WorkerOutcome::default();
    let mut failed = 0usize;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(outcome)) => {
                total.channels += outcome.channels;
                total.skipped += outcome.skipped;
                total.scanned += outcome.scanned;
                total.summary.absorb(outcome.summary);
            }
            Ok(Err(e)) => {
                failed += 1;
                tracing::error!(error = %e, "directory worker failed");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(error = %e, "directory worker panicked");
            }
        }
    }

    if failed == worker_count {
        let message = format!("all {worker_count} directory workers failed");
        fail_run_best_effort(pool, run.id, CrawlKind::Directory, message.clone()).await;
        anyhow::bail!(message);
    }

    mentions_db::complete_crawl_run(
        pool,
        run.id,
        ledger_count(total.summary.new_mention_count),
    )
    .await?;

    println!(
        "directory crawl complete: {} channels ({} skipped), {} posts scanned, \
         {failed} failed workers, {} new posts, {} new mentions, {} skus discarded",
        total.channels,
        total.skipped,
        total.scanned,
        total.summary.new_post_count,
        total.summary.new_mention_count,
        total.summary.discarded_sku_count
    );
    Ok(())
}
