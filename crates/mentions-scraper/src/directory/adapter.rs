use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mentions_core::{engagement_rate, CrawlResult, Post, TrackedChannel};
use thiserror::Error;

use super::client::DirectoryClient;
use super::parse::{canonical_link, parse_channel_page, parse_posts, ParsedPost};
use crate::error::ScraperError;
use crate::resolve::MentionResolver;

/// Posts younger than this still collect engagement and are left for a
/// later scan.
pub const SETTLE_WINDOW_HOURS: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// The channel page itself; carries the header metadata.
    First,
    /// A "load more" continuation.
    Continuation,
}

/// Receives each page of a channel scan as soon as it is processed.
#[async_trait]
pub trait PageSink: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `channel` already carries the cursor advanced by `posts`' page.
    async fn page_completed(
        &mut self,
        channel: &mut TrackedChannel,
        posts: &[Post],
        kind: PageKind,
    ) -> Result<(), Self::Error>;
}

/// Drops every page; the scan result is the only output.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardPages;

#[async_trait]
impl PageSink for DiscardPages {
    type Error = std::convert::Infallible;

    async fn page_completed(
        &mut self,
        _channel: &mut TrackedChannel,
        _posts: &[Post],
        _kind: PageKind,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ScanError<E> {
    #[error("channel {link} has no store id")]
    UnsavedChannel { link: String },
    #[error(transparent)]
    Scraper(#[from] ScraperError),
    #[error("page sink failed: {0}")]
    Sink(#[source] E),
}

/// Pagination state of one channel scan.
struct ScanProgress {
    channel_id: i64,
    prior_cursor: i64,
    now: DateTime<Utc>,
    earliest: Option<DateTime<Utc>>,
    last_id: Option<i64>,
}

impl ScanProgress {
    fn observe(&mut self, post: &ParsedPost) {
        if self.earliest.map_or(true, |e| post.published_at < e) {
            self.earliest = Some(post.published_at);
        }
        self.last_id = Some(post.remote_message_id);
    }

    fn is_eligible(&self, post: &ParsedPost, cutoff: DateTime<Utc>) -> bool {
        post.published_at > cutoff
            && self.now - post.published_at > Duration::hours(SETTLE_WINDOW_HOURS)
            && post.remote_message_id > self.prior_cursor
    }

    /// Keep paging while the listing is still newer than the cutoff and the
    /// last post seen is still newer than what the previous scan reached.
    fn should_continue(&self, cutoff: DateTime<Utc>) -> bool {
        self.earliest.map_or(true, |e| e > cutoff)
            && self.last_id.map_or(true, |id| id > self.prior_cursor)
    }
}

pub struct DirectoryAdapter {
    client: DirectoryClient,
    resolver: MentionResolver,
    cutoff: DateTime<Utc>,
}

impl DirectoryAdapter {
    #[must_use]
    pub fn new(client: DirectoryClient, resolver: MentionResolver, cutoff: DateTime<Utc>) -> Self {
        Self {
            client,
            resolver,
            cutoff,
        }
    }

    /// Scans one channel from its newest post back to the cutoff or the
    /// channel's previous cursor, handing every page to `sink` as it
    /// completes.
    ///
    /// The returned result holds every post with at least one mention and,
    /// if the channel is still dirty after the last page, the channel itself.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Scraper`] if the channel page cannot be fetched,
    /// or [`ScanError::Sink`] if a page cannot be handed off. A failed "load
    /// more" request only ends pagination.
    pub async fn scan_channel<S: PageSink>(
        &self,
        tracked: &mut TrackedChannel,
        sink: &mut S,
    ) -> Result<CrawlResult, ScanError<S::Error>> {
        let link = tracked.channel.link.clone();
        let channel_id = tracked
            .channel
            .id
            .ok_or_else(|| ScanError::UnsavedChannel { link: link.clone() })?;

        let Some(page) = self.client.fetch_channel_page(&link).await? else {
            return Ok(CrawlResult::new());
        };

        let mut progress = ScanProgress {
            channel_id,
            prior_cursor: tracked.channel.last_scanned_post_cursor.unwrap_or(-1),
            now: Utc::now(),
            earliest: None,
            last_id: None,
        };

        if let Some(canonical) = canonical_link(&page.url) {
            tracked.set_link(&canonical);
        }
        let content = parse_channel_page(&page.html, progress.now);
        if let Some(followers) = content.follower_count {
            tracked.set_follower_count(followers);
        }

        let mut result = CrawlResult::new();
        let posts = self
            .extract(tracked, &content.posts, &mut progress, &mut result)
            .await;
        finish_page(tracked, sink, posts, PageKind::First, &mut result).await?;

        let mut next = content.load_more;
        let mut follow_ups = 0u32;
        while let Some(cursor) = next.take() {
            if !progress.should_continue(self.cutoff) {
                tracing::debug!(channel = %link, "reached cutoff or previous cursor");
                break;
            }
            let response = match self.client.load_more_posts(&page.url, &cursor).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(channel = %link, error = %err, "load more failed, abandoning channel pages");
                    break;
                }
            };
            follow_ups += 1;

            let parsed = parse_posts(&response.html, progress.now);
            let posts = self
                .extract(tracked, &parsed, &mut progress, &mut result)
                .await;
            finish_page(tracked, sink, posts, PageKind::Continuation, &mut result).await?;
            next = response.next_cursor();
        }

        tracing::info!(
            channel = %tracked.channel.link,
            scanned = result.scanned_count,
            posts = result.posts.len(),
            mentions = result.mention_count(),
            follow_ups,
            cursor = ?tracked.channel.last_scanned_post_cursor,
            "channel scanned"
        );

        if tracked.is_dirty() {
            result.channels_to_update.push(tracked.clone());
        }
        Ok(result)
    }

    async fn extract(
        &self,
        tracked: &mut TrackedChannel,
        parsed: &[ParsedPost],
        progress: &mut ScanProgress,
        result: &mut CrawlResult,
    ) -> Vec<Post> {
        let mut posts = Vec::new();

        for candidate in parsed {
            result.scanned_count += 1;
            progress.observe(candidate);
            if !progress.is_eligible(candidate, self.cutoff) {
                continue;
            }
            tracked.advance_cursor(candidate.remote_message_id);

            let Some(text) = candidate.text.as_deref() else {
                tracing::debug!(post = candidate.remote_message_id, "post has no text");
                continue;
            };
            if candidate.forwarded {
                tracing::debug!(post = candidate.remote_message_id, "skipping forwarded post");
                continue;
            }

            let sku_codes = self.resolver.resolve(text, &candidate.link_targets).await;
            if sku_codes.is_empty() {
                continue;
            }
            tracing::debug!(
                post = candidate.remote_message_id,
                codes = ?sku_codes,
                "post mentions products"
            );

            let metrics = candidate.metrics;
            let interactions = metrics.directory_interactions();
            posts.push(Post {
                channel_id: progress.channel_id,
                remote_message_id: candidate.remote_message_id,
                published_at: candidate.published_at,
                metrics,
                engagement_rate: engagement_rate(interactions, tracked.channel.follower_count)
                    .unwrap_or(0.0),
                engagement_rate_by_reach: engagement_rate(interactions, Some(metrics.views)),
                sku_codes,
            });
        }
        posts
    }
}

async fn finish_page<S: PageSink>(
    tracked: &mut TrackedChannel,
    sink: &mut S,
    posts: Vec<Post>,
    kind: PageKind,
    result: &mut CrawlResult,
) -> Result<(), ScanError<S::Error>> {
    sink.page_completed(tracked, &posts, kind)
        .await
        .map_err(ScanError::Sink)?;
    for post in posts {
        result.add_post(post);
    }
    Ok(())
}
