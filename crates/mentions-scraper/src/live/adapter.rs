use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use mentions_core::{
    engagement_rate, Channel, ContentCategory, CrawlResult, Post, TrackedChannel,
};

use super::client::{DialogKind, Message, MessagingClient};
use super::links::{is_review, ChannelLinkExtractor};
use super::preview::ChannelPreviewer;
use crate::error::ClientError;
use crate::resolve::MentionResolver;

/// What a live worker pulls out of each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Only links to other channels.
    ChannelLinks,
    /// Channel links plus product mentions.
    ChannelLinksAndProducts,
}

impl ExtractionMode {
    #[must_use]
    pub fn for_category(category: ContentCategory) -> Self {
        match category {
            ContentCategory::ProductAds => Self::ChannelLinksAndProducts,
            ContentCategory::ChannelAds | ContentCategory::AdReview => Self::ChannelLinks,
        }
    }
}

/// Short single-line form of a message body for logs.
fn excerpt(text: &str) -> String {
    text.split_whitespace()
        .filter(|word| !word.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(200)
        .collect()
}

/// Everything one worker carries between passes.
struct WorkerState {
    channels: Vec<TrackedChannel>,
    /// Remote ids the session can read.
    reachable: HashSet<i64>,
    /// Remote ids whose history has been scanned.
    processed: HashSet<i64>,
    /// Links whose join failed for a reason other than a flood wait.
    abandoned: HashSet<String>,
    entities_checked: bool,
    dialogs_listed: bool,
    links: ChannelLinkExtractor,
    result: CrawlResult,
}

impl WorkerState {
    fn new(worklist: Vec<Channel>) -> Self {
        Self {
            channels: worklist.into_iter().map(TrackedChannel::new).collect(),
            reachable: HashSet::new(),
            processed: HashSet::new(),
            abandoned: HashSet::new(),
            entities_checked: false,
            dialogs_listed: false,
            links: ChannelLinkExtractor::new(),
            result: CrawlResult::new(),
        }
    }

    fn finish(self) -> CrawlResult {
        let mut result = self.result;
        result
            .channels_to_update
            .extend(self.channels.into_iter().filter(TrackedChannel::is_dirty));
        result
    }
}

/// One live-client worker: a session, the channels bound to it, and the
/// rules for what to extract.
pub struct LiveAdapter<C> {
    client: C,
    session_id: i32,
    resolver: MentionResolver,
    previewer: Option<ChannelPreviewer>,
    mode: ExtractionMode,
    cutoff: DateTime<Utc>,
}

impl<C: MessagingClient> LiveAdapter<C> {
    #[must_use]
    pub fn new(
        client: C,
        session_id: i32,
        resolver: MentionResolver,
        mode: ExtractionMode,
        cutoff: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            session_id,
            resolver,
            previewer: None,
            mode,
            cutoff,
        }
    }

    /// Discovered links are previewed and only kept with a title.
    #[must_use]
    pub fn with_previewer(mut self, previewer: ChannelPreviewer) -> Self {
        self.previewer = Some(previewer);
        self
    }

    /// Resolves, joins and scans every channel of `worklist`.
    ///
    /// Each pass resolves what is still unresolved, then scans every
    /// reachable channel not scanned yet. A flood wait ends the pass early;
    /// the worker sleeps for the requested time and runs another pass.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for any client failure other than a flood
    /// wait or a failed join.
    pub async fn run(&self, worklist: Vec<Channel>) -> Result<CrawlResult, ClientError> {
        let mut state = WorkerState::new(worklist);

        loop {
            let join_wait = self.resolve_pass(&mut state).await?;
            let scan_wait = self.scan_pass(&mut state).await?;

            let Some(seconds) = join_wait.max(scan_wait) else {
                break;
            };
            tracing::info!(
                session = self.session_id,
                seconds,
                "flood wait requested, sleeping before next pass"
            );
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }

        let result = state.finish();
        tracing::info!(
            session = self.session_id,
            scanned = result.scanned_count,
            posts = result.posts.len(),
            discovered = result.discovered_channels.len(),
            updated = result.channels_to_update.len(),
            "live worker finished"
        );
        Ok(result)
    }

    /// Returns the flood wait that cut the pass short, if any.
    async fn resolve_pass(&self, state: &mut WorkerState) -> Result<Option<u64>, ClientError> {
        if !state.entities_checked {
            let ids: Vec<i64> = state
                .channels
                .iter()
                .filter_map(|t| t.channel.remote_id)
                .collect();
            if !ids.is_empty() {
                match self.client.resolve_entities(&ids).await {
                    Ok(found) => state.reachable.extend(found.iter().map(|r| r.id)),
                    Err(ClientError::FloodWait { seconds }) => return Ok(Some(seconds)),
                    Err(err) => return Err(err),
                }
                for id in ids.iter().filter(|id| !state.reachable.contains(*id)) {
                    tracing::warn!(session = self.session_id, remote_id = id, "channel not reachable");
                }
            }
            state.entities_checked = true;
        }

        for tracked in state
            .channels
            .iter_mut()
            .filter(|t| t.channel.remote_id.is_none())
        {
            let link = tracked.channel.link.clone();
            if state.abandoned.contains(&link) {
                continue;
            }
            match self.client.join(&link).await {
                Ok(remote) => {
                    let followers = match tracked.channel.category {
                        ContentCategory::ProductAds if tracked.channel.follower_count.is_none() => {
                            remote.participant_count
                        }
                        _ => None,
                    };
                    tracked.record_join(
                        remote.id,
                        remote.title.as_deref(),
                        self.session_id,
                        followers,
                    );
                    state.reachable.insert(remote.id);
                    tracing::info!(channel = %link, remote_id = remote.id, "joined channel");
                }
                Err(ClientError::FloodWait { seconds }) => {
                    tracing::warn!(channel = %link, seconds, "flood wait while joining");
                    return Ok(Some(seconds));
                }
                Err(err) => {
                    tracing::warn!(channel = %link, error = %err, "join failed, skipping channel");
                    state.abandoned.insert(link);
                }
            }
        }

        if !state.dialogs_listed {
            state.dialogs_listed = true;
            self.log_dialogs(&state.reachable).await;
        }

        Ok(None)
    }

    /// Lists the session's dialogs for logging. A flood wait here is logged,
    /// never returned.
    async fn log_dialogs(&self, reachable: &HashSet<i64>) {
        match self.joined_dialogs().await {
            Ok(joined) => {
                tracing::debug!(session = self.session_id, dialogs = joined.len(), "session dialogs");
                for id in reachable.iter().filter(|id| !joined.contains(*id)) {
                    tracing::debug!(remote_id = id, "reachable channel is not a session dialog");
                }
            }
            Err(err) => tracing::warn!(error = %err, "could not list session dialogs"),
        }
    }

    async fn joined_dialogs(&self) -> Result<HashSet<i64>, ClientError> {
        let mut joined = HashSet::new();
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await {
            let dialog = dialog?;
            if dialog.kind != DialogKind::User {
                joined.insert(dialog.id);
            }
        }
        Ok(joined)
    }

    /// Returns the flood wait that cut the pass short, if any.
    async fn scan_pass(&self, state: &mut WorkerState) -> Result<Option<u64>, ClientError> {
        for index in 0..state.channels.len() {
            let channel = &state.channels[index].channel;
            let Some(remote_id) = channel.remote_id else {
                continue;
            };
            if !state.reachable.contains(&remote_id) || state.processed.contains(&remote_id) {
                continue;
            }
            let Some(channel_id) = channel.id else {
                tracing::warn!(channel = %channel.link, "channel has no store id, skipping");
                state.processed.insert(remote_id);
                continue;
            };

            let mut local = CrawlResult::new();
            let outcome = self
                .scan_channel(channel, channel_id, remote_id, &mut state.links, &mut local)
                .await;
            match outcome {
                Ok(()) => {
                    state.processed.insert(remote_id);
                }
                Err(ClientError::FloodWait { seconds }) => {
                    tracing::warn!(channel = %channel.link, seconds, "flood wait while scanning");
                    // The channel is scanned again in full on the next pass.
                    local.scanned_count = 0;
                    state.result = std::mem::take(&mut state.result).merge(local);
                    return Ok(Some(seconds));
                }
                Err(err) => return Err(err),
            }
            state.result = std::mem::take(&mut state.result).merge(local);
        }
        Ok(None)
    }

    async fn scan_channel(
        &self,
        channel: &Channel,
        channel_id: i64,
        remote_id: i64,
        links: &mut ChannelLinkExtractor,
        local: &mut CrawlResult,
    ) -> Result<(), ClientError> {
        let mut history = self.client.iter_history(remote_id, self.cutoff);

        while let Some(message) = history.next().await {
            let message = message?;
            if message.text.is_empty() {
                continue;
            }
            local.scanned_count += 1;
            tracing::debug!(
                channel = %channel.link,
                message = message.id,
                date = %message.date,
                text = %excerpt(&message.text),
                "scanning message"
            );

            for link in links.extract(&message.text, &message.annotations) {
                if let Some(found) = self.discovered_channel(link).await {
                    local.add_discovered(found);
                }
            }

            if self.mode == ExtractionMode::ChannelLinksAndProducts && !message.forwarded {
                if let Some(post) = self.product_post(channel, channel_id, &message).await {
                    local.add_post(post);
                }
            }
        }

        tracing::info!(
            channel = %channel.link,
            scanned = local.scanned_count,
            posts = local.posts.len(),
            discovered = local.discovered_channels.len(),
            "channel history scanned"
        );
        Ok(())
    }

    async fn discovered_channel(&self, link: String) -> Option<Channel> {
        let mut channel = Channel::discovered(link, ContentCategory::ProductAds);
        let Some(previewer) = &self.previewer else {
            return Some(channel);
        };

        let preview = previewer.preview(&channel.link).await?;
        if is_review(&preview.title) {
            tracing::debug!(channel = %channel.link, title = %preview.title, "skipping review channel");
            return None;
        }
        channel.title = Some(preview.title);
        channel.follower_count = preview.follower_count;
        Some(channel)
    }

    async fn product_post(
        &self,
        channel: &Channel,
        channel_id: i64,
        message: &Message,
    ) -> Option<Post> {
        let targets: Vec<String> = message.annotations.iter().map(|a| a.url.clone()).collect();
        let sku_codes = self.resolver.resolve(&message.text, &targets).await;
        if sku_codes.is_empty() {
            return None;
        }
        tracing::debug!(message = message.id, codes = ?sku_codes, "message mentions products");

        let metrics = message.metrics();
        let interactions = metrics.live_interactions();
        Some(Post {
            channel_id,
            remote_message_id: message.id,
            published_at: message.date,
            metrics,
            engagement_rate: engagement_rate(interactions, channel.follower_count).unwrap_or(0.0),
            engagement_rate_by_reach: engagement_rate(interactions, Some(metrics.views)),
            sku_codes,
        })
    }
}
