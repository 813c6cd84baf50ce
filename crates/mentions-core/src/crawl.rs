use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::channel::{Channel, TrackedChannel};
use crate::post::{Post, PostKey};

/// Everything one worker produced during a crawl.
///
/// Results from different workers combine with [`CrawlResult::merge`], which
/// is associative and commutative up to the order of `channels_to_update`.
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    pub posts: BTreeMap<PostKey, Post>,
    /// Channels seen for the first time, deduplicated by channel equality.
    pub discovered_channels: Vec<Channel>,
    pub channels_to_update: Vec<TrackedChannel>,
    /// Messages or posts examined, whether or not they produced a mention.
    pub scanned_count: u64,
}

impl CrawlResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a post. A second post under the same key only contributes its
    /// product codes. Returns `true` if the key was new.
    pub fn add_post(&mut self, post: Post) -> bool {
        match self.posts.entry(post.key()) {
            Entry::Vacant(slot) => {
                slot.insert(post);
                true
            }
            Entry::Occupied(mut slot) => {
                slot.get_mut().sku_codes.extend(post.sku_codes);
                false
            }
        }
    }

    /// Record a discovered channel unless an equal one is already present.
    pub fn add_discovered(&mut self, channel: Channel) -> bool {
        if self.discovered_channels.contains(&channel) {
            return false;
        }
        self.discovered_channels.push(channel);
        true
    }

    #[must_use]
    pub fn mention_count(&self) -> usize {
        self.posts.values().map(|p| p.sku_codes.len()).sum()
    }

    #[must_use]
    pub fn merge(mut self, other: CrawlResult) -> CrawlResult {
        for post in other.posts.into_values() {
            self.add_post(post);
        }
        for channel in other.discovered_channels {
            self.add_discovered(channel);
        }
        self.channels_to_update.extend(other.channels_to_update);
        self.scanned_count += other.scanned_count;
        self
    }
}

impl FromIterator<CrawlResult> for CrawlResult {
    fn from_iter<I: IntoIterator<Item = CrawlResult>>(iter: I) -> Self {
        iter.into_iter().fold(CrawlResult::new(), CrawlResult::merge)
    }
}
