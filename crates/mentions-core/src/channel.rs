use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// What a channel publishes. Decides which extraction a live scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    AdReview,
    ProductAds,
    ChannelAds,
}

impl ContentCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentCategory::AdReview => "ad_review",
            ContentCategory::ProductAds => "product_ads",
            ContentCategory::ChannelAds => "channel_ads",
        }
    }
}

impl std::fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ad_review" => Ok(ContentCategory::AdReview),
            "product_ads" => Ok(ContentCategory::ProductAds),
            "channel_ads" => Ok(ContentCategory::ChannelAds),
            other => Err(CoreError::InvalidCategory(other.to_string())),
        }
    }
}

/// A channel as stored. `id` is the store's primary key and is `None` until
/// the channel has been inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Option<i64>,
    pub remote_id: Option<i64>,
    pub link: String,
    pub title: Option<String>,
    pub follower_count: Option<i64>,
    pub category: ContentCategory,
    pub last_scanned_post_cursor: Option<i64>,
    pub session_id: Option<i32>,
}

impl Channel {
    /// A freshly discovered channel known only by its link.
    #[must_use]
    pub fn discovered(link: impl Into<String>, category: ContentCategory) -> Self {
        Self {
            id: None,
            remote_id: None,
            link: link.into(),
            title: None,
            follower_count: None,
            category,
            last_scanned_post_cursor: None,
            session_id: None,
        }
    }
}

/// Remote id wins when both sides know it; otherwise the link decides.
impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        match (self.remote_id, other.remote_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.link == other.link,
        }
    }
}

/// A channel together with its pending-write flag.
///
/// Every setter compares before writing so `dirty` only flips on a real
/// change. The flag is never persisted.
#[derive(Debug, Clone)]
pub struct TrackedChannel {
    pub channel: Channel,
    dirty: bool,
}

impl TrackedChannel {
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            dirty: false,
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn set_link(&mut self, link: &str) {
        if self.channel.link != link {
            self.channel.link = link.to_string();
            self.dirty = true;
        }
    }

    pub fn set_follower_count(&mut self, followers: i64) {
        if self.channel.follower_count != Some(followers) {
            self.channel.follower_count = Some(followers);
            self.dirty = true;
        }
    }

    /// Fill in what a successful join tells us. Fields already known are
    /// left alone, except the session binding which always follows the
    /// session that performed the join.
    pub fn record_join(
        &mut self,
        remote_id: i64,
        title: Option<&str>,
        session_id: i32,
        followers: Option<i64>,
    ) {
        if self.channel.remote_id.is_none() {
            self.channel.remote_id = Some(remote_id);
            self.dirty = true;
        }
        if self.channel.title.is_none() {
            if let Some(title) = title {
                self.channel.title = Some(title.to_string());
                self.dirty = true;
            }
        }
        if self.channel.session_id != Some(session_id) {
            self.channel.session_id = Some(session_id);
            self.dirty = true;
        }
        if self.channel.follower_count.is_none() {
            if let Some(followers) = followers {
                self.channel.follower_count = Some(followers);
                self.dirty = true;
            }
        }
    }

    /// Move the scan cursor forward. Returns `false` and leaves the channel
    /// untouched when `remote_message_id` is not past the current cursor.
    pub fn advance_cursor(&mut self, remote_message_id: i64) -> bool {
        match self.channel.last_scanned_post_cursor {
            Some(current) if current >= remote_message_id => false,
            _ => {
                self.channel.last_scanned_post_cursor = Some(remote_message_id);
                self.dirty = true;
                true
            }
        }
    }
}

/// Canonical `t.me/<name>` (or `t.me/+<hash>` for invite links) form of a
/// channel reference. Returns `None` for anything that is not a channel link.
///
/// Accepts full URLs on `t.me`, `telegram.me` and `telegram.dog`, `tg://join`
/// invites, `joinchat/` paths and bare `@name` mentions.
#[must_use]
pub fn normalize_channel_link(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');

    if let Some(name) = trimmed.strip_prefix('@') {
        return valid_name(name).then(|| format!("t.me/{name}"));
    }

    if let Some(hash) = trimmed.strip_prefix("tg://join?invite=") {
        return valid_name(hash).then(|| format!("t.me/+{hash}"));
    }

    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);

    let path = ["t.me/", "telegram.me/", "telegram.dog/"]
        .iter()
        .find_map(|host| without_www.strip_prefix(host))?;
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let first = path.split('/').next().unwrap_or_default();

    if let Some(hash) = first.strip_prefix('+') {
        return valid_name(hash).then(|| format!("t.me/+{hash}"));
    }
    if first == "joinchat" {
        let hash = path.split('/').nth(1).unwrap_or_default();
        return valid_name(hash).then(|| format!("t.me/+{hash}"));
    }
    let name = first.strip_prefix('@').unwrap_or(first);
    valid_name(name).then(|| format!("t.me/{name}"))
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(remote_id: Option<i64>, link: &str) -> Channel {
        Channel {
            remote_id,
            ..Channel::discovered(link, ContentCategory::ProductAds)
        }
    }

    #[test]
    fn equality_prefers_remote_id() {
        assert_eq!(channel(Some(1), "t.me/a"), channel(Some(1), "t.me/b"));
        assert_ne!(channel(Some(1), "t.me/a"), channel(Some(2), "t.me/a"));
    }

    #[test]
    fn equality_falls_back_to_link() {
        assert_eq!(channel(None, "t.me/a"), channel(Some(7), "t.me/a"));
        assert_ne!(channel(None, "t.me/a"), channel(None, "t.me/b"));
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in [
            ContentCategory::AdReview,
            ContentCategory::ProductAds,
            ContentCategory::ChannelAds,
        ] {
            assert_eq!(category.as_str().parse::<ContentCategory>().unwrap(), category);
        }
        assert!("wb_items_ads".parse::<ContentCategory>().is_err());
    }

    #[test]
    fn setters_only_dirty_on_change() {
        let mut tracked = TrackedChannel::new(Channel {
            follower_count: Some(10),
            ..channel(None, "t.me/a")
        });
        tracked.set_follower_count(10);
        tracked.set_link("t.me/a");
        assert!(!tracked.is_dirty());

        tracked.set_follower_count(11);
        assert!(tracked.is_dirty());
        assert_eq!(tracked.channel.follower_count, Some(11));
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let mut tracked = TrackedChannel::new(Channel {
            last_scanned_post_cursor: Some(50),
            ..channel(None, "t.me/a")
        });
        assert!(!tracked.advance_cursor(40));
        assert!(!tracked.advance_cursor(50));
        assert!(!tracked.is_dirty());
        assert!(tracked.advance_cursor(51));
        assert_eq!(tracked.channel.last_scanned_post_cursor, Some(51));
        assert!(tracked.is_dirty());
    }

    #[test]
    fn cursor_starts_from_nothing() {
        let mut tracked = TrackedChannel::new(channel(None, "t.me/a"));
        assert!(tracked.advance_cursor(1));
        assert_eq!(tracked.channel.last_scanned_post_cursor, Some(1));
    }

    #[test]
    fn record_join_keeps_known_fields() {
        let mut tracked = TrackedChannel::new(Channel {
            title: Some("Known".to_string()),
            follower_count: Some(5),
            ..channel(None, "t.me/a")
        });
        tracked.record_join(99, Some("Remote"), 2, Some(500));
        assert!(tracked.is_dirty());
        assert_eq!(tracked.channel.remote_id, Some(99));
        assert_eq!(tracked.channel.title.as_deref(), Some("Known"));
        assert_eq!(tracked.channel.follower_count, Some(5));
        assert_eq!(tracked.channel.session_id, Some(2));
    }

    #[test]
    fn normalizes_channel_link_spellings() {
        let cases = [
            ("https://t.me/deals", Some("t.me/deals")),
            ("http://telegram.me/deals/", Some("t.me/deals")),
            ("telegram.dog/deals", Some("t.me/deals")),
            ("@deals", Some("t.me/deals")),
            ("t.me/@deals", Some("t.me/deals")),
            ("https://t.me/deals/1234", Some("t.me/deals")),
            ("https://t.me/+AbC_d", Some("t.me/+AbC_d")),
            ("https://t.me/joinchat/AbC", Some("t.me/+AbC")),
            ("tg://join?invite=XyZ", Some("t.me/+XyZ")),
            ("https://example.com/deals", None),
            ("@", None),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                normalize_channel_link(raw).as_deref(),
                expected,
                "normalizing {raw}"
            );
        }
    }
}
