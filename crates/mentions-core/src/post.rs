use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store identity of a post: the owning channel's id plus the message id the
/// source assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostKey {
    pub channel_id: i64,
    pub remote_message_id: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub views: i64,
    pub shares: i64,
    pub replies: i64,
    pub comments: i64,
    pub reactions: i64,
}

impl EngagementMetrics {
    /// Interactions counted for messages read through the live client.
    #[must_use]
    pub fn live_interactions(&self) -> i64 {
        self.replies + self.reactions
    }

    /// Interactions counted for posts read from the directory site, which
    /// reports comments separately from replies.
    #[must_use]
    pub fn directory_interactions(&self) -> i64 {
        self.replies + self.reactions + self.comments
    }
}

/// `interactions / denominator * 100`, or `None` when the denominator is
/// missing or not positive.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn engagement_rate(interactions: i64, denominator: Option<i64>) -> Option<f64> {
    match denominator {
        Some(d) if d > 0 => Some(interactions as f64 / d as f64 * 100.0),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub channel_id: i64,
    pub remote_message_id: i64,
    pub published_at: DateTime<Utc>,
    pub metrics: EngagementMetrics,
    pub engagement_rate: f64,
    pub engagement_rate_by_reach: Option<f64>,
    /// Resolved product codes; each becomes one mention on upload.
    pub sku_codes: BTreeSet<i64>,
}

impl Post {
    #[must_use]
    pub fn key(&self) -> PostKey {
        PostKey {
            channel_id: self.channel_id,
            remote_message_id: self.remote_message_id,
        }
    }

    #[must_use]
    pub fn has_mentions(&self) -> bool {
        !self.sku_codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn engagement_rate_is_a_percentage() {
        let rate = engagement_rate(5, Some(200)).unwrap();
        assert!((rate - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn engagement_rate_guards_zero_and_missing_denominators() {
        assert_eq!(engagement_rate(5, Some(0)), None);
        assert_eq!(engagement_rate(5, Some(-3)), None);
        assert_eq!(engagement_rate(5, None), None);
    }

    #[test]
    fn interaction_sums_differ_by_source() {
        let metrics = EngagementMetrics {
            views: 1000,
            shares: 4,
            replies: 3,
            comments: 2,
            reactions: 10,
        };
        assert_eq!(metrics.live_interactions(), 13);
        assert_eq!(metrics.directory_interactions(), 15);
    }

    #[test]
    fn only_posts_with_codes_have_mentions() {
        let mut post = Post {
            channel_id: 1,
            remote_message_id: 9,
            published_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            metrics: EngagementMetrics::default(),
            engagement_rate: 0.0,
            engagement_rate_by_reach: None,
            sku_codes: BTreeSet::new(),
        };
        assert!(!post.has_mentions());

        post.sku_codes.insert(12_345_678);
        assert!(post.has_mentions());
    }
}
