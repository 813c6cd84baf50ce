use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use mentions_core::EngagementMetrics;
use serde::Deserialize;

use crate::error::ClientError;

/// A channel as the messaging server knows it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteChannel {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub participant_count: Option<i64>,
}

/// A hyperlink embedded in a message: its display text and its target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkAnnotation {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub id: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<LinkAnnotation>,
    #[serde(default)]
    pub forwarded: bool,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub forwards: Option<i64>,
    #[serde(default)]
    pub replies: Option<i64>,
    /// One count per reaction kind.
    #[serde(default)]
    pub reaction_counts: Vec<i64>,
}

impl Message {
    /// Replies double as comments; the messaging server reports one thread
    /// count for both.
    #[must_use]
    pub fn metrics(&self) -> EngagementMetrics {
        let replies = self.replies.unwrap_or(0);
        EngagementMetrics {
            views: self.views.unwrap_or(0),
            shares: self.forwards.unwrap_or(0),
            replies,
            comments: replies,
            reactions: self.reaction_counts.iter().sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogKind {
    User,
    Group,
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Dialog {
    pub id: i64,
    pub kind: DialogKind,
    #[serde(default)]
    pub title: Option<String>,
}

/// One logged-in messaging session.
///
/// Every method may fail with [`ClientError::FloodWait`] when the server
/// throttles the session.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Looks up channels by remote id. Unknown ids are left out.
    async fn resolve_entities(&self, ids: &[i64]) -> Result<Vec<RemoteChannel>, ClientError>;

    /// Joins a channel by public (`t.me/name`) or invite (`t.me/+hash`)
    /// link. A channel the session already belongs to is returned as is.
    async fn join(&self, link: &str) -> Result<RemoteChannel, ClientError>;

    /// Messages of a channel posted strictly after `after`, oldest first.
    fn iter_history(
        &self,
        channel_id: i64,
        after: DateTime<Utc>,
    ) -> BoxStream<'_, Result<Message, ClientError>>;

    fn iter_dialogs(&self) -> BoxStream<'_, Result<Dialog, ClientError>>;
}

/// Opens one client per (session, proxy) pair.
#[async_trait]
pub trait ClientConnector: Send + Sync {
    type Client: MessagingClient + 'static;

    async fn connect(
        &self,
        session_id: i32,
        proxy_url: Option<&str>,
    ) -> Result<Self::Client, ClientError>;
}
