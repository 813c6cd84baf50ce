//! Database operations for the `channels` table.

use chrono::{DateTime, Utc};
use mentions_core::{Channel, ContentCategory, TrackedChannel};
use sqlx::{PgConnection, PgPool};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `channels` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelRow {
    pub id: i64,
    pub remote_id: Option<i64>,
    pub link: String,
    pub title: Option<String>,
    pub follower_count: Option<i64>,
    pub category: String,
    pub last_scanned_post_cursor: Option<i64>,
    pub session_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidCategory`] if the stored category is not one
    /// this build knows about.
    pub fn into_channel(self) -> Result<Channel, DbError> {
        let category = self
            .category
            .parse::<ContentCategory>()
            .map_err(|_| DbError::InvalidCategory {
                id: self.id,
                value: self.category.clone(),
            })?;
        Ok(Channel {
            id: Some(self.id),
            remote_id: self.remote_id,
            link: self.link,
            title: self.title,
            follower_count: self.follower_count,
            category,
            last_scanned_post_cursor: self.last_scanned_post_cursor,
            session_id: self.session_id,
        })
    }
}

const CHANNEL_COLUMNS: &str = "id, remote_id, link, title, follower_count, category, \
     last_scanned_post_cursor, session_id, created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns every channel in `category`, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidCategory`] for rows with an unknown category.
pub async fn list_channels_by_category(
    pool: &PgPool,
    category: ContentCategory,
) -> Result<Vec<Channel>, DbError> {
    let rows = sqlx::query_as::<_, ChannelRow>(&format!(
        "SELECT {CHANNEL_COLUMNS} FROM channels WHERE category = $1 ORDER BY id"
    ))
    .bind(category.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ChannelRow::into_channel).collect()
}

/// Returns the channel stored under `link`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_channel_by_link(pool: &PgPool, link: &str) -> Result<Option<Channel>, DbError> {
    let row = sqlx::query_as::<_, ChannelRow>(&format!(
        "SELECT {CHANNEL_COLUMNS} FROM channels WHERE link = $1"
    ))
    .bind(link)
    .fetch_optional(pool)
    .await?;

    row.map(ChannelRow::into_channel).transpose()
}

/// Inserts a channel unless one already exists with the same remote id or
/// link. The existing row is never modified.
///
/// Returns `true` if a row was inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_channel_if_absent(
    conn: &mut PgConnection,
    channel: &Channel,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO channels \
             (remote_id, link, title, follower_count, category, last_scanned_post_cursor, session_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT DO NOTHING",
    )
    .bind(channel.remote_id)
    .bind(&channel.link)
    .bind(&channel.title)
    .bind(channel.follower_count)
    .bind(channel.category.as_str())
    .bind(channel.last_scanned_post_cursor)
    .bind(channel.session_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Writes the full channel snapshot and stamps `updated_at`.
///
/// Does nothing when the channel is not dirty; clears the flag after writing.
/// The stored cursor never moves backwards, and a link or remote id already
/// claimed by another row is left unchanged rather than failing the write.
///
/// Returns `true` if a row was written.
///
/// # Errors
///
/// Returns [`DbError::UnsavedChannel`] if the channel has no store id, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_channel(
    conn: &mut PgConnection,
    tracked: &mut TrackedChannel,
) -> Result<bool, DbError> {
    if !tracked.is_dirty() {
        return Ok(false);
    }
    let channel = &tracked.channel;
    let id = channel.id.ok_or_else(|| DbError::UnsavedChannel {
        link: channel.link.clone(),
    })?;

    sqlx::query(
        "UPDATE channels c SET \
             remote_id = CASE WHEN EXISTS \
                 (SELECT 1 FROM channels o WHERE o.remote_id = $2 AND o.id <> c.id) \
                 THEN c.remote_id ELSE $2 END, \
             link = CASE WHEN EXISTS \
                 (SELECT 1 FROM channels o WHERE o.link = $3 AND o.id <> c.id) \
                 THEN c.link ELSE $3 END, \
             title = $4, \
             follower_count = $5, \
             category = $6, \
             last_scanned_post_cursor = GREATEST(c.last_scanned_post_cursor, $7), \
             session_id = $8, \
             updated_at = NOW() \
         WHERE c.id = $1",
    )
    .bind(id)
    .bind(channel.remote_id)
    .bind(&channel.link)
    .bind(&channel.title)
    .bind(channel.follower_count)
    .bind(channel.category.as_str())
    .bind(channel.last_scanned_post_cursor)
    .bind(channel.session_id)
    .execute(conn)
    .await?;

    tracked.mark_clean();
    Ok(true)
}

/// Writes only the scan cursor. `updated_at` is left alone.
///
/// Does nothing when the channel is not dirty; clears the flag after writing.
///
/// # Errors
///
/// Returns [`DbError::UnsavedChannel`] if the channel has no store id, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_channel_cursor(
    conn: &mut PgConnection,
    tracked: &mut TrackedChannel,
) -> Result<bool, DbError> {
    if !tracked.is_dirty() {
        return Ok(false);
    }
    let channel = &tracked.channel;
    let id = channel.id.ok_or_else(|| DbError::UnsavedChannel {
        link: channel.link.clone(),
    })?;

    sqlx::query(
        "UPDATE channels \
         SET last_scanned_post_cursor = GREATEST(last_scanned_post_cursor, $2) \
         WHERE id = $1",
    )
    .bind(id)
    .bind(channel.last_scanned_post_cursor)
    .execute(conn)
    .await?;

    tracked.mark_clean();
    Ok(true)
}
