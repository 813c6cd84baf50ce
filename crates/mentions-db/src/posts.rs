//! Database operations for the `posts` and `mentions` tables.

use chrono::{DateTime, Utc};
use mentions_core::Post;
use sqlx::PgConnection;

use crate::DbError;

/// A row from the `posts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub channel_id: i64,
    pub remote_message_id: i64,
    pub published_at: DateTime<Utc>,
    pub views: i64,
    pub shares: i64,
    pub replies: i64,
    pub comments: i64,
    pub reactions: i64,
    pub engagement_rate: f64,
    pub engagement_rate_by_reach: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Inserts `post` and one mention per code in `sku_codes`.
///
/// Nothing is written when `sku_codes` is empty or a post with the same
/// `(channel_id, remote_message_id)` already exists. Existing posts are never
/// updated.
///
/// Returns the number of mentions written, or `None` if the post was skipped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn insert_post_if_absent(
    conn: &mut PgConnection,
    post: &Post,
    sku_codes: &[i64],
) -> Result<Option<usize>, DbError> {
    if sku_codes.is_empty() {
        return Ok(None);
    }

    let post_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO posts \
             (channel_id, remote_message_id, published_at, views, shares, replies, comments, \
              reactions, engagement_rate, engagement_rate_by_reach) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (channel_id, remote_message_id) DO NOTHING \
         RETURNING id",
    )
    .bind(post.channel_id)
    .bind(post.remote_message_id)
    .bind(post.published_at)
    .bind(post.metrics.views)
    .bind(post.metrics.shares)
    .bind(post.metrics.replies)
    .bind(post.metrics.comments)
    .bind(post.metrics.reactions)
    .bind(post.engagement_rate)
    .bind(post.engagement_rate_by_reach)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(post_id) = post_id else {
        return Ok(None);
    };

    let result = sqlx::query(
        "INSERT INTO mentions (post_id, sku_code) \
         SELECT $1, code FROM UNNEST($2::BIGINT[]) AS code \
         ON CONFLICT (post_id, sku_code) DO NOTHING",
    )
    .bind(post_id)
    .bind(sku_codes)
    .execute(&mut *conn)
    .await?;

    Ok(Some(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX)))
}
