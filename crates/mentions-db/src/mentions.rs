//! Read-only mention reports.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// One mention joined with its post, channel and brand.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MentionRow {
    pub channel_link: String,
    pub channel_title: Option<String>,
    pub follower_count: Option<i64>,
    pub remote_message_id: i64,
    pub published_at: DateTime<Utc>,
    pub views: i64,
    pub engagement_rate: f64,
    pub sku_code: i64,
    pub brand_name: String,
}

const MENTION_SELECT: &str = "SELECT c.link AS channel_link, c.title AS channel_title, \
            c.follower_count, p.remote_message_id, p.published_at, p.views, \
            p.engagement_rate, m.sku_code, b.name AS brand_name \
     FROM mentions m \
     JOIN posts p ON p.id = m.post_id \
     JOIN channels c ON c.id = p.channel_id \
     JOIN skus s ON s.code = m.sku_code \
     JOIN brands b ON b.id = s.brand_id";

/// Returns every mention of `sku_code`, newest post first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn mentions_by_sku(pool: &PgPool, sku_code: i64) -> Result<Vec<MentionRow>, DbError> {
    let rows = sqlx::query_as::<_, MentionRow>(&format!(
        "{MENTION_SELECT} WHERE m.sku_code = $1 \
         ORDER BY p.published_at DESC, c.link, m.sku_code"
    ))
    .bind(sku_code)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns every mention of any sku belonging to the brand named `brand_name`
/// (case-insensitive), newest post first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn mentions_by_brand(
    pool: &PgPool,
    brand_name: &str,
) -> Result<Vec<MentionRow>, DbError> {
    let rows = sqlx::query_as::<_, MentionRow>(&format!(
        "{MENTION_SELECT} WHERE LOWER(b.name) = LOWER($1) \
         ORDER BY p.published_at DESC, c.link, m.sku_code"
    ))
    .bind(brand_name)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
