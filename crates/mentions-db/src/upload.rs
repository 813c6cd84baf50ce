//! Persisting crawl output: channels, brands, skus, posts and mentions.
//!
//! Brand lookups go to the external catalog before a transaction is opened
//! so no transaction is held across a network call.

use std::collections::{BTreeSet, HashMap, HashSet};

use mentions_core::{BrandCatalog, BrandRecord, CrawlResult, Post, TrackedChannel};
use sqlx::{Connection, PgConnection, PgPool};

use crate::brands::{existing_sku_codes, insert_brand_if_absent, insert_sku_if_absent};
use crate::channels::{insert_channel_if_absent, update_channel, update_channel_cursor};
use crate::posts::insert_post_if_absent;
use crate::DbError;

/// Counts reported after an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub new_channel_count: usize,
    pub updated_channel_count: usize,
    pub new_sku_count: usize,
    pub discarded_sku_count: usize,
    pub new_post_count: usize,
    pub new_mention_count: usize,
}

impl UploadSummary {
    pub fn absorb(&mut self, other: UploadSummary) {
        self.new_channel_count += other.new_channel_count;
        self.updated_channel_count += other.updated_channel_count;
        self.new_sku_count += other.new_sku_count;
        self.discarded_sku_count += other.discarded_sku_count;
        self.new_post_count += other.new_post_count;
        self.new_mention_count += other.new_mention_count;
    }
}

/// How a channel update is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelWrite {
    /// Full snapshot; stamps `updated_at`.
    Snapshot,
    /// Cursor correction only; leaves `updated_at` alone.
    CursorOnly,
}

/// Codes split by what the store and the catalog know about them.
#[derive(Debug, Default)]
struct ResolvedSkus {
    stored: HashSet<i64>,
    new: HashMap<i64, BrandRecord>,
    discarded: usize,
}

impl ResolvedSkus {
    fn keeps(&self, code: i64) -> bool {
        self.stored.contains(&code) || self.new.contains_key(&code)
    }
}

async fn resolve_skus<C>(
    conn: &mut PgConnection,
    catalog: &C,
    codes: &BTreeSet<i64>,
) -> Result<ResolvedSkus, DbError>
where
    C: BrandCatalog + ?Sized,
{
    if codes.is_empty() {
        return Ok(ResolvedSkus::default());
    }
    let all: Vec<i64> = codes.iter().copied().collect();
    let stored: HashSet<i64> = existing_sku_codes(conn, &all).await?.into_iter().collect();
    let unknown: Vec<i64> = all.into_iter().filter(|c| !stored.contains(c)).collect();
    if unknown.is_empty() {
        return Ok(ResolvedSkus {
            stored,
            ..ResolvedSkus::default()
        });
    }

    let brands = catalog.lookup_brands(&unknown).await?;
    let mut new = HashMap::new();
    let mut discarded = 0;
    for code in unknown {
        match brands.get(&code) {
            Some(brand) if brand.external_id != 0 => {
                new.insert(code, brand.clone());
            }
            _ => {
                tracing::debug!(sku = code, "no brand in catalog; discarding sku");
                discarded += 1;
            }
        }
    }
    Ok(ResolvedSkus {
        stored,
        new,
        discarded,
    })
}

async fn store_skus(
    conn: &mut PgConnection,
    resolved: &ResolvedSkus,
    summary: &mut UploadSummary,
) -> Result<(), DbError> {
    for (code, brand) in &resolved.new {
        let brand_row = insert_brand_if_absent(&mut *conn, brand.external_id, &brand.name).await?;
        if insert_sku_if_absent(&mut *conn, *code, brand_row.id).await? {
            summary.new_sku_count += 1;
        }
    }
    summary.discarded_sku_count += resolved.discarded;
    Ok(())
}

async fn store_posts<'a>(
    conn: &mut PgConnection,
    posts: impl IntoIterator<Item = &'a Post>,
    resolved: &ResolvedSkus,
    summary: &mut UploadSummary,
) -> Result<(), DbError> {
    for post in posts {
        if !post.has_mentions() {
            continue;
        }
        let codes: Vec<i64> = post
            .sku_codes
            .iter()
            .copied()
            .filter(|c| resolved.keeps(*c))
            .collect();
        if let Some(mentions) = insert_post_if_absent(&mut *conn, post, &codes).await? {
            summary.new_post_count += 1;
            summary.new_mention_count += mentions;
        }
    }
    Ok(())
}

fn codes_of<'a>(posts: impl IntoIterator<Item = &'a Post>) -> BTreeSet<i64> {
    posts
        .into_iter()
        .flat_map(|p| p.sku_codes.iter().copied())
        .collect()
}

/// Persist a merged crawl result in one transaction.
///
/// Order: discovered channels are inserted if absent, dirty channels get a
/// full snapshot update, new skus are attached to their catalog brand (codes
/// without a brand are dropped from every post), then posts that still carry
/// at least one mention are inserted if absent.
///
/// # Errors
///
/// Returns [`DbError::Catalog`] if the brand lookup fails, or
/// [`DbError::Sqlx`] if any statement fails. Nothing is committed on error.
pub async fn upload_crawl_result<C>(
    pool: &PgPool,
    catalog: &C,
    mut result: CrawlResult,
) -> Result<UploadSummary, DbError>
where
    C: BrandCatalog + ?Sized,
{
    let mut summary = UploadSummary::default();

    let mut conn = pool.acquire().await?;
    let resolved = resolve_skus(&mut conn, catalog, &codes_of(result.posts.values())).await?;

    let mut tx = conn.begin().await?;

    for channel in &result.discovered_channels {
        if insert_channel_if_absent(&mut tx, channel).await? {
            summary.new_channel_count += 1;
        }
    }
    for tracked in &mut result.channels_to_update {
        if update_channel(&mut tx, tracked).await? {
            summary.updated_channel_count += 1;
        }
    }

    store_skus(&mut tx, &resolved, &mut summary).await?;
    store_posts(&mut tx, result.posts.values(), &resolved, &mut summary).await?;

    tx.commit().await?;

    tracing::info!(
        new_channels = summary.new_channel_count,
        updated_channels = summary.updated_channel_count,
        new_skus = summary.new_sku_count,
        discarded_skus = summary.discarded_sku_count,
        new_posts = summary.new_post_count,
        new_mentions = summary.new_mention_count,
        "crawl result uploaded"
    );
    Ok(summary)
}

/// Persist one finished page of a single channel's scan: its posts plus the
/// channel's own update, in one transaction on `conn`.
///
/// # Errors
///
/// Returns [`DbError::Catalog`] if the brand lookup fails, or
/// [`DbError::Sqlx`] if any statement fails. Nothing is committed on error
/// and the channel keeps its dirty flag.
pub async fn persist_page<C>(
    conn: &mut PgConnection,
    catalog: &C,
    tracked: &mut TrackedChannel,
    posts: &[Post],
    write: ChannelWrite,
) -> Result<UploadSummary, DbError>
where
    C: BrandCatalog + ?Sized,
{
    let mut summary = UploadSummary::default();
    let resolved = resolve_skus(&mut *conn, catalog, &codes_of(posts)).await?;

    let mut tx = conn.begin().await?;
    store_skus(&mut tx, &resolved, &mut summary).await?;
    store_posts(&mut tx, posts, &resolved, &mut summary).await?;

    // Work on a copy so a failed commit leaves the caller's flag set.
    let mut pending = tracked.clone();
    let written = match write {
        ChannelWrite::Snapshot => update_channel(&mut tx, &mut pending).await?,
        ChannelWrite::CursorOnly => update_channel_cursor(&mut tx, &mut pending).await?,
    };
    tx.commit().await?;

    if written {
        summary.updated_channel_count += 1;
        tracked.mark_clean();
    }
    Ok(summary)
}
