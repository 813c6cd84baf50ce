//! HTML extraction for directory channel pages, post lists and category
//! listings. Everything here is synchronous and returns owned data.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Months, NaiveDateTime, TimeZone, Utc};
use mentions_core::EngagementMetrics;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static FOLLOWERS: LazyLock<Selector> = LazyLock::new(|| selector("h2.mb-1.text-dark"));
static POST: LazyLock<Selector> = LazyLock::new(|| selector("div.post-container"));
static POST_DATE: LazyLock<Selector> = LazyLock::new(|| selector("small"));
static POST_TEXT: LazyLock<Selector> = LazyLock::new(|| selector("div.post-text"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static VIEWS_ICON: LazyLock<Selector> = LazyLock::new(|| selector("i.uil-eye"));
static SHARES_ICON: LazyLock<Selector> = LazyLock::new(|| selector("i.uil-share-alt"));
static REPLIES_ICON: LazyLock<Selector> = LazyLock::new(|| selector("i.uil-corner-up-right"));
static COMMENTS_ICON: LazyLock<Selector> = LazyLock::new(|| selector("i.uil-comments-alt"));
static REACTIONS_ICON: LazyLock<Selector> = LazyLock::new(|| selector("i.uil-thumbs-up"));
static LOAD_MORE: LazyLock<Selector> = LazyLock::new(|| selector("div.lm-button-container"));
static LOAD_MORE_PAGE: LazyLock<Selector> = LazyLock::new(|| selector("input.lm-page"));
static LOAD_MORE_OFFSET: LazyLock<Selector> = LazyLock::new(|| selector("input.lm-offset"));
static LIST_CONTAINER: LazyLock<Selector> = LazyLock::new(|| selector("div.lm-list-container"));
static LISTING: LazyLock<Selector> = LazyLock::new(|| selector("a.text-body[href]"));
static LISTING_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("div.font-16"));
static BOLD: LazyLock<Selector> = LazyLock::new(|| selector("b"));

static POST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)/stat").expect("post id pattern is valid"));
static COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:(?:\.(\d))?(k))?").expect("count pattern is valid")
});
static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@?[A-Za-z_0-9\-]+$").expect("slug pattern is valid"));

const FORWARDED_CLASS: &str = "post-body-forwarded";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The (page, offset) pair a "load more" request continues from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMoreCursor {
    pub page: String,
    pub offset: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPost {
    pub remote_message_id: i64,
    pub published_at: DateTime<Utc>,
    /// `None` when the post has no text block (media only).
    pub text: Option<String>,
    pub link_targets: Vec<String>,
    pub forwarded: bool,
    pub metrics: EngagementMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelPageContent {
    pub follower_count: Option<i64>,
    pub posts: Vec<ParsedPost>,
    pub load_more: Option<LoadMoreCursor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryListing {
    pub link: String,
    pub title: Option<String>,
    pub follower_count: Option<i64>,
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// `t.me/name` becomes `@name`, `t.me/+hash` becomes `hash`.
#[must_use]
pub fn directory_slug(link: &str) -> Option<String> {
    let path = link.strip_prefix("t.me/")?;
    if path.is_empty() {
        return None;
    }
    Some(match path.strip_prefix('+') {
        Some(hash) => hash.to_owned(),
        None => format!("@{path}"),
    })
}

/// Inverse of [`directory_slug`].
#[must_use]
pub fn link_from_slug(slug: &str) -> String {
    match slug.strip_prefix('@') {
        Some(name) => format!("t.me/{name}"),
        None => format!("t.me/+{slug}"),
    }
}

/// Channel link named by the last path segment of a channel page URL.
#[must_use]
pub fn canonical_link(page_url: &str) -> Option<String> {
    let path = page_url.split(['?', '#']).next().unwrap_or_default();
    SLUG.find(path).map(|m| link_from_slug(m.as_str()))
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Parses `01 Mar 2024, 12:00`, or `01 Mar, 12:00` in the year of `now`.
///
/// A year-less date that would lie in the future belongs to the previous year.
#[must_use]
pub fn parse_post_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.chars().count() > 14 {
        let naive = NaiveDateTime::parse_from_str(text, "%d %b %Y, %H:%M").ok()?;
        return Some(Utc.from_utc_datetime(&naive));
    }
    let with_year = format!("{text} {}", now.year());
    let naive = NaiveDateTime::parse_from_str(&with_year, "%d %b, %H:%M %Y").ok()?;
    let date = Utc.from_utc_datetime(&naive);
    if date > now {
        return date.checked_sub_months(Months::new(12));
    }
    Some(date)
}

/// Parses counters like `42`, `12k` or `1.2k`. Anything else counts as zero.
#[must_use]
pub fn parse_count(text: &str) -> i64 {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let Some(caps) = COUNT.captures(&compact) else {
        return 0;
    };
    let whole: i64 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    if caps.get(3).is_none() {
        return whole;
    }
    let tenths: i64 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    whole * 1000 + tenths * 100
}

fn digits_only(text: &str) -> Option<i64> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact.parse().ok()
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn parent_element(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.parent().and_then(ElementRef::wrap)
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// Value shown next to `icon` in the post footer `row`.
fn icon_count(row: ElementRef<'_>, icon: &Selector) -> i64 {
    row.select(icon)
        .next()
        .and_then(parent_element)
        .map_or(0, |holder| parse_count(&text_of(holder)))
}

fn parse_post(post: ElementRef<'_>, now: DateTime<Utc>) -> Option<ParsedPost> {
    let date_text = post.select(&POST_DATE).next().map(text_of)?;
    let published_at = parse_post_date(&date_text, now)?;

    let views_link = post.select(&VIEWS_ICON).next().and_then(parent_element)?;
    let href = views_link.value().attr("href")?;
    let remote_message_id = POST_ID
        .captures_iter(href)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())?;

    let row = parent_element(views_link)?;
    let metrics = EngagementMetrics {
        views: parse_count(&text_of(views_link)),
        shares: icon_count(row, &SHARES_ICON),
        replies: icon_count(row, &REPLIES_ICON),
        comments: icon_count(row, &COMMENTS_ICON),
        reactions: icon_count(row, &REACTIONS_ICON),
    };

    let text_block = post.select(&POST_TEXT).next();
    let forwarded = text_block
        .and_then(parent_element)
        .is_some_and(|p| p.value().classes().any(|c| c == FORWARDED_CLASS));
    let link_targets = text_block
        .map(|block| {
            block
                .select(&ANCHOR)
                .filter_map(|a| a.value().attr("href"))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Some(ParsedPost {
        remote_message_id,
        published_at,
        text: text_block.map(text_of),
        link_targets,
        forwarded,
        metrics,
    })
}

fn posts_in(document: &Html, now: DateTime<Utc>) -> Vec<ParsedPost> {
    document
        .select(&POST)
        .filter_map(|post| {
            let parsed = parse_post(post, now);
            if parsed.is_none() {
                tracing::warn!("skipping post without a readable date or id");
            }
            parsed
        })
        .collect()
}

/// First element matching `selector` inside `container` or after it among
/// its siblings.
fn input_after<'a>(container: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    container.select(selector).next().or_else(|| {
        container
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find_map(|sibling| {
                if selector.matches(&sibling) {
                    Some(sibling)
                } else {
                    sibling.select(selector).next()
                }
            })
    })
}

fn load_more_cursor(document: &Html) -> Option<LoadMoreCursor> {
    let button = document.select(&LOAD_MORE).next()?;
    let page = input_after(button, &LOAD_MORE_PAGE)?.value().attr("value")?;
    let offset = input_after(button, &LOAD_MORE_OFFSET)?.value().attr("value")?;
    Some(LoadMoreCursor {
        page: page.to_owned(),
        offset: offset.to_owned(),
    })
}

/// Parses a full channel page: header metadata, visible posts and the
/// "load more" cursor.
#[must_use]
pub fn parse_channel_page(html: &str, now: DateTime<Utc>) -> ChannelPageContent {
    let document = Html::parse_document(html);
    ChannelPageContent {
        follower_count: document
            .select(&FOLLOWERS)
            .next()
            .and_then(|h| digits_only(&text_of(h))),
        posts: posts_in(&document, now),
        load_more: load_more_cursor(&document),
    }
}

/// Parses the HTML fragment of a "load more" response.
#[must_use]
pub fn parse_posts(html: &str, now: DateTime<Utc>) -> Vec<ParsedPost> {
    posts_in(&Html::parse_fragment(html), now)
}

// ---------------------------------------------------------------------------
// Category listings
// ---------------------------------------------------------------------------

fn parse_listing(anchor: ElementRef<'_>) -> Option<CategoryListing> {
    let href = anchor.value().attr("href")?;
    let (_, slug) = href.split_once("/channel/")?;
    let slug = slug.trim_end_matches('/');
    if slug.is_empty() {
        return None;
    }
    Some(CategoryListing {
        link: link_from_slug(slug),
        title: anchor
            .select(&LISTING_TITLE)
            .next()
            .map(|t| text_of(t).trim().to_owned()),
        follower_count: anchor
            .select(&BOLD)
            .next()
            .and_then(|b| digits_only(&text_of(b))),
    })
}

/// Listings from the first list container of a category page, plus the
/// "load more" cursor.
#[must_use]
pub fn parse_category_page(html: &str) -> (Vec<CategoryListing>, Option<LoadMoreCursor>) {
    let document = Html::parse_document(html);
    let listings = document
        .select(&LIST_CONTAINER)
        .next()
        .map(|container| container.select(&LISTING).filter_map(parse_listing).collect())
        .unwrap_or_default();
    (listings, load_more_cursor(&document))
}

#[must_use]
pub fn parse_category_items(html: &str) -> Vec<CategoryListing> {
    Html::parse_fragment(html)
        .select(&LISTING)
        .filter_map(parse_listing)
        .collect()
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
