use mentions_core::{Channel, ContentCategory};

use super::client::DirectoryClient;
use super::parse::{parse_category_items, parse_category_page, CategoryListing};
use crate::error::ScraperError;

fn push_listings(found: &mut Vec<Channel>, listings: Vec<CategoryListing>, limit: usize) {
    for listing in listings {
        if found.len() >= limit {
            return;
        }
        let channel = Channel {
            title: listing.title,
            follower_count: listing.follower_count,
            ..Channel::discovered(listing.link, ContentCategory::ProductAds)
        };
        if found.contains(&channel) {
            continue;
        }
        tracing::info!(
            index = found.len(),
            channel = %channel.link,
            title = channel.title.as_deref().unwrap_or_default(),
            followers = ?channel.follower_count,
            "listed channel"
        );
        found.push(channel);
    }
}

/// Lists up to `limit` channels from a directory category page such as
/// `https://<directory>/beauty`, following "load more" as needed.
///
/// # Errors
///
/// Returns [`ScraperError`] if the category page or a continuation cannot be
/// fetched or read.
pub async fn discover_category(
    client: &DirectoryClient,
    category_url: &str,
    limit: usize,
) -> Result<Vec<Channel>, ScraperError> {
    let url = category_url.trim_end_matches('/');
    let html = client.fetch_page(url).await?;
    let (listings, mut next) = parse_category_page(&html);

    let mut found = Vec::new();
    push_listings(&mut found, listings, limit);

    while found.len() < limit {
        let Some(cursor) = next.take() else {
            break;
        };
        let response = client.load_more_listings(url, &cursor).await?;
        push_listings(&mut found, parse_category_items(&response.html), limit);
        next = response.next_cursor();
    }

    Ok(found)
}
