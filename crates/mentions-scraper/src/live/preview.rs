use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::ScraperError;

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.tgme_page_title span").expect("valid selector"));
static EXTRA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.tgme_page_extra").expect("valid selector"));
static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("leading digits pattern is valid"));

/// What the public preview page says about a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPreview {
    pub title: String,
    pub follower_count: Option<i64>,
}

/// Reads a channel preview page. Returns `None` when the page has no title,
/// which is how the site renders unknown and private channels.
#[must_use]
pub fn parse_preview(html: &str) -> Option<ChannelPreview> {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())?;

    // "12 345 subscribers" -> 12345
    let follower_count = document.select(&EXTRA).next().and_then(|e| {
        let compact: String = e.text().flat_map(str::chars).filter(|c| !c.is_whitespace()).collect();
        LEADING_DIGITS
            .find(&compact)
            .and_then(|m| m.as_str().parse().ok())
    });

    Some(ChannelPreview {
        title,
        follower_count,
    })
}

/// Fetches `https://t.me/<name>`-style preview pages for discovered links.
#[derive(Debug, Clone)]
pub struct ChannelPreviewer {
    client: reqwest::Client,
    base_url: String,
}

impl ChannelPreviewer {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout_secs: u64, user_agent: &str) -> Result<Self, ScraperError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn preview_url(&self, link: &str) -> String {
        let path = link.strip_prefix("t.me/").unwrap_or(link);
        format!("{}/{path}", self.base_url)
    }

    async fn fetch(&self, url: &str) -> Result<String, ScraperError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Fetch failures count as "no preview".
    pub async fn preview(&self, link: &str) -> Option<ChannelPreview> {
        let url = self.preview_url(link);
        match self.fetch(&url).await {
            Ok(html) => parse_preview(&html),
            Err(err) => {
                tracing::debug!(channel = link, error = %err, "preview unavailable");
                None
            }
        }
    }
}
