//! HTTP session against the channel directory site.
//!
//! One client owns one cookie jar and, optionally, one proxy. The session
//! token the site expects on "load more" requests is read from the cookies
//! set by its landing page when the client connects. Without it the session
//! still opens; channel pages need no token and "load more" sends it empty.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{header, Client, Proxy, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use super::parse::{directory_slug, LoadMoreCursor};
use crate::error::ScraperError;
use crate::retry::retry_fixed;

static CSRF_COOKIE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_tgstat_csrk=(.+?)%").expect("csrf cookie pattern is valid"));

const AJAX_HEADER: &str = "X-Requested-With";
const AJAX_VALUE: &str = "XMLHttpRequest";

#[derive(Debug, Clone)]
pub struct DirectoryClientOptions {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub proxy_url: Option<String>,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

/// A channel page and the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct ChannelPage {
    pub url: String,
    pub html: String,
}

/// Body of a "load more" answer.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadMoreResponse {
    #[serde(default)]
    pub html: String,
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
    #[serde(rename = "nextPage", default, deserialize_with = "token")]
    pub next_page: Option<String>,
    #[serde(rename = "nextOffset", default, deserialize_with = "token")]
    pub next_offset: Option<String>,
}

impl LoadMoreResponse {
    /// Cursor for the following request, or `None` once the listing is exhausted.
    #[must_use]
    pub fn next_cursor(&self) -> Option<LoadMoreCursor> {
        if !self.has_more {
            return None;
        }
        Some(LoadMoreCursor {
            page: self.next_page.clone()?,
            offset: self.next_offset.clone()?,
        })
    }
}

/// Page and offset tokens arrive as numbers or strings.
fn token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        },
    )
}

fn csrf_from_cookie(cookie: &str) -> Option<String> {
    CSRF_COOKIE
        .captures(cookie)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

fn check_status(response: Response, url: &str) -> Result<Response, ScraperError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ScraperError::NotFound {
            url: url.to_owned(),
        });
    }
    if !status.is_success() {
        return Err(ScraperError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }
    Ok(response)
}

async fn read_json<T: DeserializeOwned>(response: Response, context: &str) -> Result<T, ScraperError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| ScraperError::Deserialize {
        context: context.to_owned(),
        source,
    })
}

/// The directory answers unknown channels with a small JSON object carrying
/// a `status` key instead of a page.
fn is_status_reply(body: &str) -> bool {
    serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(body)
        .is_ok_and(|object| object.contains_key("status"))
}

async fn fetch_csrf_token(client: &Client, base_url: &str) -> Result<Option<String>, ScraperError> {
    let response = check_status(client.get(base_url).send().await?, base_url)?;
    Ok(response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(csrf_from_cookie))
}

#[derive(Debug)]
pub struct DirectoryClient {
    client: Client,
    base_url: String,
    csrf_token: Option<String>,
    max_retries: u32,
    retry_delay_secs: u64,
}

impl DirectoryClient {
    /// Builds the HTTP client and opens a session on the landing page.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the client cannot be built or the
    /// landing page cannot be fetched.
    pub async fn connect(options: &DirectoryClientOptions) -> Result<Self, ScraperError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(options.timeout_secs))
            .user_agent(&options.user_agent);
        if let Some(proxy) = &options.proxy_url {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let client = builder.build()?;
        let base_url = options.base_url.trim_end_matches('/').to_owned();

        let csrf_token = retry_fixed(options.max_retries, options.retry_delay_secs, || {
            fetch_csrf_token(&client, &base_url)
        })
        .await?;
        if csrf_token.is_none() {
            tracing::warn!(
                base_url = %base_url,
                "landing page set no session token; load more requests send it empty"
            );
        }
        tracing::debug!(base_url = %base_url, "directory session opened");

        Ok(Self {
            client,
            base_url,
            csrf_token,
            max_retries: options.max_retries,
            retry_delay_secs: options.retry_delay_secs,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    /// Directory page URL for a `t.me/...` channel link.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] if `link` is not a `t.me` link.
    pub fn channel_url(&self, link: &str) -> Result<String, ScraperError> {
        let slug = directory_slug(link).ok_or_else(|| ScraperError::InvalidUrl {
            url: link.to_owned(),
            reason: "not a t.me channel link".to_owned(),
        })?;
        Ok(format!("{}/channel/{slug}", self.base_url))
    }

    /// Fetches the channel page for `link`. Returns `None` when the directory
    /// does not know the channel.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError`] for malformed links, or once retries on
    /// transient failures are exhausted.
    pub async fn fetch_channel_page(&self, link: &str) -> Result<Option<ChannelPage>, ScraperError> {
        let url = self.channel_url(link)?;

        let fetched = retry_fixed(self.max_retries, self.retry_delay_secs, || async {
            let response = check_status(self.client.get(&url).send().await?, &url)?;
            let final_url = response.url().to_string();
            Ok::<_, ScraperError>(ChannelPage {
                url: final_url,
                html: response.text().await?,
            })
        })
        .await;

        let page = match fetched {
            Ok(page) => page,
            Err(ScraperError::NotFound { .. }) => {
                tracing::warn!(channel = link, url = %url, "channel not found in directory");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if is_status_reply(&page.html) {
            tracing::warn!(channel = link, url = %url, "directory has no page for channel");
            return Ok(None);
        }
        Ok(Some(page))
    }

    /// Requests the next batch of posts of a channel page.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Deserialize`] for an unreadable answer, or any
    /// transport error once retries are exhausted.
    pub async fn load_more_posts(
        &self,
        channel_url: &str,
        cursor: &LoadMoreCursor,
    ) -> Result<LoadMoreResponse, ScraperError> {
        let url = format!("{}/posts-last", channel_url.trim_end_matches('/'));
        let form = [
            ("_tgstat_csrk", self.csrf_token().unwrap_or_default()),
            ("date", "0"),
            ("q", ""),
            ("hideDeleted", "0"),
            ("hideDeleted", "1"),
            ("hideForwards", "0"),
            ("page", cursor.page.as_str()),
            ("offset", cursor.offset.as_str()),
        ];

        retry_fixed(self.max_retries, self.retry_delay_secs, || async {
            let response = self
                .client
                .post(&url)
                .header(AJAX_HEADER, AJAX_VALUE)
                .form(&form)
                .send()
                .await?;
            read_json(check_status(response, &url)?, "load more posts").await
        })
        .await
    }

    /// Fetches any directory page as text.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::NotFound`] for a 404, or any transport error
    /// once retries are exhausted.
    pub async fn fetch_page(&self, url: &str) -> Result<String, ScraperError> {
        retry_fixed(self.max_retries, self.retry_delay_secs, || async {
            let response = check_status(self.client.get(url).send().await?, url)?;
            Ok::<_, ScraperError>(response.text().await?)
        })
        .await
    }

    /// Requests the next batch of channels of a category listing.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Deserialize`] for an unreadable answer, or any
    /// transport error once retries are exhausted.
    pub async fn load_more_listings(
        &self,
        category_url: &str,
        cursor: &LoadMoreCursor,
    ) -> Result<LoadMoreResponse, ScraperError> {
        let url = format!("{}/items", category_url.trim_end_matches('/'));
        let form = [
            ("_tgstat_csrk", self.csrf_token().unwrap_or_default()),
            ("peer_type", "channel"),
            ("sort_channel", "members"),
            ("sort_chat", "members"),
            ("page", cursor.page.as_str()),
            ("offset", cursor.offset.as_str()),
        ];

        retry_fixed(self.max_retries, self.retry_delay_secs, || async {
            let response = self
                .client
                .get(&url)
                .header(AJAX_HEADER, AJAX_VALUE)
                .form(&form)
                .send()
                .await?;
            read_json(check_status(response, &url)?, "load more listings").await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_token_is_read_up_to_the_first_escape() {
        assert_eq!(
            csrf_from_cookie("_tgstat_csrk=abc123%3A%22x; path=/; HttpOnly").as_deref(),
            Some("abc123")
        );
        assert_eq!(csrf_from_cookie("other=1; path=/"), None);
    }

    #[test]
    fn status_reply_is_detected() {
        assert!(is_status_reply(r#"{"status": "error"}"#));
        assert!(!is_status_reply("<html></html>"));
        assert!(!is_status_reply(r#"{"html": ""}"#));
    }

    #[test]
    fn load_more_tokens_accept_numbers_and_strings() {
        let response: LoadMoreResponse = serde_json::from_str(
            r#"{"html": "", "hasMore": true, "nextPage": 3, "nextOffset": "60"}"#,
        )
        .unwrap();
        assert_eq!(
            response.next_cursor(),
            Some(LoadMoreCursor {
                page: "3".to_string(),
                offset: "60".to_string()
            })
        );
    }

    #[test]
    fn exhausted_listing_has_no_cursor() {
        let response: LoadMoreResponse =
            serde_json::from_str(r#"{"html": "", "hasMore": false, "nextPage": 3}"#).unwrap();
        assert_eq!(response.next_cursor(), None);
    }
}
