use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client, Response};

use super::patterns;
use super::LinkResolver;
use crate::error::ScraperError;

/// Bytes of the final page scanned for a product link; the rest is dropped.
pub const REDIRECT_BODY_LIMIT: usize = 256 * 1024;

async fn read_capped(mut response: Response, limit: usize) -> Result<String, ScraperError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= limit {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Follows redirect chains by hand so every intermediate URL can be checked
/// for a product link before the final page body is scanned.
pub struct RedirectResolver {
    client: Client,
    max_hops: usize,
}

impl RedirectResolver {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn new(timeout_secs: u64, user_agent: &str, max_hops: usize) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client, max_hops })
    }

    async fn follow(&self, link: &str) -> Result<Option<i64>, ScraperError> {
        let mut url = if link.starts_with("http") {
            link.to_owned()
        } else {
            format!("http://{link}")
        };

        for _ in 0..=self.max_hops {
            let response = self.client.get(&url).send().await?;
            if !response.status().is_redirection() {
                let body = read_capped(response, REDIRECT_BODY_LIMIT).await?;
                return Ok(patterns::product_code(&body));
            }

            let Some(location) = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return Ok(None);
            };
            let next = response
                .url()
                .join(location)
                .map_err(|e| ScraperError::InvalidUrl {
                    url: location.to_owned(),
                    reason: e.to_string(),
                })?;
            if let Some(code) = patterns::product_code(next.as_str()) {
                return Ok(Some(code));
            }
            url = next.to_string();
        }

        tracing::debug!(link, max_hops = self.max_hops, "redirect chain too long");
        Ok(None)
    }
}

#[async_trait]
impl LinkResolver for RedirectResolver {
    async fn resolve(&self, link: &str) -> Option<i64> {
        match self.follow(link).await {
            Ok(code) => code,
            Err(err) => {
                tracing::debug!(link, error = %err, "redirect resolution failed");
                None
            }
        }
    }
}
