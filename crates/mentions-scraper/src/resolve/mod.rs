//! Product-code extraction from post text and link targets.
//!
//! Resolution order for one post:
//!
//! 1. links that already are product links give their code directly;
//! 2. other links are followed through their redirects;
//! 3. scheme-less product links in the plain text are picked up;
//! 4. codes equal to a `size=` value in the text are dropped.
//!
//! Visited links are remembered only for the duration of one call.

mod patterns;
mod redirect;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

pub use redirect::{RedirectResolver, REDIRECT_BODY_LIMIT};

/// Turns a link that is not itself a product link into a product code.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Returns `None` when the link leads nowhere useful or cannot be fetched.
    async fn resolve(&self, link: &str) -> Option<i64>;
}

#[derive(Clone)]
pub struct MentionResolver {
    links: Arc<dyn LinkResolver>,
}

impl MentionResolver {
    #[must_use]
    pub fn new(links: Arc<dyn LinkResolver>) -> Self {
        Self { links }
    }

    /// Resolves the product codes mentioned by `text` and its `link_targets`
    /// (hyperlink targets whose display text is part of `text`).
    pub async fn resolve(&self, text: &str, link_targets: &[String]) -> BTreeSet<i64> {
        let candidates: Vec<&str> = link_targets
            .iter()
            .map(String::as_str)
            .chain(patterns::urls(text))
            .collect();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut codes = BTreeSet::new();

        for link in candidates {
            if patterns::is_skipped_link(link) || !visited.insert(link) {
                continue;
            }
            if let Some(code) = patterns::product_code(link) {
                codes.insert(code);
                continue;
            }
            if let Some(code) = self.links.resolve(link).await {
                tracing::debug!(link, code, "resolved product code through redirect");
                codes.insert(code);
            }
        }

        codes.extend(patterns::product_codes(text));
        for size in patterns::size_values(text) {
            codes.remove(&size);
        }
        codes
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct StubLinks {
        codes: HashMap<String, i64>,
        calls: Mutex<Vec<String>>,
    }

    impl StubLinks {
        fn with(pairs: &[(&str, i64)]) -> Arc<Self> {
            Arc::new(Self {
                codes: pairs.iter().map(|(l, c)| ((*l).to_string(), *c)).collect(),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LinkResolver for StubLinks {
        async fn resolve(&self, link: &str) -> Option<i64> {
            self.calls.lock().unwrap().push(link.to_string());
            self.codes.get(link).copied()
        }
    }

    fn codes(values: &[i64]) -> BTreeSet<i64> {
        values.iter().copied().collect()
    }

    #[tokio::test]
    async fn direct_product_link_needs_no_redirect() {
        let stub = StubLinks::with(&[]);
        let resolver = MentionResolver::new(stub.clone());

        let found = resolver
            .resolve(
                "New drop https://www.wildberries.ru/catalog/12345678/detail.aspx",
                &[],
            )
            .await;

        assert_eq!(found, codes(&[12_345_678]));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn size_parameter_value_is_not_a_code() {
        let resolver = MentionResolver::new(StubLinks::with(&[]));

        let found = resolver
            .resolve(
                "wb.ru/catalog/12345678/detail.aspx?size=87654321 and \
                 https://wb.ru/catalog/87654321/detail.aspx",
                &[],
            )
            .await;

        assert_eq!(found, codes(&[12_345_678]));
    }

    #[tokio::test]
    async fn short_links_are_resolved_through_redirects() {
        let stub = StubLinks::with(&[("https://clck.ru/abc", 55_555_555)]);
        let resolver = MentionResolver::new(stub.clone());

        let found = resolver
            .resolve("Buy here", &["https://clck.ru/abc".to_string()])
            .await;

        assert_eq!(found, codes(&[55_555_555]));
        assert_eq!(stub.calls(), vec!["https://clck.ru/abc".to_string()]);
    }

    #[tokio::test]
    async fn skipped_links_are_never_followed() {
        let stub = StubLinks::with(&[]);
        let resolver = MentionResolver::new(stub.clone());

        let found = resolver
            .resolve(
                "https://t.me/deals https://tgstat.ru/channel/@deals",
                &["#".to_string(), "https://market.yandex.ru/product/1".to_string()],
            )
            .await;

        assert!(found.is_empty());
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_link_is_followed_once_per_call() {
        let stub = StubLinks::with(&[("https://clck.ru/abc", 55_555_555)]);
        let resolver = MentionResolver::new(stub.clone());
        let targets = vec!["https://clck.ru/abc".to_string()];

        resolver.resolve("https://clck.ru/abc", &targets).await;
        assert_eq!(stub.calls().len(), 1);

        resolver.resolve("https://clck.ru/abc", &targets).await;
        assert_eq!(stub.calls().len(), 2);
    }

    #[tokio::test]
    async fn unresolvable_link_is_dropped() {
        let resolver = MentionResolver::new(StubLinks::with(&[]));

        let found = resolver.resolve("https://clck.ru/nothing", &[]).await;

        assert!(found.is_empty());
    }
}
