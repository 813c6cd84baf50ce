//! Channel links found inside messages.

use std::collections::HashSet;
use std::sync::LazyLock;

use mentions_core::normalize_channel_link;
use regex::Regex;

use super::client::LinkAnnotation;

static CHANNEL_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?:telegram\.(?:me|dog)|t\.me)/(?:@|\+|joinchat/)?|tg://join\?invite=)[a-zA-Z0-9.+_-]+",
    )
    .expect("channel link pattern is valid")
});

// The leading class keeps e-mail addresses and `t.me/@name` out.
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.@/])@([A-Za-z0-9_]+)").expect("mention pattern is valid")
});

/// Display texts and titles containing this word point at review channels,
/// which are not tracked.
pub const REVIEW_MARKER: &str = "отзыв";

#[must_use]
pub fn is_review(text: &str) -> bool {
    text.to_lowercase().contains(REVIEW_MARKER)
}

fn links_in(text: &str) -> Vec<String> {
    CHANNEL_LINK
        .find_iter(text)
        .filter_map(|m| normalize_channel_link(m.as_str().trim_end_matches('.')))
        .collect()
}

fn mentions_in(text: &str) -> Vec<String> {
    MENTION
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| format!("t.me/{}", m.as_str()))
        .collect()
}

/// Reports each channel link once per worker.
#[derive(Debug, Default)]
pub struct ChannelLinkExtractor {
    seen: HashSet<String>,
}

impl ChannelLinkExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Links in `annotations` (unless their display text marks a review),
    /// in the plain `text`, and `@name` mentions, minus links already
    /// reported.
    pub fn extract(&mut self, text: &str, annotations: &[LinkAnnotation]) -> Vec<String> {
        let candidates = annotations
            .iter()
            .filter(|a| !is_review(&a.text))
            .flat_map(|a| links_in(&a.url))
            .chain(links_in(text))
            .chain(mentions_in(text));

        let mut fresh = Vec::new();
        for link in candidates {
            if self.seen.insert(link.clone()) {
                fresh.push(link);
            }
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(text: &str, url: &str) -> LinkAnnotation {
        LinkAnnotation {
            text: text.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn finds_links_and_mentions() {
        let mut extractor = ChannelLinkExtractor::new();
        let links = extractor.extract(
            "Join telegram.me/deals and https://t.me/+AbC. Ask @helper_bot.",
            &[],
        );
        assert_eq!(
            links,
            vec![
                "t.me/deals".to_string(),
                "t.me/+AbC".to_string(),
                "t.me/helper_bot".to_string(),
            ]
        );
    }

    #[test]
    fn review_annotations_are_ignored() {
        let mut extractor = ChannelLinkExtractor::new();
        let links = extractor.extract(
            "see below",
            &[
                annotation("Отзывы покупателей", "https://t.me/reviews"),
                annotation("Our shop", "https://t.me/shop"),
            ],
        );
        assert_eq!(links, vec!["t.me/shop".to_string()]);
    }

    #[test]
    fn links_are_reported_once_per_extractor() {
        let mut extractor = ChannelLinkExtractor::new();
        assert_eq!(extractor.extract("t.me/deals", &[]).len(), 1);
        assert!(extractor.extract("https://t.me/deals/42", &[]).is_empty());
        assert!(extractor.extract("@deals", &[]).is_empty());
    }

    #[test]
    fn email_addresses_are_not_mentions() {
        let mut extractor = ChannelLinkExtractor::new();
        assert!(extractor.extract("write to shop@mail.ru", &[]).is_empty());
    }

    #[test]
    fn invite_links_are_normalized() {
        let mut extractor = ChannelLinkExtractor::new();
        assert_eq!(
            extractor.extract("tg://join?invite=XyZ t.me/joinchat/QwE", &[]),
            vec!["t.me/+XyZ".to_string(), "t.me/+QwE".to_string()]
        );
    }
}
