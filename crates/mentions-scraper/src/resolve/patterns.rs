use std::sync::LazyLock;

use regex::Regex;

static PRODUCT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:wb|wildberries)\.ru(?:/catalog/|/product\?card=)\d+")
        .expect("product link pattern is valid")
});

static PRODUCT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{5,}").expect("product code pattern is valid"));

static SIZE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"size=(\d+)").expect("size pattern is valid"));

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("url pattern is valid"));

/// Links under these prefixes never lead to a product page.
const NON_PRODUCT_PREFIXES: [&str; 4] = [
    "https://tgstat.ru/",
    "https://ttttt.me/",
    "https://t.me/",
    "https://market.yandex.ru/",
];

fn code_in(product_link: &str) -> Option<i64> {
    PRODUCT_CODE
        .find(product_link)
        .and_then(|m| m.as_str().parse().ok())
}

/// Code of the first product link found in `text`.
pub(crate) fn product_code(text: &str) -> Option<i64> {
    PRODUCT_LINK.find(text).and_then(|m| code_in(m.as_str()))
}

/// Codes of every product link in `text`, scheme or not.
pub(crate) fn product_codes(text: &str) -> Vec<i64> {
    PRODUCT_LINK
        .find_iter(text)
        .filter_map(|m| code_in(m.as_str()))
        .collect()
}

/// Values of every `size=` query parameter in `text`.
pub(crate) fn size_values(text: &str) -> Vec<i64> {
    SIZE_PARAM
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

pub(crate) fn urls(text: &str) -> Vec<&str> {
    URL.find_iter(text).map(|m| m.as_str()).collect()
}

pub(crate) fn is_skipped_link(link: &str) -> bool {
    link == "#" || NON_PRODUCT_PREFIXES.iter().any(|p| link.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_code_reads_catalog_and_card_links() {
        assert_eq!(
            product_code("https://www.wildberries.ru/catalog/12345678/detail.aspx"),
            Some(12_345_678)
        );
        assert_eq!(
            product_code("https://wb.ru/product?card=87654321"),
            Some(87_654_321)
        );
        assert_eq!(product_code("wb.ru/catalog/55555/detail.aspx"), Some(55_555));
    }

    #[test]
    fn product_code_needs_five_digits() {
        assert_eq!(product_code("https://wb.ru/catalog/1234/detail.aspx"), None);
        assert_eq!(product_code("https://ozon.ru/product/12345678"), None);
    }

    #[test]
    fn size_values_are_collected() {
        assert_eq!(
            size_values("a?size=123456&x=1 b?size=42"),
            vec![123_456, 42]
        );
    }

    #[test]
    fn urls_stop_at_whitespace() {
        assert_eq!(
            urls("see https://clck.ru/abc and http://x.y/z\nnext"),
            vec!["https://clck.ru/abc", "http://x.y/z"]
        );
    }

    #[test]
    fn skipped_links() {
        assert!(is_skipped_link("#"));
        assert!(is_skipped_link("https://t.me/deals"));
        assert!(is_skipped_link("https://market.yandex.ru/product/1"));
        assert!(!is_skipped_link("https://clck.ru/abc"));
    }
}
