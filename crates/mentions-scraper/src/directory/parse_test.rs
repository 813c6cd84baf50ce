use chrono::{TimeZone, Utc};

use super::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

fn post_html(id: i64, date: &str, body: &str) -> String {
    format!(
        r##"<div class="post-container">
  <div class="post-header"><small>{date}</small></div>
  {body}
  <div class="post-footer">
    <a href="/channel/@deals/{id}/stat"><i class="uil-eye"></i> 1.2k</a>
    <a href="#"><i class="uil-share-alt"></i> 7</a>
    <span><i class="uil-corner-up-right"></i> 3</span>
    <span><i class="uil-comments-alt"></i> 2</span>
    <span><i class="uil-thumbs-up"></i> 10</span>
  </div>
</div>"##
    )
}

const TEXT_BODY: &str = r#"<div class="post-body"><div class="post-text">Deal <a href="https://clck.ru/abc">here</a> wb.ru/catalog/12345678/detail.aspx</div></div>"#;

#[test]
fn channel_page_yields_followers_posts_and_cursor() {
    let html = format!(
        r#"<html><body>
<h2 class="mb-1 text-dark">12 345</h2>
{}
<div class="lm-button-container">
  <input type="hidden" class="lm-page" value="2">
  <input type="hidden" class="lm-offset" value="20">
</div>
</body></html>"#,
        post_html(1234, "01 Mar 2024, 12:00", TEXT_BODY)
    );

    let page = parse_channel_page(&html, now());

    assert_eq!(page.follower_count, Some(12_345));
    assert_eq!(
        page.load_more,
        Some(LoadMoreCursor {
            page: "2".to_string(),
            offset: "20".to_string()
        })
    );
    assert_eq!(page.posts.len(), 1);

    let post = &page.posts[0];
    assert_eq!(post.remote_message_id, 1234);
    assert_eq!(
        post.published_at,
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    );
    assert!(!post.forwarded);
    assert_eq!(post.link_targets, vec!["https://clck.ru/abc".to_string()]);
    assert!(post.text.as_deref().unwrap().contains("wb.ru/catalog/12345678"));
    assert_eq!(
        post.metrics,
        EngagementMetrics {
            views: 1200,
            shares: 7,
            replies: 3,
            comments: 2,
            reactions: 10,
        }
    );
}

#[test]
fn cursor_inputs_may_follow_the_button_container() {
    let html = r#"<html><body>
<div class="lm-button-container"><button>Show more</button></div>
<input type="hidden" class="lm-page" value="3">
<div class="hidden"><input type="hidden" class="lm-offset" value="60"></div>
</body></html>"#;

    let page = parse_channel_page(html, now());

    assert_eq!(
        page.load_more,
        Some(LoadMoreCursor {
            page: "3".to_string(),
            offset: "60".to_string()
        })
    );
}

#[test]
fn inputs_before_the_button_container_are_not_a_cursor() {
    let html = r#"<html><body>
<input type="hidden" class="lm-page" value="3">
<input type="hidden" class="lm-offset" value="60">
<div class="lm-button-container"></div>
</body></html>"#;

    assert_eq!(parse_channel_page(html, now()).load_more, None);
}

#[test]
fn forwarded_and_media_only_posts_are_flagged() {
    let forwarded = post_html(
        5,
        "01 Mar 2024, 12:00",
        r#"<div class="post-body post-body-forwarded"><div class="post-text">fwd</div></div>"#,
    );
    let media = post_html(6, "01 Mar 2024, 12:00", r#"<div class="post-img"></div>"#);

    let posts = parse_posts(&format!("{forwarded}{media}"), now());

    assert_eq!(posts.len(), 2);
    assert!(posts[0].forwarded);
    assert_eq!(posts[1].text, None);
    assert!(!posts[1].forwarded);
}

#[test]
fn post_without_id_is_skipped() {
    let html = r#"<div class="post-container"><small>01 Mar 2024, 12:00</small></div>"#;
    assert!(parse_posts(html, now()).is_empty());
}

#[test]
fn missing_counters_count_as_zero() {
    let html = r#"<div class="post-container"><small>01 Mar 2024, 12:00</small>
<div><a href="/channel/@deals/77/stat"><i class="uil-eye"></i> 15</a></div></div>"#;
    let posts = parse_posts(html, now());
    assert_eq!(posts[0].metrics.views, 15);
    assert_eq!(posts[0].metrics.reactions, 0);
    assert_eq!(posts[0].metrics.comments, 0);
}

#[test]
fn post_date_formats() {
    assert_eq!(
        parse_post_date("01 Mar 2023, 09:30", now()),
        Some(Utc.with_ymd_and_hms(2023, 3, 1, 9, 30, 0).unwrap())
    );
    assert_eq!(
        parse_post_date("14 Jun, 08:00", now()),
        Some(Utc.with_ymd_and_hms(2024, 6, 14, 8, 0, 0).unwrap())
    );
    assert_eq!(parse_post_date("yesterday", now()), None);
}

#[test]
fn year_less_future_date_belongs_to_last_year() {
    assert_eq!(
        parse_post_date("30 Dec, 20:00", now()),
        Some(Utc.with_ymd_and_hms(2023, 12, 30, 20, 0, 0).unwrap())
    );
}

#[test]
fn counts_with_thousands_suffix() {
    assert_eq!(parse_count("42"), 42);
    assert_eq!(parse_count(" 12k\n"), 12_000);
    assert_eq!(parse_count("1.2k"), 1_200);
    assert_eq!(parse_count(""), 0);
}

#[test]
fn slugs_and_links() {
    assert_eq!(directory_slug("t.me/deals").as_deref(), Some("@deals"));
    assert_eq!(directory_slug("t.me/+AbC").as_deref(), Some("AbC"));
    assert_eq!(directory_slug("deals"), None);
    assert_eq!(link_from_slug("@deals"), "t.me/deals");
    assert_eq!(link_from_slug("AbC"), "t.me/+AbC");
    assert_eq!(
        canonical_link("https://directory.example/channel/@renamed").as_deref(),
        Some("t.me/renamed")
    );
    assert_eq!(
        canonical_link("https://directory.example/channel/AbC-d_e?x=1").as_deref(),
        Some("t.me/+AbC-d_e")
    );
}

#[test]
fn category_page_lists_first_container_only() {
    let html = r#"<html><body>
<div class="lm-list-container">
  <a class="text-body" href="https://directory.example/channel/@deals">
    <div class="font-16">Deals</div><b>1 500</b>
  </a>
  <a class="text-body" href="https://directory.example/channel/AbCd">
    <div class="font-16">Private</div><b>20</b>
  </a>
</div>
<div class="lm-list-container">
  <a class="text-body" href="https://directory.example/channel/@other"></a>
</div>
<div class="lm-button-container">
  <input class="lm-page" value="1"><input class="lm-offset" value="30">
</div>
</body></html>"#;

    let (listings, cursor) = parse_category_page(html);

    assert_eq!(
        listings,
        vec![
            CategoryListing {
                link: "t.me/deals".to_string(),
                title: Some("Deals".to_string()),
                follower_count: Some(1500),
            },
            CategoryListing {
                link: "t.me/+AbCd".to_string(),
                title: Some("Private".to_string()),
                follower_count: Some(20),
            },
        ]
    );
    assert_eq!(cursor.unwrap().offset, "30");
}
