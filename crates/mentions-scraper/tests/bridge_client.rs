//! Integration tests for the gateway-backed messaging client.

use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mentions_scraper::live::{BridgeClient, BridgeConnector, ClientConnector, DialogKind};
use mentions_scraper::{ClientError, MessagingClient};

async fn connected(server: &MockServer) -> BridgeClient {
    Mock::given(method("POST"))
        .and(path("/sessions/3/connect"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "session_path": "/var/lib/mentions/sessions/3",
            "proxy": "socks5://u:p@10.0.0.1:1080",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(server)
        .await;

    let connector = BridgeConnector::new(
        &server.uri(),
        Some("secret".to_string()),
        PathBuf::from("/var/lib/mentions/sessions"),
        5,
    )
    .expect("failed to build BridgeConnector");
    connector
        .connect(3, Some("socks5://u:p@10.0.0.1:1080"))
        .await
        .expect("session should connect")
}

fn message_json(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "date": "2024-03-01T12:00:00Z",
        "text": format!("message {id}"),
        "views": 10,
    })
}

#[tokio::test]
async fn join_returns_the_remote_channel() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path("/sessions/3/join"))
        .and(body_partial_json(json!({"link": "t.me/deals"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 100,
            "title": "Deals",
            "participant_count": 400,
        })))
        .mount(&server)
        .await;

    let channel = client.join("t.me/deals").await.unwrap();

    assert_eq!(channel.id, 100);
    assert_eq!(channel.title.as_deref(), Some("Deals"));
    assert_eq!(channel.participant_count, Some(400));
}

#[tokio::test]
async fn status_420_is_a_flood_wait() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path("/sessions/3/join"))
        .respond_with(ResponseTemplate::new(420).set_body_json(json!({"seconds": 17})))
        .mount(&server)
        .await;

    let result = client.join("t.me/deals").await;

    assert!(
        matches!(result, Err(ClientError::FloodWait { seconds: 17 })),
        "expected FloodWait, got: {result:?}"
    );
}

#[tokio::test]
async fn other_failures_are_rejections() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("POST"))
        .and(path("/sessions/3/resolve"))
        .respond_with(ResponseTemplate::new(400).set_body_string("CHANNEL_INVALID"))
        .mount(&server)
        .await;

    let result = client.resolve_entities(&[1, 2]).await;

    match result {
        Err(ClientError::Rejected { reason }) => assert!(reason.contains("CHANNEL_INVALID")),
        other => panic!("expected Rejected, got: {other:?}"),
    }
}

#[tokio::test]
async fn history_pages_until_a_short_page() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let full_page: Vec<_> = (1..=100).map(message_json).collect();
    Mock::given(method("GET"))
        .and(path("/sessions/3/history"))
        .and(query_param("channel_id", "100"))
        .and(query_param("offset_id", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": full_page})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sessions/3/history"))
        .and(query_param("offset_id", "100"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"messages": [message_json(101)]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let messages: Vec<_> = client.iter_history(100, after).try_collect().await.unwrap();

    assert_eq!(messages.len(), 101);
    assert_eq!(messages[0].id, 1);
    assert_eq!(messages[100].text, "message 101");
}

#[tokio::test]
async fn dialogs_are_listed() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    Mock::given(method("GET"))
        .and(path("/sessions/3/dialogs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dialogs": [
            {"id": 100, "kind": "channel", "title": "Deals"},
            {"id": 5, "kind": "user"},
        ]})))
        .mount(&server)
        .await;

    let dialogs: Vec<_> = client.iter_dialogs().try_collect().await.unwrap();

    assert_eq!(dialogs.len(), 2);
    assert_eq!(dialogs[0].kind, DialogKind::Channel);
    assert_eq!(dialogs[1].kind, DialogKind::User);
}
