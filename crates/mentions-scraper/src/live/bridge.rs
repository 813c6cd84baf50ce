//! [`MessagingClient`] backed by a messaging gateway sidecar that speaks
//! JSON over HTTP.
//!
//! Each session is opened with `POST /sessions/{id}/connect`; every later
//! call goes under that session's path. The gateway answers HTTP 420 with
//! `{"seconds": N}` when the messaging server imposes a flood wait.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::client::{ClientConnector, Dialog, Message, MessagingClient, RemoteChannel};
use crate::error::ClientError;

const HISTORY_PAGE_SIZE: usize = 100;
const FLOOD_WAIT_STATUS: u16 = 420;

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    session_path: String,
    proxy: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    ids: &'a [i64],
}

#[derive(Debug, Serialize)]
struct JoinRequest<'a> {
    link: &'a str,
}

#[derive(Debug, Deserialize)]
struct FloodWaitBody {
    seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ChannelsBody {
    channels: Vec<RemoteChannel>,
}

#[derive(Debug, Deserialize)]
struct MessagesBody {
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct DialogsBody {
    dialogs: Vec<Dialog>,
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.as_u16() == FLOOD_WAIT_STATUS {
        let body: FloodWaitBody = read(response, "flood wait").await?;
        return Err(ClientError::FloodWait {
            seconds: body.seconds,
        });
    }
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ClientError::Rejected {
            reason: format!("{status}: {}", detail.trim()),
        });
    }
    Ok(response)
}

async fn read<T: DeserializeOwned>(response: Response, context: &str) -> Result<T, ClientError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| ClientError::Deserialize {
        context: context.to_string(),
        source,
    })
}

/// Opens gateway sessions. Session files live under `sessions_dir`, one
/// per session id.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    sessions_dir: PathBuf,
}

impl BridgeConnector {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        sessions_dir: PathBuf,
        timeout_secs: u64,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            sessions_dir,
        })
    }
}

#[async_trait]
impl ClientConnector for BridgeConnector {
    type Client = BridgeClient;

    async fn connect(
        &self,
        session_id: i32,
        proxy_url: Option<&str>,
    ) -> Result<BridgeClient, ClientError> {
        let session_url = format!("{}/sessions/{session_id}", self.base_url);
        let body = ConnectRequest {
            session_path: self
                .sessions_dir
                .join(session_id.to_string())
                .display()
                .to_string(),
            proxy: proxy_url,
        };
        let request = self.http.post(format!("{session_url}/connect")).json(&body);
        check(authorize(request, self.token.as_deref()).send().await?).await?;

        tracing::info!(session = session_id, proxied = proxy_url.is_some(), "session connected");
        Ok(BridgeClient {
            http: self.http.clone(),
            session_url,
            token: self.token.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    session_url: String,
    token: Option<String>,
}

impl BridgeClient {
    fn get(&self, path: &str) -> RequestBuilder {
        authorize(
            self.http.get(format!("{}{path}", self.session_url)),
            self.token.as_deref(),
        )
    }

    fn post(&self, path: &str) -> RequestBuilder {
        authorize(
            self.http.post(format!("{}{path}", self.session_url)),
            self.token.as_deref(),
        )
    }

    async fn history_page(
        &self,
        channel_id: i64,
        after: DateTime<Utc>,
        offset_id: i64,
    ) -> Result<Vec<Message>, ClientError> {
        let response = self
            .get("/history")
            .query(&[
                ("channel_id", channel_id.to_string()),
                ("after", after.to_rfc3339()),
                ("offset_id", offset_id.to_string()),
                ("limit", HISTORY_PAGE_SIZE.to_string()),
            ])
            .send()
            .await?;
        let body: MessagesBody = read(check(response).await?, "history page").await?;
        Ok(body.messages)
    }
}

#[async_trait]
impl MessagingClient for BridgeClient {
    async fn resolve_entities(&self, ids: &[i64]) -> Result<Vec<RemoteChannel>, ClientError> {
        let response = self.post("/resolve").json(&ResolveRequest { ids }).send().await?;
        let body: ChannelsBody = read(check(response).await?, "resolved channels").await?;
        Ok(body.channels)
    }

    async fn join(&self, link: &str) -> Result<RemoteChannel, ClientError> {
        let response = self.post("/join").json(&JoinRequest { link }).send().await?;
        read(check(response).await?, "joined channel").await
    }

    /// Pages through the history with `offset_id` set to the last id of the
    /// previous page; a short page ends the stream.
    fn iter_history(
        &self,
        channel_id: i64,
        after: DateTime<Utc>,
    ) -> BoxStream<'_, Result<Message, ClientError>> {
        stream::try_unfold(Some(0_i64), move |offset| async move {
            let Some(offset_id) = offset else {
                return Ok(None);
            };
            let page = self.history_page(channel_id, after, offset_id).await?;
            let next = if page.len() < HISTORY_PAGE_SIZE {
                None
            } else {
                page.last().map(|m| m.id)
            };
            let items = stream::iter(page.into_iter().map(Ok::<Message, ClientError>));
            Ok::<_, ClientError>(Some((items, next)))
        })
        .try_flatten()
        .boxed()
    }

    fn iter_dialogs(&self) -> BoxStream<'_, Result<Dialog, ClientError>> {
        stream::once(async move {
            let response = self.get("/dialogs").send().await?;
            let body: DialogsBody = read(check(response).await?, "dialogs").await?;
            Ok::<_, ClientError>(stream::iter(
                body.dialogs.into_iter().map(Ok::<Dialog, ClientError>),
            ))
        })
        .try_flatten()
        .boxed()
    }
}
