/// HTTP client for a local messaging bridge daemon.
///
/// Request/response calls are plain JSON. The two push feeds (`/v1/events`
/// and `/v1/pair`) are server-sent-event streams whose `data:` lines carry
/// the tagged JSON of [`ClientEvent`] / [`PairingEvent`].
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ChatService, ClientEvent, Conversation, Message, Pairing, PairingEvent};

// ── SSE decoding ──────────────────────────────────────────────────────────────

/// Splits a byte stream into SSE `data:` payloads.
///
/// Chunks can end mid-line (or mid-codepoint), so the unterminated tail is
/// kept until the next chunk completes it. Multi-line `data:` fields are
/// joined with `\n` and emitted at the blank line that ends the event.
#[derive(Default)]
pub struct SseDecoder {
    leftover: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.leftover.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(nl) = self.leftover.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.leftover.drain(..=nl).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    out.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            // Comments / keep-alives
            if line.starts_with(':') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
            // event:, id:, retry: carry nothing we use
        }
        out
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct BridgeClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl BridgeClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid bridge endpoint '{endpoint}'"))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
        })
    }

    /// `endpoint` + path segments, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Bridge endpoint {} cannot take a path", self.endpoint))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn url_with_limit(&self, segments: &[&str], limit: usize) -> Result<Url> {
        let mut url = self.url(segments)?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let resp = check(resp).await?;
        resp.json::<T>().await.with_context(|| format!("Bad JSON from {url}"))
    }

    async fn post_json(&self, url: Url, body: serde_json::Value) -> Result<()> {
        let resp = self
            .http
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        check(resp).await?;
        Ok(())
    }

    /// Open an SSE feed and forward decoded events until the stream ends or
    /// `cancel` fires. Transport failures mid-stream are turned into a final
    /// event by `on_error`.
    async fn stream<T>(
        &self,
        url: Url,
        cancel: CancellationToken,
        on_error: fn(String) -> T,
    ) -> Result<mpsc::UnboundedReceiver<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let resp = self
            .http
            .get(url.clone())
            .header("Accept", "text/event-stream")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let resp = check(resp).await?;
        let mut body = resp.bytes_stream();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            'feed: loop {
                tokio::select! {
                    _ = cancel.cancelled() => break 'feed,
                    chunk = body.next() => match chunk {
                        Some(Ok(bytes)) => {
                            for payload in decoder.push(&bytes) {
                                match serde_json::from_str::<T>(&payload) {
                                    Ok(ev) => {
                                        if tx.send(ev).is_err() {
                                            break 'feed;
                                        }
                                    }
                                    Err(e) => warn!("skipping malformed event from {url}: {e}"),
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!("event stream {url} failed: {e}");
                            let _ = tx.send(on_error(e.to_string()));
                            break 'feed;
                        }
                        None => {
                            debug!("event stream {url} closed");
                            break 'feed;
                        }
                    },
                }
            }
        });

        Ok(rx)
    }
}

/// Turn a non-2xx response into an error carrying status and body.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let url = resp.url().clone();
    let text = resp.text().await.unwrap_or_default();
    Err(anyhow!("bridge error {status} from {url}: {}", text.trim()))
}

#[async_trait]
impl ChatService for BridgeClient {
    async fn connect(&self) -> Result<()> {
        self.post_json(self.url(&["v1", "connect"])?, serde_json::json!({})).await
    }

    async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>> {
        self.get_json(self.url_with_limit(&["v1", "conversations"], limit)?).await
    }

    async fn fetch_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let url = self.url_with_limit(&["v1", "conversations", conversation_id, "messages"], limit)?;
        self.get_json(url).await
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<()> {
        let url = self.url(&["v1", "conversations", conversation_id, "messages"])?;
        self.post_json(url, serde_json::json!({ "text": text })).await
    }

    async fn mark_read(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let url = self.url(&["v1", "conversations", conversation_id, "read"])?;
        self.post_json(url, serde_json::json!({ "message_id": message_id })).await
    }

    async fn send_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let url = self.url(&[
            "v1",
            "conversations",
            conversation_id,
            "messages",
            message_id,
            "reactions",
        ])?;
        self.post_json(url, serde_json::json!({ "emoji": emoji })).await
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<ClientEvent>> {
        let url = self.url(&["v1", "events"])?;
        self.stream(url, cancel, |error| ClientEvent::TemporaryError { error }).await
    }
}

#[async_trait]
impl Pairing for BridgeClient {
    async fn restore(&self, device_pair: &serde_json::Value) -> Result<bool> {
        let url = self.url(&["v1", "session", "restore"])?;
        let resp = self
            .http
            .post(url.clone())
            .json(&serde_json::json!({ "device_pair": device_pair }))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(false),
            _ => {
                check(resp).await?;
                Ok(true)
            }
        }
    }

    async fn start_pairing(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<PairingEvent>> {
        let url = self.url(&["v1", "pair"])?;
        self.stream(url, cancel, |error| PairingEvent::FatalError { error }).await
    }
}
