//! HTTP client for the relay's public API, including the SSE status feed.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{header, Client, Response, StatusCode};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{StatusFeed, StatusUpdates, WatchError};
use crate::dtos::payment_dtos::{
    InitiatePaymentResponse, PaymentStatusResponse, SessionRequest, SessionResponse,
};
use crate::models::payment::{PaymentStatus, StatusChange};

pub struct ApiClient {
    client: Client,
    base_url: String,
    session: RwLock<Option<String>>,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, WatchError> {
        // No overall timeout: the event stream stays open until the payment
        // resolves.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WatchError::Request(e.to_string()))?;

        Ok(ApiClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bearer(&self) -> Result<String, WatchError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| WatchError::Auth("no session; call authenticate first".to_string()))
    }

    /// Starts a payment and returns its public id.
    pub async fn initiate(&self, phone: &str, amount: u64) -> Result<String, WatchError> {
        let response = self
            .client
            .post(self.url("/initiate"))
            .json(&serde_json::json!({ "phone": phone, "amount": amount }))
            .send()
            .await
            .map_err(|e| WatchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WatchError::Request(error_message(response).await));
        }

        let body: InitiatePaymentResponse = response
            .json()
            .await
            .map_err(|_| WatchError::Request("Missing payment ID from server".to_string()))?;

        if body.public_id.is_empty() {
            return Err(WatchError::Request("Missing payment ID from server".to_string()));
        }
        Ok(body.public_id)
    }
}

/// Server-provided `error` text when present, else the HTTP status.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()))
}

#[async_trait]
impl StatusFeed for ApiClient {
    async fn authenticate(&self, public_id: &str) -> Result<(), WatchError> {
        let response = self
            .client
            .post(self.url("/session"))
            .json(&SessionRequest {
                public_id: public_id.to_string(),
            })
            .send()
            .await
            .map_err(|e| WatchError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WatchError::Auth(error_message(response).await));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| WatchError::Auth(e.to_string()))?;
        *self.session.write().await = Some(session.token);
        Ok(())
    }

    async fn current_status(&self, public_id: &str) -> Result<Option<PaymentStatus>, WatchError> {
        let response = self
            .client
            .get(self.url(&format!("/payments/{}", public_id)))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| WatchError::Feed(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: PaymentStatusResponse = response
                    .json()
                    .await
                    .map_err(|e| WatchError::Feed(e.to_string()))?;
                Ok(Some(body.status))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(WatchError::Auth(error_message(response).await))
            }
            _ => Err(WatchError::Feed(error_message(response).await)),
        }
    }

    async fn subscribe(&self, public_id: &str) -> Result<StatusUpdates, WatchError> {
        let response = self
            .client
            .get(self.url(&format!("/payments/{}/events", public_id)))
            .bearer_auth(self.bearer().await?)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| WatchError::Feed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WatchError::Feed(error_message(response).await));
        }

        Ok(status_events(response.bytes_stream()))
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    fn into_status(self) -> Option<Result<PaymentStatus, WatchError>> {
        if self.event.as_deref().is_some_and(|event| event != "status") {
            return None;
        }
        Some(
            serde_json::from_str::<StatusChange>(&self.data)
                .map(|change| change.status)
                .map_err(|e| WatchError::Feed(format!("bad status event: {}", e))),
        )
    }
}

/// Incremental `text/event-stream` decoder. Comments (keep-alives) are
/// dropped, multi-line `data` is joined with `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&String::from_utf8_lossy(&block[..end])) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    (!data.is_empty()).then(|| SseFrame {
        event,
        data: data.join("\n"),
    })
}

fn status_events<S, B>(bytes: S) -> StatusUpdates
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = (bytes.boxed(), SseDecoder::default(), VecDeque::new());

    futures::stream::unfold(state, |(mut bytes, mut decoder, mut pending)| async move {
        loop {
            if let Some(item) = pending.pop_front() {
                return Some((item, (bytes, decoder, pending)));
            }
            match bytes.next().await? {
                Ok(chunk) => pending.extend(
                    decoder
                        .push(chunk.as_ref())
                        .into_iter()
                        .filter_map(SseFrame::into_status),
                ),
                Err(e) => {
                    return Some((Err(WatchError::Feed(e.to_string())), (bytes, decoder, pending)))
                }
            }
        }
    })
    .boxed()
}
