//! Transport seam for the two session mailboxes.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::session::{BroadcastAnswer, RemoteCommand, SessionSlots};
use super::sse::SseLineParser;
use crate::error::{CopilotError, Result};

/// Publish to and observe one session's `control` and `answer` slots.
#[async_trait]
pub trait SessionChannel: Send + Sync {
    /// Identifier shared by every device in the session.
    fn session_id(&self) -> &str;

    /// Overwrite the command slot.
    async fn publish_command(&self, command: &RemoteCommand) -> Result<()>;

    /// Overwrite the answer slot.
    async fn publish_answer(&self, answer: &BroadcastAnswer) -> Result<()>;

    /// Current command value, if any.
    async fn latest_command(&self) -> Result<Option<RemoteCommand>>;

    /// Current answer value, if any.
    async fn latest_answer(&self) -> Result<Option<BroadcastAnswer>>;

    /// Current command (if any), then each later value. Ends if the
    /// underlying subscription drops.
    async fn command_updates(&self) -> Result<BoxStream<'static, RemoteCommand>>;

    /// Current answer (if any), then each later value.
    async fn answer_updates(&self) -> Result<BoxStream<'static, BroadcastAnswer>>;
}

/// In-process channel over a [`SessionSlots`] pair.
#[derive(Debug, Clone)]
pub struct LocalSessionChannel {
    session_id: String,
    slots: Arc<SessionSlots>,
}

impl LocalSessionChannel {
    pub fn new(session_id: impl Into<String>, slots: Arc<SessionSlots>) -> Self {
        Self {
            session_id: session_id.into(),
            slots,
        }
    }
}

#[async_trait]
impl SessionChannel for LocalSessionChannel {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn publish_command(&self, command: &RemoteCommand) -> Result<()> {
        self.slots.control.publish(command.clone());
        Ok(())
    }

    async fn publish_answer(&self, answer: &BroadcastAnswer) -> Result<()> {
        self.slots.answer.publish(answer.clone());
        Ok(())
    }

    async fn latest_command(&self) -> Result<Option<RemoteCommand>> {
        Ok(self.slots.control.latest())
    }

    async fn latest_answer(&self) -> Result<Option<BroadcastAnswer>> {
        Ok(self.slots.answer.latest())
    }

    async fn command_updates(&self) -> Result<BoxStream<'static, RemoteCommand>> {
        Ok(self.slots.control.updates())
    }

    async fn answer_updates(&self) -> Result<BoxStream<'static, BroadcastAnswer>> {
        Ok(self.slots.answer.updates())
    }
}

/// Channel speaking the copilot server's `/api/sessions/{id}` routes.
#[derive(Debug, Clone)]
pub struct HttpSessionChannel {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl HttpSessionChannel {
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, session_id)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            session_id: session_id.into(),
        }
    }

    /// `{base}/api/sessions/{id}/{slot}[/events]`, with the session id
    /// encoded as a single path segment.
    fn slot_url(&self, slot: &str, events: bool) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| CopilotError::Channel(format!("invalid server URL: {e}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                CopilotError::Channel(format!("server URL cannot take a path: {}", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["api", "sessions", self.session_id.as_str(), slot]);
            if events {
                segments.push("events");
            }
        }
        Ok(url)
    }

    async fn put<T: Serialize + Sync>(&self, slot: &str, value: &T) -> Result<()> {
        let response = self
            .client
            .put(self.slot_url(slot, false)?)
            .json(value)
            .send()
            .await
            .map_err(|e| CopilotError::Channel(format!("publish to {slot} failed: {e}")))?;
        ensure_success(response, slot).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, slot: &str) -> Result<Option<T>> {
        let response = self
            .client
            .get(self.slot_url(slot, false)?)
            .send()
            .await
            .map_err(|e| CopilotError::Channel(format!("read of {slot} failed: {e}")))?;
        let response = ensure_success(response, slot).await?;
        response
            .json::<Option<T>>()
            .await
            .map_err(|e| CopilotError::Channel(format!("invalid {slot} value: {e}")))
    }

    async fn subscribe<T>(&self, slot: &'static str) -> Result<BoxStream<'static, T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.slot_url(slot, true)?;
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| CopilotError::Channel(format!("subscribe to {slot} failed: {e}")))?;
        let response = ensure_success(response, slot).await?;
        debug!(url = url.as_str(), "session subscription open");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut parser = SseLineParser::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(slot, error = %e, "session subscription dropped");
                        break;
                    }
                };
                for event in parser.push(&chunk) {
                    match serde_json::from_str::<T>(&event.data) {
                        Ok(value) => yield value,
                        Err(e) => warn!(slot, error = %e, "ignoring malformed session event"),
                    }
                }
            }
            if let Some(Ok(value)) = parser
                .flush()
                .map(|event| serde_json::from_str::<T>(&event.data))
            {
                yield value;
            }
        };
        Ok(stream.boxed())
    }
}

async fn ensure_success(response: reqwest::Response, slot: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CopilotError::Channel(format!(
        "{slot} request returned HTTP {}: {body}",
        status.as_u16()
    )))
}

#[async_trait]
impl SessionChannel for HttpSessionChannel {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn publish_command(&self, command: &RemoteCommand) -> Result<()> {
        self.put("control", command).await
    }

    async fn publish_answer(&self, answer: &BroadcastAnswer) -> Result<()> {
        self.put("answer", answer).await
    }

    async fn latest_command(&self) -> Result<Option<RemoteCommand>> {
        self.get("control").await
    }

    async fn latest_answer(&self) -> Result<Option<BroadcastAnswer>> {
        self.get("answer").await
    }

    async fn command_updates(&self) -> Result<BoxStream<'static, RemoteCommand>> {
        self.subscribe("control").await
    }

    async fn answer_updates(&self) -> Result<BoxStream<'static, BroadcastAnswer>> {
        self.subscribe("answer").await
    }
}
