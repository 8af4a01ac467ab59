//! Answer endpoint client.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use crate::api::ProcessRequest;

/// A response from the answer endpoint whose body has not been read yet.
pub struct AnswerReply {
    pub status: u16,
    /// `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Body chunks in arrival order.
    pub body: BoxStream<'static, Result<Bytes, String>>,
}

impl std::fmt::Debug for AnswerReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerReply")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl AnswerReply {
    /// Reply with a fully buffered body.
    pub fn buffered(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            content_type: content_type.map(str::to_owned),
            body: futures_util::stream::once(async move { Ok(body) }).boxed(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the remaining body into a string.
    ///
    /// # Errors
    ///
    /// Returns the transport message if a chunk fails.
    pub async fn text(mut self) -> Result<String, String> {
        let mut raw = Vec::new();
        while let Some(chunk) = self.body.next().await {
            raw.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// Transport to the answer-generation endpoint.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    /// Send one request. `Err` carries a network-level message; HTTP error
    /// statuses come back as an [`AnswerReply`].
    async fn send(&self, request: &ProcessRequest) -> Result<AnswerReply, String>;
}

/// [`AnswerClient`] posting to `{base}/api/process`.
#[derive(Debug, Clone)]
pub struct HttpAnswerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnswerClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/process", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl AnswerClient for HttpAnswerClient {
    async fn send(&self, request: &ProcessRequest) -> Result<AnswerReply, String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| e.to_string()))
            .boxed();

        Ok(AnswerReply {
            status,
            content_type,
            body,
        })
    }
}
