//! Upstream generative-language API transport.
//!
//! [`UpstreamTransport`] is the seam between the fallback loop and the
//! network: one call per model attempt, returning the raw status and body
//! so the resolver can classify the outcome itself.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CopilotError, Result};

/// Raw reply from a single upstream attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl UpstreamReply {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Connection-level failure (no HTTP status available).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends one generation request for one model identifier.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Issue a single `generateContent` call.
    async fn generate(
        &self,
        model: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<UpstreamReply, TransportError>;
}

/// Build the JSON request body for a `generateContent` call.
pub fn build_generate_body(prompt: &str, temperature: f64, max_output_tokens: u32) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": {
            "temperature": temperature,
            "maxOutputTokens": max_output_tokens,
        }
    })
}

/// `reqwest`-backed transport for the Generative Language REST API.
///
/// The credential travels as the `key` query parameter.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    /// Create a transport for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CopilotError::Http(format!("failed to build upstream client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl UpstreamTransport for HttpUpstream {
    async fn generate(
        &self,
        model: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<UpstreamReply, TransportError> {
        let response = self
            .client
            .post(self.model_url(model))
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError(format!("upstream request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("failed to read upstream body: {e}")))?;

        Ok(UpstreamReply { status, body })
    }
}
