//! Model fallback resolver.
//!
//! [`FallbackResolver`] walks an ordered list of upstream model identifiers
//! and returns the first usable answer.
//!
//! # Fallback policy
//!
//! - **Unusable identifier** (HTTP 404 / 400, unparseable error body,
//!   connection failure, success with no extractable text): record a
//!   diagnostic and move to the next identifier.
//! - **Fatal** (any other non-2xx, e.g. 401/403/429/5xx): stop immediately
//!   and surface the upstream message. Later identifiers are never called.
//! - **Exhaustion**: every identifier was unusable; the report names the
//!   last diagnostic and all identifiers tried, in order.

pub mod extract;
pub mod upstream;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::UpstreamConfig;
use self::extract::{extract_answer, extract_error_message, parse_body};
use self::upstream::{HttpUpstream, UpstreamTransport, build_generate_body};

/// Where the remediation hint points.
pub const CONSOLE_URL: &str =
    "https://console.cloud.google.com/apis/library/generativelanguage.googleapis.com";

/// Build the single free-text prompt sent upstream.
pub fn build_prompt(details: &str, transcript: &str) -> String {
    format!(
        "You are an expert interview coach. Candidate details:\n{details}\nUser answer/transcript:\n{transcript}\n\nGenerate a short ideal response (max 80 words)."
    )
}

/// Diagnostic recorded for an identifier that did not produce an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// The upstream answered with an HTTP status.
    Http {
        model: String,
        status: u16,
        body: String,
        json: Option<Value>,
    },
    /// No HTTP status: connection refused, timeout, body read failure.
    Transport { model: String, message: String },
}

impl AttemptFailure {
    /// Model identifier this diagnostic belongs to.
    pub fn model(&self) -> &str {
        match self {
            Self::Http { model, .. } | Self::Transport { model, .. } => model,
        }
    }

    /// HTTP status, if the upstream answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }

    /// Human-readable failure message.
    pub fn message(&self) -> String {
        match self {
            Self::Http {
                status, body, json, ..
            } => extract_error_message(json.as_ref(), body, *status),
            Self::Transport { message, .. } => message.clone(),
        }
    }
}

/// Errors produced by the resolver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// A non-recoverable upstream failure aborted the loop.
    #[error("{message}")]
    UpstreamFatal {
        model: String,
        status: u16,
        message: String,
    },

    /// Every identifier was tried without success.
    #[error("{report}")]
    Exhausted {
        report: String,
        tried: Vec<String>,
        last: Option<AttemptFailure>,
    },
}

impl ResolveError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UpstreamFatal { .. } => "UPSTREAM_FATAL",
            Self::Exhausted { .. } => "MODELS_EXHAUSTED",
        }
    }

    /// HTTP status the serving layer should answer with.
    ///
    /// Exhaustion reuses the last diagnostic's status when it was an error
    /// status, `502` when the last attempt succeeded without usable text,
    /// and `500` when no upstream ever answered.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UpstreamFatal { status, .. } => *status,
            Self::Exhausted { last, .. } => match last.as_ref().and_then(AttemptFailure::status) {
                Some(status) if status >= 400 => status,
                Some(_) => 502,
                None => 500,
            },
        }
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Extracted answer text.
    pub answer: String,
    /// Identifier that produced the answer.
    pub model: String,
    /// Diagnostics for identifiers tried before the winner.
    pub skipped: Vec<AttemptFailure>,
}

/// Ordered model fallback over an [`UpstreamTransport`].
pub struct FallbackResolver {
    transport: Arc<dyn UpstreamTransport>,
    models: Vec<String>,
    temperature: f64,
    max_output_tokens: u32,
}

impl std::fmt::Debug for FallbackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackResolver")
            .field("models", &self.models)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl FallbackResolver {
    /// Create a resolver over an explicit transport.
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        models: Vec<String>,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            transport,
            models,
            temperature,
            max_output_tokens,
        }
    }

    /// Create a resolver talking HTTP to the configured upstream.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &UpstreamConfig) -> crate::error::Result<Self> {
        let transport = HttpUpstream::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(
            Arc::new(transport),
            config.models.clone(),
            config.temperature,
            config.max_output_tokens,
        ))
    }

    /// Configured identifiers, in priority order.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Resolve `prompt` to an answer.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UpstreamFatal`] on the first non-recoverable
    /// failure and [`ResolveError::Exhausted`] when no identifier was usable.
    pub async fn resolve(&self, api_key: &str, prompt: &str) -> Result<Resolution, ResolveError> {
        let body = build_generate_body(prompt, self.temperature, self.max_output_tokens);
        let mut skipped: Vec<AttemptFailure> = Vec::new();

        for model in &self.models {
            let reply = match self.transport.generate(model, api_key, &body).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(model = model.as_str(), error = %e, "upstream transport failure");
                    skipped.push(AttemptFailure::Transport {
                        model: model.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let ok = reply.is_success();
            let json = match parse_body(&reply.body) {
                Ok(json) => json,
                Err(e) => {
                    warn!(model = model.as_str(), status = reply.status, error = %e, "upstream body is not JSON");
                    if !ok {
                        skipped.push(AttemptFailure::Http {
                            model: model.clone(),
                            status: reply.status,
                            body: reply.body,
                            json: None,
                        });
                        continue;
                    }
                    None
                }
            };

            if !ok {
                let failure = AttemptFailure::Http {
                    model: model.clone(),
                    status: reply.status,
                    body: reply.body,
                    json,
                };
                if reply.status == 404 || reply.status == 400 {
                    warn!(model = model.as_str(), status = reply.status, "model unusable, trying next");
                    skipped.push(failure);
                    continue;
                }
                let message = failure.message();
                warn!(model = model.as_str(), status = reply.status, message = message.as_str(), "upstream fatal error");
                return Err(ResolveError::UpstreamFatal {
                    model: model.clone(),
                    status: reply.status,
                    message,
                });
            }

            if let Some(answer) = extract_answer(json.as_ref(), &reply.body) {
                info!(model = model.as_str(), "answer resolved");
                return Ok(Resolution {
                    answer,
                    model: model.clone(),
                    skipped,
                });
            }

            warn!(model = model.as_str(), "no answer text in successful response");
            skipped.push(AttemptFailure::Http {
                model: model.clone(),
                status: reply.status,
                body: reply.body,
                json,
            });
        }

        let last = skipped.pop();
        let report = exhaustion_report(last.as_ref(), &self.models);
        warn!(tried = self.models.len(), "all upstream models exhausted");
        Err(ResolveError::Exhausted {
            report,
            tried: self.models.clone(),
            last,
        })
    }
}

fn exhaustion_report(last: Option<&AttemptFailure>, tried: &[String]) -> String {
    let tried = tried.join(", ");
    match last {
        Some(failure) if failure.status().is_some() => format!(
            "API Error: {}. Tried: {tried}. Please ensure the Generative Language API is enabled at {CONSOLE_URL}",
            failure.message()
        ),
        _ => format!(
            "Could not connect to any Gemini model. Tried: {tried}. Please enable the Generative Language API at {CONSOLE_URL} and ensure your API key has proper permissions."
        ),
    }
}
