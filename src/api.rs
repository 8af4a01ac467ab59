//! Wire types shared by the copilot server and its HTTP clients.

use serde::{Deserialize, Serialize};

use crate::history::Exchange;

/// Body of `POST /api/process`.
///
/// Both fields are optional on the wire so a missing field is answered with
/// a 400 by the handler rather than a deserialization rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Candidate background.
    #[serde(default)]
    pub details: Option<String>,
    /// Spoken answer to improve.
    #[serde(default)]
    pub transcript: Option<String>,
}

impl ProcessRequest {
    /// Build a request with both fields set.
    pub fn new(details: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            transcript: Some(transcript.into()),
        }
    }
}

/// Successful `POST /api/process` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    /// Generated answer.
    pub answer: String,
}

/// Error body used by every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable code, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Message-only error.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    /// Error with a stable code.
    pub fn with_code(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: Some(code.to_owned()),
        }
    }
}

/// Response of `POST /api/interviews`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResponse {
    /// Identifier assigned to the new exchange.
    pub id: String,
}

/// Response of `GET /api/interviews`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Exchanges (newest first when ordered).
    pub exchanges: Vec<Exchange>,
}

/// Query string of `GET /api/interviews`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListQuery {
    /// Maximum number of exchanges (ordered listings only).
    #[serde(default)]
    pub limit: Option<usize>,
    /// Use the indexed, ordered query (`true`) or return everything (`false`).
    #[serde(default = "default_ordered")]
    pub ordered: bool,
}

fn default_ordered() -> bool {
    true
}
