//! Answer and error-message extraction from upstream response bodies.

use serde_json::Value;

/// Extract answer text from a successful upstream response.
///
/// Priority: `candidates[0].content.parts[0].text`, then
/// `candidates[0].text`, then the raw body. Empty strings are skipped at
/// every level, so an all-empty response yields `None`.
pub fn extract_answer(json: Option<&Value>, raw: &str) -> Option<String> {
    let candidate = json
        .and_then(|j| j.get("candidates"))
        .and_then(|c| c.get(0));

    let primary = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(Value::as_str);
    if let Some(text) = primary.filter(|t| !t.is_empty()) {
        return Some(text.to_owned());
    }

    let alternate = candidate.and_then(|c| c.get("text")).and_then(Value::as_str);
    if let Some(text) = alternate.filter(|t| !t.is_empty()) {
        return Some(text.to_owned());
    }

    if raw.is_empty() {
        None
    } else {
        Some(raw.to_owned())
    }
}

/// Extract a human-readable failure message from an upstream error body.
///
/// Uses `error.message` when present, else the raw body, else `HTTP {status}`.
pub fn extract_error_message(json: Option<&Value>, raw: &str, status: u16) -> String {
    if let Some(message) = json
        .and_then(|j| j.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
    {
        return message.to_owned();
    }
    if !raw.is_empty() {
        return raw.to_owned();
    }
    format!("HTTP {status}")
}

/// Parse a body as JSON, treating an empty body as "no JSON" rather than a failure.
///
/// Returns `Ok(None)` for an empty body and `Err` only when a non-empty
/// body is not valid JSON.
pub fn parse_body(raw: &str) -> Result<Option<Value>, serde_json::Error> {
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw).map(Some)
}
