//! History backend that talks to a copilot server over HTTP.

use async_trait::async_trait;

use super::{Exchange, HistoryStore, StoreError};
use crate::api::{AppendResponse, ErrorResponse, ListResponse};

/// Client-side [`HistoryStore`] backed by the server's `/api/interviews` routes.
#[derive(Debug, Clone)]
pub struct HttpHistoryStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHistoryStore {
    /// Create a store for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a store sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/api/interviews", self.base_url.trim_end_matches('/'))
    }

    async fn list(&self, query: &[(&str, String)]) -> Result<Vec<Exchange>, StoreError> {
        let response = self
            .client
            .get(self.url())
            .query(query)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("history request failed: {e}")))?;
        let response = check_status(response).await?;
        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("invalid history response: {e}")))?;
        Ok(body.exchanges)
    }
}

#[async_trait]
impl HistoryStore for HttpHistoryStore {
    async fn append(&self, exchange: Exchange) -> Result<String, StoreError> {
        let response = self
            .client
            .post(self.url())
            .json(&exchange)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("history request failed: {e}")))?;
        let response = check_status(response).await?;
        let body: AppendResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("invalid append response: {e}")))?;
        Ok(body.id)
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<Exchange>, StoreError> {
        self.list(&[("limit", limit.to_string()), ("ordered", "true".to_owned())])
            .await
    }

    async fn fetch_all(&self) -> Result<Vec<Exchange>, StoreError> {
        self.list(&[("ordered", "false".to_owned())]).await
    }
}

/// Map a non-2xx response back to the [`StoreError`] the server classified.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let parsed: Option<ErrorResponse> = serde_json::from_str(&text).ok();
    let message = match &parsed {
        Some(e) => e.error.clone(),
        None if text.is_empty() => format!("HTTP {}", status.as_u16()),
        None => text.clone(),
    };
    let code = parsed.and_then(|e| e.code);

    Err(match (status.as_u16(), code.as_deref()) {
        (401 | 403, _) | (_, Some("PERMISSION_DENIED")) => StoreError::PermissionDenied(message),
        (_, Some("MISSING_INDEX")) => StoreError::MissingIndex(message),
        _ => StoreError::Backend(message),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn append_posts_exchange_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/interviews"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "abc"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpHistoryStore::new(server.uri());
        let id = store.append(Exchange::new("c", "t", "a")).await.unwrap();
        assert_eq!(id, "abc");
    }

    #[tokio::test]
    async fn missing_index_code_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/interviews"))
            .and(query_param("ordered", "true"))
            .respond_with(ResponseTemplate::new(409).set_body_json(
                json!({"error": "index not defined", "code": "MISSING_INDEX"}),
            ))
            .mount(&server)
            .await;

        let err = HttpHistoryStore::new(server.uri())
            .query_recent(50)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingIndex(_)));
    }

    #[tokio::test]
    async fn forbidden_maps_to_permission_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/interviews"))
            .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = HttpHistoryStore::new(server.uri())
            .append(Exchange::new("c", "t", "a"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::PermissionDenied("nope".into()));
    }

    #[tokio::test]
    async fn unordered_fetch_uses_ordered_false() {
        let server = MockServer::start().await;
        let ex = Exchange::new("c", "t", "a");
        Mock::given(method("GET"))
            .and(path("/api/interviews"))
            .and(query_param("ordered", "false"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"exchanges": [ex.clone()]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let all = HttpHistoryStore::new(server.uri()).fetch_all().await.unwrap();
        assert_eq!(all, vec![ex]);
    }
}
