//! Shared harness: a real [`AppServer`] on an ephemeral port, backed by an
//! in-memory history store and an upstream pointing at a wiremock server.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use copilot::config::{ServerConfig, UpstreamConfig};
use copilot::history::{HistoryStore, InMemoryHistoryStore};
use copilot::remote::SessionHub;
use copilot::resolver::FallbackResolver;
use copilot::server::Credential;
use copilot::{AppServer, ServerServices};
use serde_json::{Value, json};
use wiremock::ResponseTemplate;

pub const TEST_KEY: &str = "test-key";

/// Upstream path for `model`.
pub fn model_path(model: &str) -> String {
    format!("/v1beta/models/{model}:generateContent")
}

/// Successful upstream reply carrying `text`.
pub fn answer_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"parts": [{"text": text}]}}]
    }))
}

/// Upstream error reply in the `{error: {message}}` shape.
pub fn error_reply(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": {"code": status, "message": message}
    }))
}

pub struct Harness {
    pub upstream_uri: String,
    pub models: Vec<String>,
    pub credential: Credential,
    pub history: Arc<dyn HistoryStore>,
}

impl Harness {
    pub fn new(upstream_uri: impl Into<String>, models: &[&str]) -> Self {
        Self {
            upstream_uri: upstream_uri.into(),
            models: models.iter().map(|m| (*m).to_owned()).collect(),
            credential: Credential::Fixed(Some(TEST_KEY.to_owned())),
            history: Arc::new(InMemoryHistoryStore::new()),
        }
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub async fn start(self) -> AppServer {
        let upstream = UpstreamConfig {
            base_url: self.upstream_uri,
            models: self.models,
            request_timeout_secs: 5,
            ..Default::default()
        };
        let services = ServerServices {
            resolver: Arc::new(FallbackResolver::from_config(&upstream).unwrap()),
            credential: self.credential,
            history: self.history,
            sessions: Arc::new(SessionHub::new()),
            list_limit: 50,
        };
        let config = ServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 0,
        };
        AppServer::start(services, &config).await.unwrap()
    }
}

/// POST `body` to `/api/process` and return status plus parsed JSON.
pub async fn post_process(server: &AppServer, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("{}/api/process", server.url()))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
