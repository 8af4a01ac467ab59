//! HTTP server for the copilot.
//!
//! Hosts the answer endpoint, the shared exchange history and the session
//! mailboxes, so every device only needs this one base URL.
//!
//! ## Endpoints
//!
//! - `POST /api/process` — generate an answer through the fallback resolver
//! - `GET|POST /api/interviews` — list / append exchanges
//! - `GET|PUT /api/sessions/{id}/control` — read / overwrite the command slot
//! - `GET|PUT /api/sessions/{id}/answer` — read / overwrite the answer slot
//! - `GET /api/sessions/{id}/control/events`, `.../answer/events` — SSE
//! - `GET /health` — liveness

mod history;
mod process;
mod sessions;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::ErrorResponse;
use crate::config::{CopilotConfig, ServerConfig};
use crate::error::{CopilotError, Result};
use crate::history::{HistoryStore, InMemoryHistoryStore, SqliteHistoryStore};
use crate::remote::SessionHub;
use crate::resolver::FallbackResolver;

/// Where the upstream API key comes from.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Read this environment variable on every request.
    Env(String),
    /// A fixed value (`None` behaves like an unset variable).
    Fixed(Option<String>),
}

impl Credential {
    /// Variable name used in the misconfiguration message.
    pub fn name(&self) -> &str {
        match self {
            Self::Env(var) => var,
            Self::Fixed(_) => "GOOGLE_API_KEY",
        }
    }

    /// Current value; blank counts as unset.
    pub fn resolve(&self) -> Option<String> {
        let value = match self {
            Self::Env(var) => std::env::var(var).ok(),
            Self::Fixed(value) => value.clone(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// Everything the handlers need.
#[derive(Clone)]
pub struct ServerServices {
    pub resolver: Arc<FallbackResolver>,
    pub credential: Credential,
    pub history: Arc<dyn HistoryStore>,
    pub sessions: Arc<SessionHub>,
    /// Default `limit` for ordered history listings.
    pub list_limit: usize,
}

impl std::fmt::Debug for ServerServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerServices")
            .field("resolver", &self.resolver)
            .field("credential", &self.credential.name())
            .field("list_limit", &self.list_limit)
            .finish_non_exhaustive()
    }
}

impl ServerServices {
    /// Build services from configuration: HTTP upstream, SQLite (or
    /// in-memory) history, empty session hub.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the history database cannot be
    /// initialised.
    pub fn from_config(config: &CopilotConfig) -> Result<Self> {
        let resolver = FallbackResolver::from_config(&config.upstream)?;
        let history: Arc<dyn HistoryStore> = if config.history.in_memory {
            Arc::new(InMemoryHistoryStore::new())
        } else {
            let path = config.history.resolved_db_path();
            info!(path = %path.display(), "opening history database");
            Arc::new(SqliteHistoryStore::open(&path, config.history.create_index)?)
        };
        Ok(Self {
            resolver: Arc::new(resolver),
            credential: Credential::Env(config.upstream.api_key_env.clone()),
            history,
            sessions: Arc::new(SessionHub::new()),
            list_limit: config.history.list_limit,
        })
    }
}

/// Build the router over `services`.
pub fn router(services: ServerServices) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(process::routes())
        .merge(history::routes())
        .merge(sessions::routes())
        .with_state(services)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// JSON error response with an optional code.
pub(crate) fn error_response(status: u16, body: ErrorResponse) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

/// Running HTTP server.
pub struct AppServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for AppServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServer").field("addr", &self.addr).finish()
    }
}

impl AppServer {
    /// Bind `{host}:{port}` (port `0` picks a free one) and serve in a
    /// background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn start(services: ServerServices, config: &ServerConfig) -> Result<Self> {
        let app = router(services);
        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| CopilotError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| CopilotError::Server(format!("failed to get local addr: {e}")))?;

        info!("copilot server listening on http://{addr}");

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = served {
                error!("copilot server error: {e}");
            }
        });

        Ok(Self {
            addr,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Base URL clients should use.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and let in-flight requests finish.
    /// Open SSE subscriptions keep the task alive until they disconnect.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the server task to finish.
    pub async fn wait(mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            error!("copilot server task failed: {e}");
        }
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
