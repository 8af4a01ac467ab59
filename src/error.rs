//! Error types for the interview copilot.

/// Top-level error type for the copilot library.
#[derive(Debug, thiserror::Error)]
pub enum CopilotError {
    /// Configuration error (missing credential, unreadable config file).
    #[error("config error: {0}")]
    Config(String),

    /// Answer-generation failure surfaced by the fallback resolver.
    #[error("resolver error: {0}")]
    Resolve(#[from] crate::resolver::ResolveError),

    /// History store error.
    #[error("store error: {0}")]
    Store(#[from] crate::history::StoreError),

    /// Speech capture error.
    #[error("capture error: {0}")]
    Capture(#[from] crate::capture::CaptureError),

    /// HTTP transport error talking to the copilot server.
    #[error("http error: {0}")]
    Http(String),

    /// Remote session channel error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Server lifecycle error (bind, serve).
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CopilotError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CopilotError>;
