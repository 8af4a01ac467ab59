//! Configuration types for the serving process and the device client.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default ordered list of upstream model identifiers.
pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-1.5-pro-001",
    "gemini-1.5-flash-001",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "gemini-pro",
];

/// Default shared session identifier for remote control.
pub const DEFAULT_SESSION_ID: &str = "live-session-1";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotConfig {
    /// HTTP server bind settings.
    pub server: ServerConfig,
    /// Upstream generative API settings.
    pub upstream: UpstreamConfig,
    /// History store settings.
    pub history: HistoryConfig,
    /// Device client settings.
    pub client: ClientConfig,
    /// Remote session channel settings.
    pub remote: RemoteConfig,
    /// Speech capture settings.
    pub capture: CaptureConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (`0` = auto-assign).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
        }
    }
}

/// Upstream generative-language API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API base URL (without the `/v1beta` suffix).
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    ///
    /// Read on every request, never at startup.
    pub api_key_env: String,
    /// Model identifiers tried in order until one yields an answer.
    pub models: Vec<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens in the generated answer.
    pub max_output_tokens: u32,
    /// Per-attempt request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_owned(),
            api_key_env: "GOOGLE_API_KEY".to_owned(),
            models: DEFAULT_MODELS.iter().map(|m| (*m).to_owned()).collect(),
            temperature: 0.2,
            max_output_tokens: 256,
            request_timeout_secs: 30,
        }
    }
}

/// History store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// SQLite database path (`None` = platform data dir).
    pub db_path: Option<PathBuf>,
    /// Keep history in memory only (nothing written to disk).
    pub in_memory: bool,
    /// Number of exchanges returned by a history listing.
    pub list_limit: usize,
    /// Create the creation-time index when opening the store.
    ///
    /// Without it, ordered listings report a missing index and clients
    /// fall back to a full unordered fetch.
    pub create_index: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            in_memory: false,
            list_limit: 50,
            create_index: true,
        }
    }
}

impl HistoryConfig {
    /// Effective database path.
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(crate::paths::history_db)
    }
}

/// Device client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the copilot server.
    pub server_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8787".to_owned(),
        }
    }
}

/// Remote session channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Shared session identifier.
    pub session_id: String,
    /// Label written into `initiatedFrom` on outgoing commands.
    pub device_label: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_owned(),
            device_label: None,
        }
    }
}

/// Speech recognizer backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Final segments typed line-by-line on standard input.
    #[default]
    Stdin,
    /// No local recognizer; the device runs in remote-controlled mode.
    None,
}

/// Speech capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Recognizer backend.
    pub backend: CaptureBackend,
    /// BCP-47 recognition language.
    pub language: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::default(),
            language: "en-US".to_owned(),
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily-rotated log file.
    pub file: bool,
    /// Log file directory (default: [`crate::paths::logs_dir`]).
    pub file_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Directory for the rotated log file, when file logging is enabled.
    pub fn resolved_file_dir(&self) -> Option<PathBuf> {
        self.file
            .then(|| self.file_dir.clone().unwrap_or_else(crate::paths::logs_dir))
    }
}

impl CopilotConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::CopilotError::Config(e.to_string()))
    }

    /// Load from `path` if given, else from the default path if it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::error::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Self::default_config_path();
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CopilotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::paths::config_file()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CopilotConfig::default();
        assert_eq!(config.upstream.models.len(), DEFAULT_MODELS.len());
        assert_eq!(config.upstream.models[0], "gemini-2.0-flash");
        assert!((config.upstream.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.upstream.max_output_tokens, 256);
        assert_eq!(config.history.list_limit, 50);
        assert_eq!(config.remote.session_id, DEFAULT_SESSION_ID);
        assert_eq!(config.capture.language, "en-US");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: CopilotConfig = toml::from_str(
            r#"
[server]
port = 9000

[upstream]
models = ["only-model"]

[capture]
backend = "none"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.upstream.models, vec!["only-model".to_owned()]);
        assert_eq!(config.upstream.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.capture.backend, CaptureBackend::None);
    }

    #[test]
    fn file_logging_is_opt_in() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.resolved_file_dir(), None);

        logging.file = true;
        assert_eq!(logging.resolved_file_dir(), Some(crate::paths::logs_dir()));

        logging.file_dir = Some(PathBuf::from("/var/log/copilot"));
        assert_eq!(
            logging.resolved_file_dir(),
            Some(PathBuf::from("/var/log/copilot"))
        );
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CopilotConfig::default();
        config.remote.session_id = "desk-42".to_owned();
        config.history.create_index = false;
        config.save_to_file(&path).unwrap();

        let loaded = CopilotConfig::from_file(&path).unwrap();
        assert_eq!(loaded.remote.session_id, "desk-42");
        assert!(!loaded.history.create_index);
    }

    #[test]
    fn load_with_explicit_missing_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CopilotConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
