//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/interview-copilot/` | `~/.local/share/interview-copilot/` |
//! | Config | `~/Library/Application Support/interview-copilot/` | `~/.config/interview-copilot/` |
//!
//! # Environment Overrides
//!
//! - `COPILOT_DATA_DIR` — overrides [`data_dir`]
//! - `COPILOT_CONFIG_DIR` — overrides [`config_dir`]

use std::path::PathBuf;

const APP_DIR: &str = "interview-copilot";

/// Application data root directory.
///
/// Holds the history database and rotated log files.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("COPILOT_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/interview-copilot-data"))
}

/// Application config directory.
///
/// Holds `config.toml` and `preferences.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("COPILOT_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/interview-copilot-config"))
}

/// Path to the main configuration file.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Path to the per-device preferences file (job context).
#[must_use]
pub fn preferences_file() -> PathBuf {
    config_dir().join("preferences.toml")
}

/// Default path of the SQLite history database.
#[must_use]
pub fn history_db() -> PathBuf {
    data_dir().join("history.db")
}

/// Directory for rotated log files.
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
