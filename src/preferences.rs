//! Per-device preferences: the persisted job context.
//!
//! Stored as TOML in the config directory:
//!
//! ```toml
//! jobContext = "Senior Software Engineer with ..."
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CopilotError, Result};

/// Job context used until the user sets their own, and restored by reset.
pub const DEFAULT_JOB_CONTEXT: &str = "Senior Software Engineer with 5+ years of experience in React, Node.js, and TypeScript. Specialized in building scalable web applications and microservices. Strong background in system design, database optimization, and cloud infrastructure (AWS, Docker). Passionate about clean code, testing, and mentoring junior developers.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct PreferencesFile {
    #[serde(rename = "jobContext", skip_serializing_if = "Option::is_none")]
    job_context: Option<String>,
}

/// File-backed preference store.
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    file: PreferencesFile,
}

impl Preferences {
    /// Load from `path`; a missing file yields empty preferences.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| CopilotError::Config(format!("{}: {e}", path.display())))?
        } else {
            PreferencesFile::default()
        };
        Ok(Self {
            path: path.to_owned(),
            file,
        })
    }

    /// Load from the default location.
    ///
    /// # Errors
    ///
    /// See [`Preferences::load`].
    pub fn load_default() -> Result<Self> {
        Self::load(&crate::paths::preferences_file())
    }

    /// Saved job context, or the default one if nothing was ever saved.
    /// A saved blank context stays blank.
    pub fn job_context(&self) -> &str {
        self.file.job_context.as_deref().unwrap_or(DEFAULT_JOB_CONTEXT)
    }

    /// Whether a job context has been saved explicitly.
    pub fn has_saved_context(&self) -> bool {
        self.file.job_context.is_some()
    }

    /// Save a new job context.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set_job_context(&mut self, context: &str) -> Result<()> {
        self.file.job_context = Some(context.to_owned());
        self.save()
    }

    /// Restore and save the default job context.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn reset_job_context(&mut self) -> Result<()> {
        self.set_job_context(DEFAULT_JOB_CONTEXT)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(&self.file).map_err(|e| CopilotError::Config(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }
}
