//! Startup capability probe and operating-mode selection.

use std::io::IsTerminal;

use serde::Serialize;

use super::Recognizer;
use crate::config::CaptureBackend;

/// What this host can do, probed once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// A speech recognizer is configured and usable.
    pub speech_recognition: bool,
    /// Which capture backend is configured.
    pub backend: CaptureBackend,
    /// Standard input is an interactive terminal.
    pub interactive_input: bool,
}

/// How this device participates in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Capture speech here.
    LocalCapture,
    /// Drive a peer device's capture through the session channel.
    RemoteControlled,
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalCapture => f.write_str("local capture"),
            Self::RemoteControlled => f.write_str("remote controlled"),
        }
    }
}

/// Probe the host using the configured recognizer.
pub fn probe(backend: CaptureBackend, recognizer: &dyn Recognizer) -> Capabilities {
    Capabilities {
        speech_recognition: recognizer.is_available(),
        backend,
        interactive_input: std::io::stdin().is_terminal(),
    }
}

/// Pick the operating mode. Pure: depends only on the descriptor.
pub fn select_mode(capabilities: &Capabilities) -> OperatingMode {
    if capabilities.speech_recognition {
        OperatingMode::LocalCapture
    } else {
        OperatingMode::RemoteControlled
    }
}
