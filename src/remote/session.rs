//! Session identifiers, mailbox payloads and the per-session slot registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::mailbox::Mailbox;

/// Action carried by a [`RemoteCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    /// Begin capture on the executing device.
    Start,
    /// End capture on the executing device.
    Stop,
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

/// Value of the `control` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommand {
    pub action: CommandAction,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_from: Option<String>,
}

impl RemoteCommand {
    /// Command stamped with the current time.
    pub fn now(action: CommandAction, initiated_from: Option<String>) -> Self {
        Self {
            action,
            timestamp: now_millis(),
            initiated_from,
        }
    }
}

/// Value of the `answer` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAnswer {
    pub answer: String,
    pub transcript: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl BroadcastAnswer {
    /// Answer stamped with the current time.
    pub fn now(answer: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            transcript: transcript.into(),
            timestamp: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// The two mailboxes belonging to one session id.
#[derive(Debug, Default)]
pub struct SessionSlots {
    pub control: Mailbox<RemoteCommand>,
    pub answer: Mailbox<BroadcastAnswer>,
}

/// Registry of sessions, created lazily on first access.
#[derive(Debug, Default)]
pub struct SessionHub {
    sessions: Mutex<HashMap<String, Arc<SessionSlots>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots for `session_id`, creating them if needed.
    pub fn slots(&self, session_id: &str) -> Arc<SessionSlots> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            sessions
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(SessionSlots::default())),
        )
    }

    /// Number of sessions touched so far.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn command_wire_format() {
        let cmd = RemoteCommand {
            action: CommandAction::Start,
            timestamp: 1_700_000_000_000,
            initiated_from: Some("mobile".into()),
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"action": "start", "timestamp": 1_700_000_000_000_i64, "initiatedFrom": "mobile"})
        );

        let parsed: RemoteCommand =
            serde_json::from_value(json!({"action": "stop", "timestamp": 5})).unwrap();
        assert_eq!(parsed.action, CommandAction::Stop);
        assert!(parsed.initiated_from.is_none());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let parsed = serde_json::from_value::<RemoteCommand>(json!({"action": "pause", "timestamp": 1}));
        assert!(parsed.is_err());
    }

    #[test]
    fn hub_reuses_slots_per_session() {
        let hub = SessionHub::new();
        hub.slots("a").control.publish(RemoteCommand::now(CommandAction::Start, None));
        assert!(hub.slots("a").control.latest().is_some());
        assert!(hub.slots("b").control.latest().is_none());
        assert_eq!(hub.len(), 2);
    }
}
