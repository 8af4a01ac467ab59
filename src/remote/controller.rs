//! Initiating side of a session: write commands, wait for the relayed answer.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info};

use super::channel::SessionChannel;
use super::session::{BroadcastAnswer, CommandAction, RemoteCommand};
use crate::error::{CopilotError, Result};

/// Status shown on the initiating device after a successful command write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Idle,
    Recording,
    Stopped,
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Recording => f.write_str("recording"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

pub struct RemoteController {
    channel: Arc<dyn SessionChannel>,
    device_label: Option<String>,
}

impl std::fmt::Debug for RemoteController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteController")
            .field("session", &self.channel.session_id())
            .field("device_label", &self.device_label)
            .finish()
    }
}

impl RemoteController {
    pub fn new(channel: Arc<dyn SessionChannel>, device_label: Option<String>) -> Self {
        Self {
            channel,
            device_label,
        }
    }

    /// Overwrite the control slot with `action`.
    ///
    /// No acknowledgement exists beyond the write itself.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the write fails; the status is then unchanged.
    pub async fn send(&self, action: CommandAction) -> Result<(RemoteCommand, RemoteStatus)> {
        let command = RemoteCommand::now(action, self.device_label.clone());
        self.channel.publish_command(&command).await?;
        let status = match action {
            CommandAction::Start => RemoteStatus::Recording,
            CommandAction::Stop => RemoteStatus::Stopped,
        };
        info!(session = self.channel.session_id(), %action, %status, "command sent");
        Ok((command, status))
    }

    /// Answer currently in the slot, to pass to [`Self::wait_for_answer`].
    ///
    /// Read it before [`Self::send`] so a leftover answer from an earlier
    /// exchange can be told apart from the reply to this command.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the slot cannot be read.
    pub async fn current_answer(&self) -> Result<Option<BroadcastAnswer>> {
        self.channel.latest_answer().await
    }

    /// Wait, without timeout, for the next answer that differs from `previous`.
    ///
    /// Timestamps are written by other devices and are not compared.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be opened or ends first.
    pub async fn wait_for_answer(
        &self,
        previous: Option<BroadcastAnswer>,
    ) -> Result<BroadcastAnswer> {
        let mut answers = self.channel.answer_updates().await?;
        while let Some(answer) = answers.next().await {
            if previous.as_ref() != Some(&answer) {
                return Ok(answer);
            }
            debug!(timestamp = answer.timestamp, "skipping answer present before send");
        }
        Err(CopilotError::Channel(
            "answer subscription ended before an answer arrived".to_owned(),
        ))
    }
}
