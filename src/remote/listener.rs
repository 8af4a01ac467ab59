//! Executing side of a session: react to commands written to the control slot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::SessionChannel;
use super::session::{CommandAction, RemoteCommand};
use crate::error::Result;

/// Delay before re-subscribing after the command stream drops.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Turns observed slot values into actions, once per distinct value.
///
/// A channel may redeliver the current value (reconnects, duplicate
/// notifications). Only a value that differs from the last one observed
/// produces an action.
#[derive(Debug, Default)]
pub struct CommandDeduper {
    last: Option<RemoteCommand>,
}

impl CommandDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the action to perform for `command`, or `None` for a repeat.
    pub fn observe(&mut self, command: RemoteCommand) -> Option<CommandAction> {
        if self.last.as_ref() == Some(&command) {
            return None;
        }
        let action = command.action;
        self.last = Some(command);
        Some(action)
    }
}

/// What the executing device does on each command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn on_start(&self);
    async fn on_stop(&self);
}

/// Subscribes to a session's control slot and dispatches commands.
pub struct RemoteControlListener {
    channel: Arc<dyn SessionChannel>,
    resubscribe_delay: Duration,
}

impl std::fmt::Debug for RemoteControlListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteControlListener")
            .field("session", &self.channel.session_id())
            .finish_non_exhaustive()
    }
}

impl RemoteControlListener {
    pub fn new(channel: Arc<dyn SessionChannel>) -> Self {
        Self {
            channel,
            resubscribe_delay: RESUBSCRIBE_DELAY,
        }
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Dispatch commands until `cancel` fires. Dropped subscriptions are
    /// re-opened; the dedup state survives reconnects.
    ///
    /// # Errors
    ///
    /// Currently never returns an error; subscription failures are retried.
    pub async fn run(&self, handler: &dyn CommandHandler, cancel: CancellationToken) -> Result<()> {
        let session = self.channel.session_id().to_owned();
        let mut dedup = CommandDeduper::new();
        info!(session = session.as_str(), "listening for remote commands");

        while !cancel.is_cancelled() {
            let subscribed = tokio::select! {
                () = cancel.cancelled() => break,
                s = self.channel.command_updates() => s,
            };
            match subscribed {
                Ok(mut commands) => loop {
                    let next = tokio::select! {
                        () = cancel.cancelled() => return Ok(()),
                        next = commands.next() => next,
                    };
                    let Some(command) = next else {
                        warn!(session = session.as_str(), "command subscription ended");
                        break;
                    };
                    debug!(session = session.as_str(), ?command, "command observed");
                    match dedup.observe(command) {
                        Some(CommandAction::Start) => {
                            info!(session = session.as_str(), "remote start");
                            handler.on_start().await;
                        }
                        Some(CommandAction::Stop) => {
                            info!(session = session.as_str(), "remote stop");
                            handler.on_stop().await;
                        }
                        None => debug!(session = session.as_str(), "repeat command ignored"),
                    }
                },
                Err(e) => warn!(session = session.as_str(), error = %e, "command subscription failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }
        Ok(())
    }
}
