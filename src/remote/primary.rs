//! Primary device: remote commands drive local capture, answers go back out.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::channel::SessionChannel;
use super::listener::{CommandHandler, RemoteControlListener};
use super::session::BroadcastAnswer;
use crate::capture::SpeechCapture;
use crate::controller::{AnswerController, ControllerEvent, SubmitOutcome};
use crate::error::Result;

/// Capture + controller pair driven by remote commands.
#[derive(Debug, Clone)]
pub struct CaptureDriver {
    capture: SpeechCapture,
    controller: AnswerController,
    job_context: Arc<str>,
}

impl CaptureDriver {
    pub fn new(capture: SpeechCapture, controller: AnswerController, job_context: &str) -> Self {
        Self {
            capture,
            controller,
            job_context: Arc::from(job_context),
        }
    }
}

#[async_trait]
impl CommandHandler for CaptureDriver {
    async fn on_start(&self) {
        let controller = self.controller.clone();
        let job_context = Arc::clone(&self.job_context);
        let started = self
            .capture
            .start(move |transcript| {
                if let SubmitOutcome::Rejected(reason) = controller.submit(&job_context, &transcript) {
                    warn!(reason = reason.as_str(), "captured transcript not submitted");
                }
            })
            .await;
        if let Err(e) = started {
            warn!(error = %e, "remote start ignored");
        }
    }

    async fn on_stop(&self) {
        if !self.capture.stop() {
            info!("remote stop with no active capture");
        }
    }
}

/// Run the primary device until `cancel` fires.
///
/// Completed answers are published to the session's answer slot; every
/// controller event is also handed to `on_event` for local display.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn run_primary<F>(
    channel: Arc<dyn SessionChannel>,
    driver: CaptureDriver,
    mut events: mpsc::UnboundedReceiver<ControllerEvent>,
    mut on_event: F,
    cancel: CancellationToken,
) -> Result<()>
where
    F: FnMut(&ControllerEvent) + Send,
{
    let relay_channel = Arc::clone(&channel);
    let relay_cancel = cancel.clone();
    let relay = async move {
        loop {
            let event = tokio::select! {
                () = relay_cancel.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else { break };
            on_event(&event);
            if let ControllerEvent::Completed {
                answer, transcript, ..
            } = &event
            {
                let broadcast = BroadcastAnswer::now(answer.clone(), transcript.clone());
                if let Err(e) = relay_channel.publish_answer(&broadcast).await {
                    warn!(error = %e, "failed to publish answer");
                }
            }
        }
    };

    let listener = RemoteControlListener::new(channel);
    let (listened, ()) = tokio::join!(listener.run(&driver, cancel.clone()), relay);
    driver.capture.stop();
    driver.controller.cancel();
    listened
}
