//! Answer request controller.
//!
//! Owns at most one in-flight answer request. States move
//! `Idle -> Requesting -> (Streaming) -> Idle`; submitting while a request is
//! outstanding cancels it through its [`CancellationToken`], and every event
//! the old request would still produce is dropped. Only the current request
//! may render, and only a rendered success is written to history.
//!
//! Rendering is expressed as [`ControllerEvent`]s on an unbounded channel;
//! the caller decides how to display them.

pub mod client;
pub mod decode;

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::client::{AnswerClient, AnswerReply};
use self::decode::Utf8ChunkDecoder;
use crate::api::ProcessRequest;
use crate::history::{Exchange, HistoryAdapter, SaveStatus};

/// Shown while waiting for the first byte of an answer.
pub const PROCESSING_PLACEHOLDER: &str = "⚡ Processing...";
/// Shown when a request is attempted without job context.
pub const MISSING_CONTEXT_MESSAGE: &str = "Error: Please fill in job context first!";
/// Shown when an explicit send has nothing to send.
pub const MISSING_TRANSCRIPT_MESSAGE: &str = "No transcript available. Please record first.";

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Requesting { request: u64 },
    Streaming { request: u64 },
}

/// Something the display should reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Replace the displayed answer text.
    Display { request: u64, text: String },
    /// The request finished with an answer.
    Completed {
        request: u64,
        transcript: String,
        answer: String,
    },
    /// The request failed; `message` is the text to display.
    Failed { request: u64, message: String },
    /// A submission was refused before any request was made.
    Rejected { message: String },
    /// Save-status indicator update for a completed request.
    SaveStatus { request: u64, status: SaveStatus },
}

/// Handle to a started request.
#[derive(Debug)]
pub struct RequestHandle {
    pub request: u64,
    task: JoinHandle<()>,
}

impl RequestHandle {
    /// Wait until the request (and its history write) is done or discarded.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            warn!(request = self.request, error = %e, "answer task failed");
        }
    }
}

/// Result of [`AnswerController::submit`].
#[derive(Debug)]
pub enum SubmitOutcome {
    Started(RequestHandle),
    Rejected(String),
}

#[derive(Debug)]
struct Active {
    request: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    state: ControllerState,
    active: Option<Active>,
    next_request: u64,
}

struct Core {
    client: Arc<dyn AnswerClient>,
    history: Option<HistoryAdapter>,
    inner: Mutex<Inner>,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

/// Single-flight answer request controller.
#[derive(Clone)]
pub struct AnswerController {
    core: Arc<Core>,
}

impl std::fmt::Debug for AnswerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AnswerController {
    /// Create a controller and the receiver for its events.
    pub fn new(
        client: Arc<dyn AnswerClient>,
        history: Option<HistoryAdapter>,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let core = Core {
            client,
            history,
            inner: Mutex::new(Inner {
                state: ControllerState::Idle,
                active: None,
                next_request: 1,
            }),
            events,
        };
        (
            Self {
                core: Arc::new(core),
            },
            rx,
        )
    }

    pub fn state(&self) -> ControllerState {
        self.core.lock().state
    }

    /// Start a request for `transcript`, cancelling any outstanding one.
    ///
    /// Refused without a request when the job context or transcript is blank.
    pub fn submit(&self, job_context: &str, transcript: &str) -> SubmitOutcome {
        if job_context.trim().is_empty() {
            return self.reject(MISSING_CONTEXT_MESSAGE);
        }
        if transcript.trim().is_empty() {
            return self.reject(MISSING_TRANSCRIPT_MESSAGE);
        }

        let cancel = CancellationToken::new();
        let request = {
            let mut inner = self.core.lock();
            if let Some(previous) = inner.active.take() {
                debug!(request = previous.request, "cancelling superseded request");
                previous.cancel.cancel();
            }
            let request = inner.next_request;
            inner.next_request += 1;
            inner.active = Some(Active {
                request,
                cancel: cancel.clone(),
            });
            inner.state = ControllerState::Requesting { request };
            self.core.emit(ControllerEvent::Display {
                request,
                text: PROCESSING_PLACEHOLDER.to_owned(),
            });
            request
        };

        let core = Arc::clone(&self.core);
        let job_context = job_context.to_owned();
        let transcript = transcript.to_owned();
        let task = tokio::spawn(async move {
            core.run(request, cancel, job_context, transcript).await;
        });
        SubmitOutcome::Started(RequestHandle { request, task })
    }

    /// Cancel the outstanding request, if any. Silent: no event is emitted.
    pub fn cancel(&self) -> bool {
        let mut inner = self.core.lock();
        inner.state = ControllerState::Idle;
        match inner.active.take() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn reject(&self, message: &str) -> SubmitOutcome {
        self.core.emit(ControllerEvent::Rejected {
            message: message.to_owned(),
        });
        SubmitOutcome::Rejected(message.to_owned())
    }
}

impl Core {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit(&self, event: ControllerEvent) {
        // A dropped receiver just means nobody is watching.
        let _ = self.events.send(event);
    }

    fn is_current(inner: &Inner, request: u64) -> bool {
        inner
            .active
            .as_ref()
            .is_some_and(|a| a.request == request && !a.cancel.is_cancelled())
    }

    /// Emit only while `request` is still the current one.
    fn emit_if_current(&self, request: u64, event: ControllerEvent) -> bool {
        let inner = self.lock();
        if Self::is_current(&inner, request) {
            self.emit(event);
            true
        } else {
            false
        }
    }

    fn mark_streaming(&self, request: u64) {
        let mut inner = self.lock();
        if Self::is_current(&inner, request) {
            inner.state = ControllerState::Streaming { request };
        }
    }

    async fn run(
        self: Arc<Self>,
        request: u64,
        cancel: CancellationToken,
        job_context: String,
        transcript: String,
    ) {
        let body = ProcessRequest::new(job_context.clone(), transcript.clone());
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(request, "request cancelled");
                return;
            }
            outcome = self.execute(request, &body) => outcome,
        };

        // Terminal transition: only the current request may render.
        {
            let mut inner = self.lock();
            if !Self::is_current(&inner, request) {
                debug!(request, "discarding stale result");
                return;
            }
            inner.active = None;
            inner.state = ControllerState::Idle;
            match &outcome {
                Ok(answer) => {
                    self.emit(ControllerEvent::Display {
                        request,
                        text: answer.clone(),
                    });
                    self.emit(ControllerEvent::Completed {
                        request,
                        transcript: transcript.clone(),
                        answer: answer.clone(),
                    });
                }
                Err(message) => {
                    self.emit(ControllerEvent::Display {
                        request,
                        text: message.clone(),
                    });
                    self.emit(ControllerEvent::Failed {
                        request,
                        message: message.clone(),
                    });
                }
            }
        }

        let (Ok(answer), Some(history)) = (outcome, self.history.as_ref()) else {
            return;
        };
        self.emit(ControllerEvent::SaveStatus {
            request,
            status: SaveStatus::Saving,
        });
        let status = history
            .append(Exchange::new(job_context, transcript, answer))
            .await;
        self.emit(ControllerEvent::SaveStatus { request, status });
    }

    /// Perform the request. `Ok` is the answer text, `Err` the text to
    /// display for a failure.
    async fn execute(&self, request: u64, body: &ProcessRequest) -> Result<String, String> {
        let started = std::time::Instant::now();
        let reply = self
            .client
            .send(body)
            .await
            .map_err(|e| format!("Error: {e}"))?;

        if !reply.is_success() {
            let status = reply.status;
            let text = reply.text().await.map_err(|e| format!("Error: {e}"))?;
            warn!(request, status, "answer endpoint returned an error");
            return Err(format!("Error: {text}"));
        }

        let content_type = reply.content_type.clone().unwrap_or_default();
        let answer = if content_type.contains("text/plain") {
            self.read_stream(request, reply).await?
        } else if content_type.contains("application/json") {
            let text = reply.text().await.map_err(|e| format!("Error: {e}"))?;
            answer_from_json(&text)?
        } else {
            let text = reply.text().await.map_err(|e| format!("Error: {e}"))?;
            if text.is_empty() {
                return Err("Empty response".to_owned());
            }
            text
        };

        info!(
            request,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answer received"
        );
        Ok(answer)
    }

    async fn read_stream(&self, request: u64, mut reply: AnswerReply) -> Result<String, String> {
        self.mark_streaming(request);
        let mut decoder = Utf8ChunkDecoder::new();
        let mut answer = String::new();
        while let Some(chunk) = reply.body.next().await {
            let chunk = chunk.map_err(|e| format!("Error: {e}"))?;
            let piece = decoder.push(&chunk);
            if piece.is_empty() {
                continue;
            }
            answer.push_str(&piece);
            self.emit_if_current(
                request,
                ControllerEvent::Display {
                    request,
                    text: answer.clone(),
                },
            );
        }
        answer.push_str(&decoder.finish());
        if answer.is_empty() {
            return Err("Empty response".to_owned());
        }
        Ok(answer)
    }
}

/// Interpret a JSON success body: `answer`, else `error`, else unexpected.
fn answer_from_json(text: &str) -> Result<String, String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("Error: {e}"))?;
    if let Some(answer) = value.get("answer").and_then(|v| v.as_str())
        && !answer.is_empty()
    {
        return Ok(answer.to_owned());
    }
    if let Some(error) = value.get("error").and_then(|v| v.as_str())
        && !error.is_empty()
    {
        return Err(format!("Error: {error}"));
    }
    Err("Unexpected response".to_owned())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::history::{HistoryStore, InMemoryHistoryStore};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    /// Replies keyed by transcript; `gate` holds a transcript's reply until notified.
    #[derive(Default)]
    struct FakeClient {
        json: HashMap<String, String>,
        gates: HashMap<String, Arc<Notify>>,
        streamed: HashMap<String, Vec<Vec<u8>>>,
        failures: HashMap<String, (u16, String)>,
    }

    #[async_trait]
    impl AnswerClient for FakeClient {
        async fn send(&self, request: &ProcessRequest) -> Result<AnswerReply, String> {
            let transcript = request.transcript.clone().unwrap_or_default();
            if let Some(gate) = self.gates.get(&transcript) {
                gate.notified().await;
            }
            if let Some((status, body)) = self.failures.get(&transcript) {
                return Ok(AnswerReply::buffered(*status, Some("text/plain"), body.clone()));
            }
            if let Some(chunks) = self.streamed.get(&transcript) {
                let chunks: Vec<Result<Bytes, String>> =
                    chunks.iter().map(|c| Ok(Bytes::from(c.clone()))).collect();
                return Ok(AnswerReply {
                    status: 200,
                    content_type: Some("text/plain; charset=utf-8".into()),
                    body: stream::iter(chunks).boxed(),
                });
            }
            match self.json.get(&transcript) {
                Some(body) => Ok(AnswerReply::buffered(200, Some("application/json"), body.clone())),
                None => Err("connection refused".into()),
            }
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ControllerEvent>) -> Vec<ControllerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn started(outcome: SubmitOutcome) -> RequestHandle {
        match outcome {
            SubmitOutcome::Started(handle) => handle,
            SubmitOutcome::Rejected(msg) => panic!("rejected: {msg}"),
        }
    }

    #[tokio::test]
    async fn blank_job_context_is_rejected_without_request() {
        let (controller, mut rx) = AnswerController::new(Arc::new(FakeClient::default()), None);
        let outcome = controller.submit("  ", "hello");
        assert!(matches!(outcome, SubmitOutcome::Rejected(ref m) if m == MISSING_CONTEXT_MESSAGE));
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(
            drain(&mut rx),
            vec![ControllerEvent::Rejected {
                message: MISSING_CONTEXT_MESSAGE.into()
            }]
        );
    }

    #[tokio::test]
    async fn blank_transcript_is_rejected() {
        let (controller, _rx) = AnswerController::new(Arc::new(FakeClient::default()), None);
        assert!(matches!(
            controller.submit("ctx", ""),
            SubmitOutcome::Rejected(ref m) if m == MISSING_TRANSCRIPT_MESSAGE
        ));
    }

    #[tokio::test]
    async fn json_answer_renders_and_persists() {
        let mut client = FakeClient::default();
        client.json.insert("Y".into(), r#"{"answer":"Z"}"#.into());
        let store = Arc::new(InMemoryHistoryStore::new());
        let history = HistoryAdapter::new(store.clone());
        let (controller, mut rx) = AnswerController::new(Arc::new(client), Some(history));

        started(controller.submit("X", "Y")).finished().await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ControllerEvent::Display { request: 1, text: PROCESSING_PLACEHOLDER.into() },
                ControllerEvent::Display { request: 1, text: "Z".into() },
                ControllerEvent::Completed { request: 1, transcript: "Y".into(), answer: "Z".into() },
                ControllerEvent::SaveStatus { request: 1, status: SaveStatus::Saving },
                ControllerEvent::SaveStatus { request: 1, status: SaveStatus::Saved },
            ]
        );
        let saved = store.fetch_all().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].job_context, "X");
        assert_eq!(saved[0].answer, "Z");
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn superseded_request_never_renders_or_persists() {
        let gate = Arc::new(Notify::new());
        let mut client = FakeClient::default();
        client.json.insert("old".into(), r#"{"answer":"stale"}"#.into());
        client.json.insert("new".into(), r#"{"answer":"fresh"}"#.into());
        client.gates.insert("old".into(), gate.clone());
        let store = Arc::new(InMemoryHistoryStore::new());
        let (controller, mut rx) =
            AnswerController::new(Arc::new(client), Some(HistoryAdapter::new(store.clone())));

        let old = started(controller.submit("ctx", "old"));
        let new = started(controller.submit("ctx", "new"));
        new.finished().await;
        gate.notify_one();
        old.finished().await;

        let events = drain(&mut rx);
        assert!(events.iter().all(|e| !matches!(
            e,
            ControllerEvent::Display { text, .. } if text == "stale"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ControllerEvent::Completed { answer, .. } if answer == "fresh"
        )));
        let saved = store.fetch_all().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].answer, "fresh");
    }

    #[tokio::test]
    async fn explicit_cancel_is_silent() {
        let gate = Arc::new(Notify::new());
        let mut client = FakeClient::default();
        client.json.insert("slow".into(), r#"{"answer":"late"}"#.into());
        client.gates.insert("slow".into(), gate.clone());
        let (controller, mut rx) = AnswerController::new(Arc::new(client), None);

        let handle = started(controller.submit("ctx", "slow"));
        assert!(controller.cancel());
        gate.notify_one();
        handle.finished().await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1, "only the placeholder: {events:?}");
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn streamed_text_renders_in_arrival_order() {
        let text = "Led a zero-downtime migration ⚡ in two weeks";
        let bytes = text.as_bytes();
        let split = text.find('⚡').unwrap() + 1;
        let mut client = FakeClient::default();
        client.streamed.insert(
            "t".into(),
            vec![bytes[..10].to_vec(), bytes[10..split].to_vec(), bytes[split..].to_vec()],
        );
        let (controller, mut rx) = AnswerController::new(Arc::new(client), None);

        started(controller.submit("ctx", "t")).finished().await;

        let displayed: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ControllerEvent::Display { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(displayed.first().map(String::as_str), Some(PROCESSING_PLACEHOLDER));
        assert_eq!(displayed.last().map(String::as_str), Some(text));
        // Each partial extends the previous one and never contains a replacement char.
        for pair in displayed[1..].windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
        }
        assert!(displayed.iter().all(|t| !t.contains('\u{fffd}')));
    }

    #[tokio::test]
    async fn error_status_is_displayed_with_prefix_and_not_saved() {
        let mut client = FakeClient::default();
        client
            .failures
            .insert("t".into(), (500, r#"{"error":"Server misconfiguration"}"#.into()));
        let store = Arc::new(InMemoryHistoryStore::new());
        let (controller, mut rx) =
            AnswerController::new(Arc::new(client), Some(HistoryAdapter::new(store.clone())));

        started(controller.submit("ctx", "t")).finished().await;

        let events = drain(&mut rx);
        assert!(events.contains(&ControllerEvent::Failed {
            request: 1,
            message: r#"Error: {"error":"Server misconfiguration"}"#.into(),
        }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn network_error_returns_to_idle() {
        let (controller, mut rx) = AnswerController::new(Arc::new(FakeClient::default()), None);
        started(controller.submit("ctx", "unknown")).finished().await;
        assert!(drain(&mut rx).contains(&ControllerEvent::Failed {
            request: 1,
            message: "Error: connection refused".into(),
        }));
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn identical_sends_create_two_records() {
        let mut client = FakeClient::default();
        client.json.insert("same".into(), r#"{"answer":"A"}"#.into());
        let store = Arc::new(InMemoryHistoryStore::new());
        let (controller, _rx) =
            AnswerController::new(Arc::new(client), Some(HistoryAdapter::new(store.clone())));

        started(controller.submit("ctx", "same")).finished().await;
        started(controller.submit("ctx", "same")).finished().await;
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn json_body_interpretation() {
        assert_eq!(answer_from_json(r#"{"answer":"ok"}"#), Ok("ok".into()));
        assert_eq!(
            answer_from_json(r#"{"error":"quota"}"#),
            Err("Error: quota".into())
        );
        assert_eq!(answer_from_json("{}"), Err("Unexpected response".into()));
        assert!(answer_from_json("not json").unwrap_err().starts_with("Error: "));
    }
}
