//! Speech capture adapter.
//!
//! [`SpeechCapture`] owns at most one active recognition session. Final
//! segments are folded into the transcript with [`accumulate::accumulate`];
//! when the session ends (stop, recognizer end, or recognizer error) the
//! adapter signals "ended" once and, if any text was captured, hands the
//! transcript to the completion callback supplied to [`SpeechCapture::start`].
//!
//! The recognizer itself is external and sits behind [`Recognizer`].
//! [`LineRecognizer`] treats each non-empty input line as a final segment and
//! a blank line (or end of input) as the end of the utterance.

pub mod accumulate;
pub mod capability;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::accumulate::accumulate;
use crate::config::{CaptureBackend, CaptureConfig};

/// Capture failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// No recognizer on this host. Nothing was started.
    #[error("speech recognition unsupported: {0}")]
    Unsupported(String),

    /// The recognizer failed to start.
    #[error("recognizer failure: {0}")]
    Backend(String),
}

/// Event delivered by a recognizer, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A recognized segment. Only final segments enter the transcript.
    Segment { text: String, is_final: bool },
    /// The recognizer stopped on its own or after a stop request.
    Ended,
    /// The recognizer failed; treated as the end of the session.
    Error(String),
}

/// Platform speech recognizer.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Whether recognition can run on this host.
    fn is_available(&self) -> bool;

    /// Begin continuous recognition. Events flow until `stop` is cancelled
    /// or the recognizer ends by itself; the channel closes afterwards.
    async fn start(
        &self,
        language: &str,
        stop: CancellationToken,
    ) -> Result<mpsc::Receiver<RecognitionEvent>, CaptureError>;
}

/// Result of [`SpeechCapture::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session began.
    Started { session: u64 },
    /// A session was already active; nothing changed.
    AlreadyActive,
}

#[derive(Debug)]
struct ActiveCapture {
    session: u64,
    stop: CancellationToken,
}

#[derive(Debug)]
struct Shared {
    active: Mutex<Option<ActiveCapture>>,
    transcript: watch::Sender<String>,
    ended: watch::Sender<u64>,
    next_session: AtomicU64,
    /// Most recently started session; the only one that may write `transcript`.
    latest_session: AtomicU64,
}

impl Shared {
    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveCapture>> {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Publish `text` as the live transcript unless a newer session started.
    fn show_transcript(&self, session: u64, text: &str) {
        let _active = self.lock_active();
        if self.latest_session.load(Ordering::Relaxed) == session {
            self.transcript.send_replace(text.to_owned());
        } else {
            debug!(session, "late segment from a replaced session");
        }
    }

    fn clear_if(&self, session: u64) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|a| a.session == session) {
            *active = None;
        }
    }
}

/// Single-session speech capture adapter.
#[derive(Clone)]
pub struct SpeechCapture {
    recognizer: Arc<dyn Recognizer>,
    language: String,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SpeechCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechCapture")
            .field("language", &self.language)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl SpeechCapture {
    pub fn new(recognizer: Arc<dyn Recognizer>, language: impl Into<String>) -> Self {
        let (transcript, _) = watch::channel(String::new());
        let (ended, _) = watch::channel(0);
        Self {
            recognizer,
            language: language.into(),
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                transcript,
                ended,
                next_session: AtomicU64::new(1),
                latest_session: AtomicU64::new(0),
            }),
        }
    }

    /// Build the adapter for the configured backend.
    pub fn from_config(config: &CaptureConfig) -> Self {
        let recognizer: Arc<dyn Recognizer> = match config.backend {
            CaptureBackend::Stdin => Arc::new(LineRecognizer::stdin()),
            CaptureBackend::None => Arc::new(UnavailableRecognizer),
        };
        Self::new(recognizer, config.language.clone())
    }

    pub fn recognizer(&self) -> &dyn Recognizer {
        self.recognizer.as_ref()
    }

    /// Begin a capture session.
    ///
    /// `on_complete` runs once when the session ends with a non-empty
    /// transcript. Starting while a session is active logs a warning and
    /// returns [`StartOutcome::AlreadyActive`].
    ///
    /// # Errors
    ///
    /// [`CaptureError::Unsupported`] when no recognizer is available;
    /// [`CaptureError::Backend`] when the recognizer refuses to start.
    pub async fn start<F>(&self, on_complete: F) -> Result<StartOutcome, CaptureError>
    where
        F: FnOnce(String) + Send + 'static,
    {
        if !self.recognizer.is_available() {
            warn!("speech recognition not available on this host");
            return Err(CaptureError::Unsupported(
                "no speech recognizer is configured on this device".to_owned(),
            ));
        }

        let stop = CancellationToken::new();
        let session = {
            let mut active = self.shared.lock_active();
            if active.is_some() {
                warn!("capture already in progress");
                return Ok(StartOutcome::AlreadyActive);
            }
            let session = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
            *active = Some(ActiveCapture {
                session,
                stop: stop.clone(),
            });
            self.shared.latest_session.store(session, Ordering::Relaxed);
            self.shared.transcript.send_replace(String::new());
            session
        };

        let events = match self.recognizer.start(&self.language, stop).await {
            Ok(events) => events,
            Err(e) => {
                self.shared.clear_if(session);
                return Err(e);
            }
        };
        info!(session, language = self.language.as_str(), "capture started");

        tokio::spawn(pump(Arc::clone(&self.shared), session, events, on_complete));
        Ok(StartOutcome::Started { session })
    }

    /// Request termination of the active session and clear its handle.
    /// Returns `false` if nothing was active.
    pub fn stop(&self) -> bool {
        let taken = self.shared.lock_active().take();
        match taken {
            Some(active) => {
                debug!(session = active.session, "capture stop requested");
                active.stop.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock_active().is_some()
    }

    /// Transcript of the current (or last) session as it accumulates.
    pub fn transcript(&self) -> watch::Receiver<String> {
        self.shared.transcript.subscribe()
    }

    /// Count of sessions that have ended; bumps once per session.
    pub fn ended(&self) -> watch::Receiver<u64> {
        self.shared.ended.subscribe()
    }
}

async fn pump<F>(
    shared: Arc<Shared>,
    session: u64,
    mut events: mpsc::Receiver<RecognitionEvent>,
    on_complete: F,
) where
    F: FnOnce(String) + Send + 'static,
{
    let mut transcript = String::new();
    while let Some(event) = events.recv().await {
        match event {
            RecognitionEvent::Segment {
                text,
                is_final: true,
            } => {
                transcript = accumulate(&transcript, &text);
                shared.show_transcript(session, &transcript);
            }
            RecognitionEvent::Segment { text, .. } => {
                debug!(session, interim = text.as_str(), "interim segment");
            }
            RecognitionEvent::Ended => break,
            RecognitionEvent::Error(e) => {
                warn!(session, error = e.as_str(), "recognizer error");
                break;
            }
        }
    }

    shared.clear_if(session);
    shared.ended.send_modify(|n| *n += 1);
    info!(session, chars = transcript.len(), "capture ended");

    if !transcript.trim().is_empty() {
        on_complete(transcript);
    }
}

type BoxedLines = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// Recognizer fed by text lines: each non-empty line is a final segment,
/// a blank line or end of input ends the session.
#[derive(Clone)]
pub struct LineRecognizer {
    lines: Arc<tokio::sync::Mutex<BoxedLines>>,
}

impl std::fmt::Debug for LineRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineRecognizer").finish_non_exhaustive()
    }
}

impl LineRecognizer {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            lines: Arc::new(tokio::sync::Mutex::new(BufReader::new(boxed).lines())),
        }
    }

    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

#[async_trait]
impl Recognizer for LineRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    async fn start(
        &self,
        _language: &str,
        stop: CancellationToken,
    ) -> Result<mpsc::Receiver<RecognitionEvent>, CaptureError> {
        let (tx, rx) = mpsc::channel(32);
        let lines = Arc::clone(&self.lines);
        tokio::spawn(async move {
            let mut lines = lines.lock().await;
            loop {
                let next = tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    next = lines.next_line() => next,
                };
                match next {
                    Ok(Some(line)) if line.trim().is_empty() => break,
                    Ok(Some(line)) => {
                        let event = RecognitionEvent::Segment {
                            text: line,
                            is_final: true,
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(RecognitionEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }
            let _ = tx.send(RecognitionEvent::Ended).await;
        });
        Ok(rx)
    }
}

/// Placeholder for hosts without a recognizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRecognizer;

#[async_trait]
impl Recognizer for UnavailableRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    async fn start(
        &self,
        _language: &str,
        _stop: CancellationToken,
    ) -> Result<mpsc::Receiver<RecognitionEvent>, CaptureError> {
        Err(CaptureError::Unsupported(
            "no speech recognizer is configured on this device".to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::time::Duration;

    /// Recognizer driven by the test through an mpsc sender.
    struct ScriptedRecognizer {
        feed: Mutex<Option<mpsc::Sender<RecognitionEvent>>>,
        starts: AtomicU64,
        end_on_stop: bool,
    }

    impl ScriptedRecognizer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                feed: Mutex::new(None),
                starts: AtomicU64::new(0),
                end_on_stop: true,
            })
        }

        /// Keeps delivering events after a stop request until the test ends it.
        fn lingering() -> Arc<Self> {
            Arc::new(Self {
                feed: Mutex::new(None),
                starts: AtomicU64::new(0),
                end_on_stop: false,
            })
        }

        fn sender(&self) -> mpsc::Sender<RecognitionEvent> {
            self.feed.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl Recognizer for ScriptedRecognizer {
        fn is_available(&self) -> bool {
            true
        }

        async fn start(
            &self,
            _language: &str,
            stop: CancellationToken,
        ) -> Result<mpsc::Receiver<RecognitionEvent>, CaptureError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(16);
            if self.end_on_stop {
                let on_stop = tx.clone();
                tokio::spawn(async move {
                    stop.cancelled().await;
                    let _ = on_stop.send(RecognitionEvent::Ended).await;
                });
            }
            *self.feed.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }

    fn final_seg(text: &str) -> RecognitionEvent {
        RecognitionEvent::Segment {
            text: text.to_owned(),
            is_final: true,
        }
    }

    async fn wait_ended(capture: &SpeechCapture, count: u64) {
        let mut ended = capture.ended();
        tokio::time::timeout(Duration::from_secs(2), ended.wait_for(|n| *n >= count))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn unsupported_host_reports_error_and_does_nothing() {
        let capture = SpeechCapture::new(Arc::new(UnavailableRecognizer), "en-US");
        let err = capture.start(|_| {}).await.unwrap_err();
        assert!(matches!(err, CaptureError::Unsupported(_)));
        assert!(!capture.is_active());
    }

    #[tokio::test]
    async fn second_start_is_a_noop() {
        let recognizer = ScriptedRecognizer::new();
        let capture = SpeechCapture::new(recognizer.clone(), "en-US");
        assert!(matches!(
            capture.start(|_| {}).await.unwrap(),
            StartOutcome::Started { .. }
        ));
        assert_eq!(capture.start(|_| {}).await.unwrap(), StartOutcome::AlreadyActive);
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 1);
        assert!(capture.stop());
        assert!(!capture.is_active());
    }

    #[tokio::test]
    async fn final_segments_accumulate_and_complete_once() {
        let recognizer = ScriptedRecognizer::new();
        let capture = SpeechCapture::new(recognizer.clone(), "en-US");
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        capture
            .start(move |text| {
                let _ = done_tx.send(text);
            })
            .await
            .unwrap();

        let feed = recognizer.sender();
        feed.send(final_seg("I scaled")).await.unwrap();
        feed.send(RecognitionEvent::Segment {
            text: "the ser".into(),
            is_final: false,
        })
        .await
        .unwrap();
        feed.send(final_seg("the service")).await.unwrap();
        feed.send(RecognitionEvent::Ended).await.unwrap();

        wait_ended(&capture, 1).await;
        assert_eq!(done_rx.recv().await.as_deref(), Some("I scaled the service"));
        assert!(done_rx.try_recv().is_err());
        assert_eq!(*capture.transcript().borrow(), "I scaled the service");
        assert!(!capture.is_active());
    }

    #[tokio::test]
    async fn empty_session_skips_completion() {
        let recognizer = ScriptedRecognizer::new();
        let capture = SpeechCapture::new(recognizer, "en-US");
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<String>();

        capture
            .start(move |text| {
                let _ = done_tx.send(text);
            })
            .await
            .unwrap();
        capture.stop();

        wait_ended(&capture, 1).await;
        assert!(done_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn recognizer_error_ends_session() {
        let recognizer = ScriptedRecognizer::new();
        let capture = SpeechCapture::new(recognizer.clone(), "en-US");
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        capture
            .start(move |text| {
                let _ = done_tx.send(text);
            })
            .await
            .unwrap();

        let feed = recognizer.sender();
        feed.send(final_seg("partial answer")).await.unwrap();
        feed.send(RecognitionEvent::Error("network".into())).await.unwrap();

        wait_ended(&capture, 1).await;
        assert_eq!(done_rx.recv().await.as_deref(), Some("partial answer"));
        assert!(!capture.is_active());
    }

    async fn wait_transcript(capture: &SpeechCapture, expected: &str) {
        let mut transcript = capture.transcript();
        tokio::time::timeout(Duration::from_secs(2), transcript.wait_for(|t| t == expected))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn late_final_from_stopped_session_keeps_new_transcript() {
        let recognizer = ScriptedRecognizer::lingering();
        let capture = SpeechCapture::new(recognizer.clone(), "en-US");
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        capture
            .start(move |text| {
                let _ = done_tx.send(text);
            })
            .await
            .unwrap();
        let old = recognizer.sender();
        old.send(final_seg("old words")).await.unwrap();
        wait_transcript(&capture, "old words").await;

        assert!(capture.stop());
        assert!(matches!(
            capture.start(|_| {}).await.unwrap(),
            StartOutcome::Started { .. }
        ));
        assert_eq!(*capture.transcript().borrow(), "");
        let new = recognizer.sender();
        new.send(final_seg("new words")).await.unwrap();
        wait_transcript(&capture, "new words").await;

        old.send(final_seg("late final")).await.unwrap();
        old.send(RecognitionEvent::Ended).await.unwrap();
        wait_ended(&capture, 1).await;

        assert_eq!(*capture.transcript().borrow(), "new words");
        assert!(capture.is_active());
        // The stopped session still completes with its own text.
        assert_eq!(done_rx.recv().await.as_deref(), Some("old words late final"));
    }

    #[tokio::test]
    async fn line_recognizer_reads_until_blank_line() {
        let input: &[u8] = b"first thought\nsecond thought\n\nnext utterance\n";
        let capture = SpeechCapture::new(Arc::new(LineRecognizer::new(input)), "en-US");
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let tx = done_tx.clone();
        capture
            .start(move |text| {
                let _ = tx.send(text);
            })
            .await
            .unwrap();
        wait_ended(&capture, 1).await;
        assert_eq!(done_rx.recv().await.as_deref(), Some("first thought second thought"));

        capture
            .start(move |text| {
                let _ = done_tx.send(text);
            })
            .await
            .unwrap();
        wait_ended(&capture, 2).await;
        assert_eq!(done_rx.recv().await.as_deref(), Some("next utterance"));
    }
}
