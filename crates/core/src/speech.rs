//! Continuous Speech Capture
//!
//! [`SpeechCaptureController`] is a two-state machine (idle / listening) wrapped around
//! an environment-provided [`SpeechRecognizer`]. While listening, every finalized,
//! non-blank transcript is handed to a [`TurnSink`] (normally the conversation
//! session). Capture keeps running after each utterance until it is stopped or the
//! recognizer ends the stream.

use crate::session::{RequestId, SessionError, TurnSink};
#[cfg(test)]
use mockall::automock;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

/// Events a recognizer emits while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// The recognizer confirmed it is capturing.
    Started,
    /// A transcription result. Interim results have `is_final == false`.
    Transcript { text: String, is_final: bool },
    /// A recognizer-side problem. Does not end capture by itself.
    Error(String),
    /// The recognizer stopped producing results.
    Ended,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Speech recognition is not available: {0}")]
    Unavailable(String),
    #[error("Speech recognition failed to start: {0}")]
    Start(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            continuous: true,
            interim_results: false,
        }
    }
}

/// The speech-to-text capability. The controller only starts and stops it.
#[cfg_attr(test, automock)]
pub trait SpeechRecognizer: Send {
    /// Starts recognition and returns the stream of events it will emit.
    fn start(
        &mut self,
        settings: &RecognitionSettings,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, CaptureError>;

    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Listening,
}

pub struct SpeechCaptureController {
    recognizer: Box<dyn SpeechRecognizer>,
    settings: RecognitionSettings,
    state: CaptureState,
    events: Option<mpsc::UnboundedReceiver<RecognitionEvent>>,
    state_tx: watch::Sender<CaptureState>,
}

impl SpeechCaptureController {
    pub fn new(recognizer: Box<dyn SpeechRecognizer>) -> Self {
        Self::with_settings(recognizer, RecognitionSettings::default())
    }

    pub fn with_settings(
        recognizer: Box<dyn SpeechRecognizer>,
        settings: RecognitionSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        Self {
            recognizer,
            settings,
            state: CaptureState::Idle,
            events: None,
            state_tx,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == CaptureState::Listening
    }

    /// Observes state changes, e.g. to drive a microphone indicator.
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }

    /// idle -> listening. On failure the controller stays idle.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_listening() {
            debug!("Speech capture already listening");
            return Ok(());
        }
        match self.recognizer.start(&self.settings) {
            Ok(events) => {
                self.events = Some(events);
                self.transition(CaptureState::Listening);
                info!(language = %self.settings.language, "Speech capture started");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Error starting speech recognition");
                Err(e)
            }
        }
    }

    /// listening -> idle on user request.
    pub fn stop(&mut self) {
        if !self.is_listening() {
            return;
        }
        self.recognizer.stop();
        self.reset("stopped");
    }

    /// The microphone button: starts when idle, stops when listening.
    pub fn toggle(&mut self) -> Result<CaptureState, CaptureError> {
        if self.is_listening() {
            self.stop();
        } else {
            self.start()?;
        }
        Ok(self.state)
    }

    /// Waits for the next recognizer event. Returns `None` at once when idle.
    ///
    /// A recognizer that drops its sender is reported as [`RecognitionEvent::Ended`].
    pub async fn next_event(&mut self) -> Option<RecognitionEvent> {
        let events = self.events.as_mut()?;
        Some(events.recv().await.unwrap_or(RecognitionEvent::Ended))
    }

    /// Like [`Self::next_event`], but only returns events that are already queued.
    pub fn try_next_event(&mut self) -> Option<RecognitionEvent> {
        match self.events.as_mut()?.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(RecognitionEvent::Ended),
        }
    }

    /// Applies one recognizer event. Finalized utterances are submitted to `sink` and
    /// the submission result is returned.
    pub fn handle_event<S: TurnSink + ?Sized>(
        &mut self,
        event: RecognitionEvent,
        sink: &mut S,
    ) -> Option<Result<RequestId, SessionError>> {
        match event {
            RecognitionEvent::Started => {
                debug!("Speech recognition start confirmed");
                None
            }
            RecognitionEvent::Transcript { text, is_final } => {
                if !self.is_listening() {
                    debug!("Dropping transcript received while idle");
                    return None;
                }
                if !is_final {
                    trace!(%text, "Ignoring interim transcript");
                    return None;
                }
                if text.trim().is_empty() {
                    return None;
                }
                info!(%text, "Recognized utterance");
                Some(sink.submit_turn(&text))
            }
            RecognitionEvent::Error(message) => {
                warn!(error = %message, "Speech recognition error");
                None
            }
            RecognitionEvent::Ended => {
                if self.is_listening() {
                    self.reset("recognizer ended");
                }
                None
            }
        }
    }

    fn reset(&mut self, reason: &str) {
        self.events = None;
        self.transition(CaptureState::Idle);
        info!(reason, "Speech capture stopped");
    }

    fn transition(&mut self, next: CaptureState) {
        self.state = next;
        self.state_tx.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every submitted utterance.
    #[derive(Default)]
    struct RecordingSink {
        submitted: Vec<String>,
    }

    impl TurnSink for RecordingSink {
        fn submit_turn(&mut self, text: &str) -> Result<RequestId, SessionError> {
            self.submitted.push(text.to_string());
            Ok(RequestId(self.submitted.len() as u64))
        }
    }

    fn recognizer_with_channel() -> (
        MockSpeechRecognizer,
        mpsc::UnboundedSender<RecognitionEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rx = Some(rx);
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer
            .expect_start()
            .returning(move |_| rx.take().ok_or(CaptureError::Start("already used".into())));
        recognizer.expect_stop().returning(|| ());
        (recognizer, tx)
    }

    fn transcript(text: &str, is_final: bool) -> RecognitionEvent {
        RecognitionEvent::Transcript {
            text: text.to_string(),
            is_final,
        }
    }

    #[test]
    fn test_only_final_non_blank_results_are_forwarded() {
        let (recognizer, _tx) = recognizer_with_channel();
        let mut controller = SpeechCaptureController::new(Box::new(recognizer));
        let mut sink = RecordingSink::default();
        controller.start().unwrap();

        controller.handle_event(RecognitionEvent::Started, &mut sink);
        controller.handle_event(transcript("I'm afraid the", false), &mut sink);
        controller.handle_event(transcript("   ", true), &mut sink);
        let forwarded =
            controller.handle_event(transcript(" I'm afraid the results ", true), &mut sink);
        controller.handle_event(transcript("are back", true), &mut sink);

        assert!(matches!(forwarded, Some(Ok(RequestId(1)))));
        assert_eq!(sink.submitted, vec![" I'm afraid the results ", "are back"]);
        assert!(controller.is_listening());
    }

    #[test]
    fn test_error_does_not_stop_capture_but_end_does() {
        let (recognizer, _tx) = recognizer_with_channel();
        let mut controller = SpeechCaptureController::new(Box::new(recognizer));
        let mut sink = RecordingSink::default();
        let state_rx = controller.subscribe();
        controller.start().unwrap();
        assert_eq!(*state_rx.borrow(), CaptureState::Listening);

        controller.handle_event(RecognitionEvent::Error("no-speech".into()), &mut sink);
        assert!(controller.is_listening());

        controller.handle_event(RecognitionEvent::Ended, &mut sink);
        assert_eq!(controller.state(), CaptureState::Idle);
        assert_eq!(*state_rx.borrow(), CaptureState::Idle);
    }

    #[test]
    fn test_results_after_stop_are_dropped() {
        let (recognizer, _tx) = recognizer_with_channel();
        let mut controller = SpeechCaptureController::new(Box::new(recognizer));
        let mut sink = RecordingSink::default();
        controller.start().unwrap();
        controller.stop();

        assert!(controller.handle_event(transcript("late", true), &mut sink).is_none());
        assert!(sink.submitted.is_empty());
    }

    #[test]
    fn test_unavailable_recognizer_stays_idle() {
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer
            .expect_start()
            .returning(|_| Err(CaptureError::Unavailable("no microphone".into())))
            .once();
        recognizer.expect_stop().never();
        let mut controller = SpeechCaptureController::new(Box::new(recognizer));

        let err = controller.toggle().unwrap_err();

        assert!(matches!(err, CaptureError::Unavailable(_)));
        assert_eq!(controller.state(), CaptureState::Idle);
    }

    #[test]
    fn test_start_passes_settings_and_is_idempotent() {
        let (tx, rx) = mpsc::unbounded_channel::<RecognitionEvent>();
        let mut rx = Some(rx);
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer
            .expect_start()
            .withf(|s| s.continuous && !s.interim_results && s.language == "en-GB")
            .returning(move |_| Ok(rx.take().unwrap()))
            .once();
        let settings = RecognitionSettings {
            language: "en-GB".into(),
            ..RecognitionSettings::default()
        };
        let mut controller = SpeechCaptureController::with_settings(Box::new(recognizer), settings);

        controller.start().unwrap();
        controller.start().unwrap();

        assert!(controller.is_listening());
        drop(tx);
    }

    #[test]
    fn test_toggle_cycles_between_states() {
        let (tx, rx) = mpsc::unbounded_channel::<RecognitionEvent>();
        let (tx2, rx2) = mpsc::unbounded_channel::<RecognitionEvent>();
        let mut streams = vec![rx2, rx];
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer
            .expect_start()
            .returning(move |_| streams.pop().ok_or(CaptureError::Start("exhausted".into())))
            .times(2);
        recognizer.expect_stop().returning(|| ()).times(1);
        let mut controller = SpeechCaptureController::new(Box::new(recognizer));

        assert_eq!(controller.toggle().unwrap(), CaptureState::Listening);
        assert_eq!(controller.toggle().unwrap(), CaptureState::Idle);
        assert_eq!(controller.toggle().unwrap(), CaptureState::Listening);
        drop((tx, tx2));
    }

    #[tokio::test]
    async fn test_next_event_reads_stream_and_reports_closed_stream_as_end() {
        let (recognizer, tx) = recognizer_with_channel();
        let mut controller = SpeechCaptureController::new(Box::new(recognizer));
        assert!(controller.next_event().await.is_none());

        controller.start().unwrap();
        tx.send(transcript("hello", true)).unwrap();
        drop(tx);

        assert_eq!(controller.next_event().await, Some(transcript("hello", true)));
        assert_eq!(controller.next_event().await, Some(RecognitionEvent::Ended));

        let mut sink = RecordingSink::default();
        controller.handle_event(RecognitionEvent::Ended, &mut sink);
        assert!(!controller.is_listening());
        assert!(controller.next_event().await.is_none());
    }

    #[test]
    fn test_try_next_event_only_reads_queued_events() {
        let (recognizer, tx) = recognizer_with_channel();
        let mut controller = SpeechCaptureController::new(Box::new(recognizer));
        assert!(controller.try_next_event().is_none());

        controller.start().unwrap();
        assert!(controller.try_next_event().is_none());
        tx.send(RecognitionEvent::Started).unwrap();
        drop(tx);

        assert_eq!(controller.try_next_event(), Some(RecognitionEvent::Started));
        assert_eq!(controller.try_next_event(), Some(RecognitionEvent::Ended));
    }
}
