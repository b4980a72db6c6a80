//! A keyboard stand-in for a speech recognizer.
//!
//! While the microphone is on, lines the user types are delivered to the capture
//! controller as recognition results, exactly as a continuous recognizer would emit
//! them.

use bedside_core::{CaptureError, RecognitionEvent, RecognitionSettings, SpeechRecognizer};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

type EventSender = mpsc::UnboundedSender<RecognitionEvent>;

/// Feeds typed text into a running [`KeyboardDictation`].
#[derive(Clone, Default)]
pub struct DictationHandle {
    sender: Arc<Mutex<Option<EventSender>>>,
}

impl DictationHandle {
    fn slot(&self) -> MutexGuard<'_, Option<EventSender>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emits a transcript. Returns false when the recognizer is not running.
    pub fn dictate(&self, text: &str, is_final: bool) -> bool {
        match self.slot().as_ref() {
            Some(sender) => sender
                .send(RecognitionEvent::Transcript {
                    text: text.to_string(),
                    is_final,
                })
                .is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }
}

pub struct KeyboardDictation {
    enabled: bool,
    handle: DictationHandle,
}

impl KeyboardDictation {
    /// A disabled recognizer refuses to start, like a browser without speech support.
    pub fn new(enabled: bool) -> (Self, DictationHandle) {
        let handle = DictationHandle::default();
        (
            Self {
                enabled,
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl SpeechRecognizer for KeyboardDictation {
    fn start(
        &mut self,
        settings: &RecognitionSettings,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, CaptureError> {
        if !self.enabled {
            return Err(CaptureError::Unavailable(
                "speech recognition is disabled (SPEECH_ENABLED=false)".to_string(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(RecognitionEvent::Started)
            .map_err(|e| CaptureError::Start(e.to_string()))?;
        *self.handle.slot() = Some(tx);
        debug!(language = %settings.language, "Keyboard dictation started");
        Ok(rx)
    }

    fn stop(&mut self) {
        self.handle.slot().take();
        debug!("Keyboard dictation stopped");
    }
}
