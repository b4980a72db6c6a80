//! Typed vs. spoken input.
//!
//! [`InputModeSwitch`] decides which capture surface is active and publishes the mode
//! on a watch channel that the session reads when it builds a request.

use crate::speech::SpeechCaptureController;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tokio::sync::watch;
use tracing::info;

/// How the user interacts with the patient. The wire names are what the agent
/// endpoint expects; it only synthesises speech for `voice-to-voice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InteractionMode {
    #[default]
    #[serde(rename = "text-to-text")]
    Text,
    #[serde(rename = "voice-to-voice")]
    Voice,
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionMode::Text => write!(f, "text-to-text"),
            InteractionMode::Voice => write!(f, "voice-to-voice"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown interaction mode '{0}', expected 'text' or 'voice'")]
pub struct ParseModeError(String);

impl FromStr for InteractionMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "text-to-text" => Ok(InteractionMode::Text),
            "voice" | "voice-to-voice" => Ok(InteractionMode::Voice),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// The two mutually exclusive input surfaces (a text field and a microphone control).
#[cfg_attr(test, automock)]
pub trait CaptureSurfaces: Send {
    /// Makes the surface for `mode` the only active one.
    fn activate(&mut self, mode: InteractionMode);
}

pub struct InputModeSwitch {
    surfaces: Box<dyn CaptureSurfaces>,
    mode_tx: watch::Sender<InteractionMode>,
}

impl InputModeSwitch {
    pub fn new(mut surfaces: Box<dyn CaptureSurfaces>, initial: InteractionMode) -> Self {
        surfaces.activate(initial);
        let (mode_tx, _) = watch::channel(initial);
        Self { surfaces, mode_tx }
    }

    pub fn mode(&self) -> InteractionMode {
        *self.mode_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<InteractionMode> {
        self.mode_tx.subscribe()
    }

    /// Switches mode. Leaving voice while capture is listening stops capture first,
    /// so audio is never captured behind a hidden microphone control.
    pub fn set_mode(&mut self, mode: InteractionMode, capture: &mut SpeechCaptureController) {
        if mode != InteractionMode::Voice && capture.is_listening() {
            capture.stop();
        }
        self.surfaces.activate(mode);
        let previous = self.mode_tx.send_replace(mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "Switched interaction mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{CaptureState, MockSpeechRecognizer, RecognitionEvent};
    use mockall::Sequence;
    use tokio::sync::mpsc;

    fn listening_controller() -> (
        SpeechCaptureController,
        mpsc::UnboundedSender<RecognitionEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rx = Some(rx);
        let mut recognizer = MockSpeechRecognizer::new();
        recognizer
            .expect_start()
            .returning(move |_| Ok(rx.take().unwrap()))
            .once();
        recognizer.expect_stop().returning(|| ()).once();
        let mut controller = SpeechCaptureController::new(Box::new(recognizer));
        controller.start().unwrap();
        (controller, tx)
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("voice".parse::<InteractionMode>().unwrap(), InteractionMode::Voice);
        assert_eq!(" Text-To-Text ".parse::<InteractionMode>().unwrap(), InteractionMode::Text);
        assert!("video".parse::<InteractionMode>().is_err());
        assert_eq!(InteractionMode::Voice.to_string(), "voice-to-voice");
        assert_eq!(
            serde_json::to_string(&InteractionMode::Text).unwrap(),
            "\"text-to-text\""
        );
    }

    #[test]
    fn test_new_activates_initial_surface() {
        let mut surfaces = MockCaptureSurfaces::new();
        surfaces
            .expect_activate()
            .withf(|m| *m == InteractionMode::Voice)
            .return_const(())
            .once();

        let switch = InputModeSwitch::new(Box::new(surfaces), InteractionMode::Voice);

        assert_eq!(switch.mode(), InteractionMode::Voice);
    }

    #[test]
    fn test_leaving_voice_while_listening_stops_capture() {
        let mut seq = Sequence::new();
        let mut surfaces = MockCaptureSurfaces::new();
        surfaces
            .expect_activate()
            .withf(|m| *m == InteractionMode::Voice)
            .return_const(())
            .once()
            .in_sequence(&mut seq);
        surfaces
            .expect_activate()
            .withf(|m| *m == InteractionMode::Text)
            .return_const(())
            .once()
            .in_sequence(&mut seq);
        let mut switch = InputModeSwitch::new(Box::new(surfaces), InteractionMode::Voice);
        let mode_rx = switch.subscribe();
        let (mut capture, _tx) = listening_controller();

        switch.set_mode(InteractionMode::Text, &mut capture);

        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(*mode_rx.borrow(), InteractionMode::Text);
    }

    #[test]
    fn test_staying_in_voice_keeps_capture() {
        let mut surfaces = MockCaptureSurfaces::new();
        surfaces.expect_activate().return_const(()).times(2);
        let mut switch = InputModeSwitch::new(Box::new(surfaces), InteractionMode::Voice);
        let (mut capture, _tx) = listening_controller();

        switch.set_mode(InteractionMode::Voice, &mut capture);

        assert!(capture.is_listening());
        // Stop explicitly so the recognizer's stop expectation is met.
        capture.stop();
    }
}
